//! Console session - the live stream for one server identity
//!
//! State machine: `Disconnected → Connecting → Connected → Disconnected`.
//! The socket lives in a spawned task that reports `TransportEvent`s tagged
//! with a generation. Every connect/disconnect bumps the generation, so
//! events from a superseded socket are ignored.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use serverdeck_protocol::{ConsoleFrame, ControlAction, ControlFrame};

use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::event::{CloseReason, ConsoleEvent, TransportEvent};
use crate::message::ConsoleMessage;

pub const BAD_FRAME_MESSAGE: &str = "Bad websocket message";

const OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Transport {
    task: JoinHandle<()>,
    outbound: mpsc::Sender<String>,
}

pub struct ConsoleSession {
    config: Arc<ConsoleConfig>,
    events: mpsc::Sender<ConsoleEvent>,
    server_id: Option<String>,
    state: ConnectionState,
    generation: u64,
    transport: Option<Transport>,
}

impl ConsoleSession {
    pub fn new(config: Arc<ConsoleConfig>, events: mpsc::Sender<ConsoleEvent>) -> Self {
        Self {
            config,
            events,
            server_id: None,
            state: ConnectionState::Disconnected,
            generation: 0,
            transport: None,
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open the stream for `server_id`. Any previous socket is dropped
    /// without a message; call `disconnect` first to report it.
    pub fn connect(&mut self, server_id: &str) {
        self.stop_transport();
        self.generation += 1;
        self.server_id = Some(server_id.to_string());
        self.state = ConnectionState::Connecting;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let link = TransportLink {
            url: self.config.stream_url(server_id),
            server_id: server_id.to_string(),
            generation: self.generation,
            events: self.events.clone(),
        };
        let policy = self.config.reconnect.clone();

        info!(
            component = "session",
            event = "session.connecting",
            server_id = %server_id,
            generation = self.generation,
            url = %link.url,
        );

        let task = tokio::spawn(run_transport(link, policy, outbound_rx));
        self.transport = Some(Transport {
            task,
            outbound: outbound_tx,
        });
    }

    /// Close the stream. Returns the disconnection notice unless the
    /// session was already disconnected.
    pub fn disconnect(&mut self) -> Option<ConsoleMessage> {
        self.stop_transport();
        self.generation += 1;
        let was = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        if was == ConnectionState::Disconnected {
            return None;
        }
        let server_id = self.server_id.as_deref().unwrap_or_default();
        info!(
            component = "session",
            event = "session.disconnected",
            server_id = %server_id,
            "Local disconnect"
        );
        Some(ConsoleMessage::system(format!("Disconnected from {server_id}")))
    }

    /// Write a control frame onto the stream. Fails fast unless connected.
    pub fn send(&self, action: ControlAction) -> Result<(), ConsoleError> {
        if self.state != ConnectionState::Connected {
            return Err(ConsoleError::NotConnected);
        }
        let transport = self.transport.as_ref().ok_or(ConsoleError::NotConnected)?;
        let frame =
            serde_json::to_string(&ControlFrame::Control { action }).map_err(ConsoleError::Encode)?;
        queue_outbound(&transport.outbound, frame)
    }

    /// Apply a transport event and return the console lines it produces.
    /// Events from an older generation produce nothing.
    pub fn apply(&mut self, generation: u64, event: TransportEvent) -> Vec<ConsoleMessage> {
        if generation != self.generation {
            debug!(
                component = "session",
                event = "session.stale_event",
                generation,
                current = self.generation,
            );
            return Vec::new();
        }
        let server_id = self.server_id.clone().unwrap_or_default();

        match event {
            TransportEvent::Connected => {
                self.state = ConnectionState::Connected;
                info!(
                    component = "session",
                    event = "session.connected",
                    server_id = %server_id,
                );
                vec![ConsoleMessage::system(format!("Connected to {server_id}"))]
            }

            TransportEvent::Frame(raw) => vec![frame_to_message(&raw)],

            TransportEvent::Closed { reason, retry_in } => {
                self.state = ConnectionState::Disconnected;
                let mut messages = Vec::new();
                if let CloseReason::Error(detail) = &reason {
                    warn!(
                        component = "session",
                        event = "session.transport_error",
                        server_id = %server_id,
                        error = %detail,
                    );
                    messages.push(ConsoleMessage::error(format!("Connection error: {detail}")));
                }
                messages.push(ConsoleMessage::system(format!("Disconnected from {server_id}")));
                match retry_in {
                    Some(delay) => messages.push(ConsoleMessage::system(format!(
                        "Reconnecting in {:.1}s",
                        delay.as_secs_f64()
                    ))),
                    None => self.transport = None,
                }
                messages
            }

            TransportEvent::Reconnecting { attempt } => {
                self.state = ConnectionState::Connecting;
                debug!(
                    component = "session",
                    event = "session.reconnecting",
                    server_id = %server_id,
                    attempt,
                );
                Vec::new()
            }
        }
    }

    fn stop_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.task.abort();
        }
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.stop_transport();
    }
}

fn queue_outbound(outbound: &mpsc::Sender<String>, frame: String) -> Result<(), ConsoleError> {
    outbound.try_send(frame).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => ConsoleError::OutboundFull,
        mpsc::error::TrySendError::Closed(_) => ConsoleError::NotConnected,
    })
}

/// Turn one inbound frame into a console line
pub fn frame_to_message(raw: &str) -> ConsoleMessage {
    match ConsoleFrame::parse(raw) {
        Ok(frame) => ConsoleMessage::new(frame.kind().into(), frame.text),
        Err(e) => {
            debug!(
                component = "session",
                event = "session.bad_frame",
                error = %e,
                bytes = raw.len(),
            );
            ConsoleMessage::error(BAD_FRAME_MESSAGE)
        }
    }
}

struct TransportLink {
    url: String,
    server_id: String,
    generation: u64,
    events: mpsc::Sender<ConsoleEvent>,
}

impl TransportLink {
    /// Report an event. False once the owner has gone away.
    async fn emit(&self, event: TransportEvent) -> bool {
        self.events
            .send(ConsoleEvent::Transport {
                server_id: self.server_id.clone(),
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// Socket task: connect, pump frames both ways, and retry per policy
async fn run_transport(
    link: TransportLink,
    policy: crate::config::ReconnectPolicy,
    mut outbound: mpsc::Receiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        let reason = match tokio_tungstenite::connect_async(link.url.as_str()).await {
            Ok((ws, _response)) => {
                attempt = 0;
                if !link.emit(TransportEvent::Connected).await {
                    return;
                }
                let (mut sink, mut stream) = ws.split();

                loop {
                    tokio::select! {
                        msg = stream.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                if !link.emit(TransportEvent::Frame(text.as_str().to_owned())).await {
                                    return;
                                }
                            }
                            Some(Ok(Message::Binary(bytes))) => {
                                let raw = String::from_utf8_lossy(&bytes).into_owned();
                                if !link.emit(TransportEvent::Frame(raw)).await {
                                    return;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break CloseReason::Remote,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => break CloseReason::Error(e.to_string()),
                        },

                        out = outbound.recv() => match out {
                            Some(json) => {
                                if let Err(e) = sink.send(Message::Text(json.into())).await {
                                    break CloseReason::Error(e.to_string());
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                return;
                            }
                        },
                    }
                }
            }
            Err(e) => CloseReason::Error(e.to_string()),
        };

        attempt += 1;
        let retry_in = policy.delay_for(attempt);
        if !link
            .emit(TransportEvent::Closed {
                reason,
                retry_in,
            })
            .await
        {
            return;
        }

        let Some(delay) = retry_in else {
            return;
        };
        tokio::time::sleep(delay).await;
        if !link.emit(TransportEvent::Reconnecting { attempt }).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use std::time::Duration;

    fn session() -> (ConsoleSession, mpsc::Receiver<ConsoleEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let config = ConsoleConfig {
            // Nothing listens here; connect attempts fail fast
            ws_url: "ws://127.0.0.1:9".to_string(),
            ..ConsoleConfig::default()
        };
        (ConsoleSession::new(Arc::new(config), tx), rx)
    }

    #[test]
    fn frames_map_type_onto_kind() {
        assert_eq!(frame_to_message(r#"{"type":"system","text":"a"}"#).kind, MessageKind::System);
        assert_eq!(frame_to_message(r#"{"type":"error","text":"b"}"#).kind, MessageKind::Error);
        assert_eq!(frame_to_message(r#"{"type":"output","text":"c"}"#).kind, MessageKind::Output);
        assert_eq!(frame_to_message(r#"{"text":"d"}"#).kind, MessageKind::Output);
        assert_eq!(frame_to_message(r#"{"type":"weird","text":"e"}"#).kind, MessageKind::Output);
    }

    #[test]
    fn non_string_frame_type_is_output() {
        let numeric = frame_to_message(r#"{"type":5,"text":"hello"}"#);
        assert_eq!(numeric.kind, MessageKind::Output);
        assert_eq!(numeric.text, "hello");

        let boolean = frame_to_message(r#"{"type":true,"text":"hello"}"#);
        assert_eq!(boolean.kind, MessageKind::Output);
        assert_eq!(boolean.text, "hello");
    }

    #[test]
    fn full_and_closed_queues_map_to_distinct_errors() {
        let (tx, rx) = mpsc::channel(1);
        queue_outbound(&tx, "first".into()).unwrap();
        assert!(matches!(
            queue_outbound(&tx, "second".into()),
            Err(ConsoleError::OutboundFull)
        ));

        drop(rx);
        assert!(matches!(
            queue_outbound(&tx, "third".into()),
            Err(ConsoleError::NotConnected)
        ));
    }

    #[test]
    fn malformed_frame_becomes_one_error() {
        let msg = frame_to_message("<<garbage>>");
        assert_eq!(msg.kind, MessageKind::Error);
        assert_eq!(msg.text, BAD_FRAME_MESSAGE);
    }

    #[tokio::test]
    async fn connect_moves_to_connecting_then_connected() {
        let (mut session, _rx) = session();
        assert_eq!(session.state(), ConnectionState::Disconnected);

        session.connect("pz-01");
        assert_eq!(session.state(), ConnectionState::Connecting);

        let generation = session.generation();
        let messages = session.apply(generation, TransportEvent::Connected);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Connected to pz-01");
    }

    #[tokio::test]
    async fn bad_frame_keeps_session_connected() {
        let (mut session, _rx) = session();
        session.connect("pz-01");
        let generation = session.generation();
        session.apply(generation, TransportEvent::Connected);

        let messages = session.apply(generation, TransportEvent::Frame("nope".into()));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Error);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn remote_close_reports_disconnection() {
        let (mut session, _rx) = session();
        session.connect("pz-01");
        let generation = session.generation();
        session.apply(generation, TransportEvent::Connected);

        let messages = session.apply(
            generation,
            TransportEvent::Closed {
                reason: CloseReason::Remote,
                retry_in: None,
            },
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::System);
        assert_eq!(messages[0].text, "Disconnected from pz-01");

        // Already disconnected: a local disconnect adds nothing
        assert!(session.disconnect().is_none());
    }

    #[tokio::test]
    async fn transport_error_with_retry_reports_both() {
        let (mut session, _rx) = session();
        session.connect("pz-01");
        let generation = session.generation();

        let messages = session.apply(
            generation,
            TransportEvent::Closed {
                reason: CloseReason::Error("refused".into()),
                retry_in: Some(Duration::from_millis(1500)),
            },
        );
        let kinds: Vec<MessageKind> = messages.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::Error, MessageKind::System, MessageKind::System]);
        assert_eq!(messages[2].text, "Reconnecting in 1.5s");

        session.apply(generation, TransportEvent::Reconnecting { attempt: 1 });
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn events_from_old_generation_are_ignored() {
        let (mut session, _rx) = session();
        session.connect("a");
        let old = session.generation();
        session.connect("b");

        assert!(session.apply(old, TransportEvent::Connected).is_empty());
        assert!(session.apply(old, TransportEvent::Frame(r#"{"text":"late"}"#.into())).is_empty());
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert_eq!(session.server_id(), Some("b"));
    }

    #[tokio::test]
    async fn send_fails_fast_when_not_connected() {
        let (mut session, _rx) = session();
        assert!(matches!(session.send(ControlAction::Start), Err(ConsoleError::NotConnected)));

        session.connect("pz-01");
        assert!(matches!(session.send(ControlAction::Start), Err(ConsoleError::NotConnected)));
    }

    #[tokio::test]
    async fn local_disconnect_reports_once() {
        let (mut session, _rx) = session();
        session.connect("pz-01");
        let generation = session.generation();
        session.apply(generation, TransportEvent::Connected);

        let notice = session.disconnect().expect("disconnect notice");
        assert_eq!(notice.kind, MessageKind::System);
        assert!(session.disconnect().is_none());

        // The closed socket can no longer change state
        assert!(session.apply(generation, TransportEvent::Connected).is_empty());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_server_reports_closed_with_error() {
        let (mut session, mut rx) = session();
        session.connect("pz-01");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("transport event")
            .expect("channel open");
        match event {
            ConsoleEvent::Transport {
                server_id,
                event: TransportEvent::Closed { reason, retry_in },
                ..
            } => {
                assert_eq!(server_id, "pz-01");
                assert!(matches!(reason, CloseReason::Error(_)));
                assert_eq!(retry_in, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
