//! Server console - owner of the active server identity
//!
//! `ServerConsole` holds the live session, the per-server state (log, saved
//! commands, batch selection) and the single event channel every background
//! task reports on. Events are applied one at a time by whoever drives
//! `pump`/`next_event`.
//!
//! Every identity change bumps an epoch. Requests capture the epoch when they
//! are dispatched and a completion carrying an older epoch is dropped, so a
//! slow response can never land in another server's log (including after an
//! A → B → A switch).

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use serverdeck_protocol::{ControlAction, ExecuteRequest, Weekday};

use crate::api::{ConsoleApi, HttpConsoleApi};
use crate::batch::{BatchSelector, FavoriteOutcome, OsTarget};
use crate::commands::{Cycle, SavedCommands};
use crate::config::ConsoleConfig;
use crate::dispatcher::{CommandDispatcher, Effect};
use crate::error::ConsoleError;
use crate::event::ConsoleEvent;
use crate::log::MessageLog;
use crate::message::ConsoleMessage;
use crate::scheduler::{ScheduledJob, SchedulerClient};
use crate::session::{ConnectionState, ConsoleSession};
use crate::store::{get_json, keys, put_json, KvStore};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Running,
    #[default]
    Stopped,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Running => "RUNNING",
            ServerStatus::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the active server's state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSession {
    pub server_id: String,
    pub status: ServerStatus,
    pub batch_path: Option<String>,
    pub favorite_batches: Vec<String>,
    pub os_target: OsTarget,
}

struct ActiveServer {
    server_id: String,
    status: ServerStatus,
    log: MessageLog,
    dispatcher: CommandDispatcher,
    batch: BatchSelector,
}

pub struct ServerConsole<A: ConsoleApi = HttpConsoleApi> {
    config: Arc<ConsoleConfig>,
    store: Arc<dyn KvStore>,
    api: Arc<A>,
    events_tx: mpsc::Sender<ConsoleEvent>,
    events_rx: mpsc::Receiver<ConsoleEvent>,
    session: ConsoleSession,
    epoch: u64,
    active: Option<ActiveServer>,
    scheduler: SchedulerClient,
    unseen: VecDeque<ConsoleMessage>,
}

impl<A: ConsoleApi> ServerConsole<A> {
    pub fn new(config: ConsoleConfig, store: Arc<dyn KvStore>, api: A) -> Self {
        let config = Arc::new(config);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let session = ConsoleSession::new(config.clone(), events_tx.clone());
        Self {
            config,
            store,
            api: Arc::new(api),
            events_tx,
            events_rx,
            session,
            epoch: 0,
            active: None,
            scheduler: SchedulerClient::new(),
            unseen: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Reopen the last active server, if one was persisted
    pub fn restore(&mut self) -> Result<Option<String>, ConsoleError> {
        let last: Option<String> = get_json(self.store.as_ref(), &keys::active_server())?;
        match last.filter(|id| !id.trim().is_empty()) {
            Some(server_id) => {
                self.open(&server_id)?;
                Ok(Some(server_id))
            }
            None => Ok(None),
        }
    }

    /// Make `server_id` active and connect its stream
    pub fn open(&mut self, server_id: &str) -> Result<(), ConsoleError> {
        self.select_server(server_id)?;
        self.session.connect(server_id.trim());
        Ok(())
    }

    /// Make `server_id` active without connecting. Commands and scheduling
    /// work over the request channel alone.
    pub fn select_server(&mut self, server_id: &str) -> Result<(), ConsoleError> {
        let server_id = server_id.trim();
        if server_id.is_empty() {
            return Err(ConsoleError::NoActiveServer);
        }

        // The old stream reports its closure into the old log
        if let Some(notice) = self.session.disconnect() {
            self.record(notice);
        }

        self.epoch += 1;
        self.scheduler.reset();
        self.active = None;

        let log = MessageLog::load(self.store.clone(), server_id, self.config.log_capacity)?;
        let saved = SavedCommands::load(self.store.clone(), server_id)?;
        let batch = BatchSelector::load(self.store.clone(), server_id, self.config.os_target)?;
        put_json(self.store.as_ref(), &keys::active_server(), server_id)?;

        info!(
            component = "console",
            event = "console.server_selected",
            server_id = %server_id,
            epoch = self.epoch,
            history = log.len(),
        );

        self.active = Some(ActiveServer {
            server_id: server_id.to_string(),
            status: ServerStatus::default(),
            log,
            dispatcher: CommandDispatcher::new(server_id, saved),
            batch,
        });
        Ok(())
    }

    /// Drop the active server. Late completions are discarded.
    pub fn close(&mut self) {
        if let Some(notice) = self.session.disconnect() {
            self.record(notice);
        }
        self.epoch += 1;
        self.scheduler.reset();
        if let Some(active) = self.active.take() {
            debug!(
                component = "console",
                event = "console.closed",
                server_id = %active.server_id,
            );
        }
    }

    /// Close the stream but keep the server active
    pub fn disconnect(&mut self) {
        if let Some(notice) = self.session.disconnect() {
            self.record(notice);
        }
    }

    /// Drop the current stream (if any) and connect again
    pub fn reconnect(&mut self) -> Result<(), ConsoleError> {
        let server_id = self.require_active()?.server_id.clone();
        if let Some(notice) = self.session.disconnect() {
            self.record(notice);
        }
        self.session.connect(&server_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Wait for the next event from the stream or an outstanding request
    pub async fn next_event(&mut self) -> Option<ConsoleEvent> {
        self.events_rx.recv().await
    }

    /// Apply one event to the active server's state
    pub fn apply(&mut self, event: ConsoleEvent) {
        match event {
            ConsoleEvent::Transport {
                server_id,
                generation,
                event,
            } => {
                if self.server_id() != Some(server_id.as_str()) {
                    debug!(
                        component = "console",
                        event = "console.stale_transport",
                        server_id = %server_id,
                    );
                    return;
                }
                for message in self.session.apply(generation, event) {
                    self.record(message);
                }
            }

            ConsoleEvent::CommandFinished { id, epoch, result } => {
                if epoch != self.epoch {
                    debug!(
                        component = "console",
                        event = "console.stale_response",
                        request_id = %id,
                        epoch,
                        current = self.epoch,
                    );
                    return;
                }
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                let effects = active.dispatcher.complete(&id, result);
                self.run_effects(effects);
            }

            ConsoleEvent::ScheduleFinished { id, epoch, result } => {
                if epoch != self.epoch {
                    debug!(
                        component = "console",
                        event = "console.stale_schedule",
                        request_id = %id,
                        epoch,
                        current = self.epoch,
                    );
                    return;
                }
                if let Some(message) = self.scheduler.complete(&id, result) {
                    self.record(message);
                }
            }
        }
    }

    /// Wait for one event, apply it, and return every line added since the
    /// last call to `take_unseen`
    pub async fn pump(&mut self) -> Vec<ConsoleMessage> {
        if let Some(event) = self.next_event().await {
            self.apply(event);
        }
        self.take_unseen()
    }

    /// Lines appended since the last call
    pub fn take_unseen(&mut self) -> Vec<ConsoleMessage> {
        self.unseen.drain(..).collect()
    }

    /// Requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        let commands = self
            .active
            .as_ref()
            .map(|a| a.dispatcher.pending_count())
            .unwrap_or(0);
        commands + self.scheduler.pending_count()
    }

    // -----------------------------------------------------------------------
    // Log
    // -----------------------------------------------------------------------

    pub fn messages(&self) -> impl Iterator<Item = &ConsoleMessage> {
        self.active.iter().flat_map(|a| a.log.messages())
    }

    pub fn clear_log(&mut self) -> Result<(), ConsoleError> {
        let active = self.require_active_mut()?;
        active.log.clear()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Input and commands
    // -----------------------------------------------------------------------

    pub fn input(&self) -> &str {
        self.active.as_ref().map(|a| a.dispatcher.input()).unwrap_or("")
    }

    pub fn set_input(&mut self, input: &str) {
        if let Some(active) = self.active.as_mut() {
            active.dispatcher.set_input(input);
        }
    }

    pub fn suggestions(&self) -> &[String] {
        self.active
            .as_ref()
            .map(|a| a.dispatcher.suggestions())
            .unwrap_or(&[])
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.active.as_ref().and_then(|a| a.dispatcher.highlighted())
    }

    pub fn cycle(&mut self, direction: Cycle) {
        if let Some(active) = self.active.as_mut() {
            active.dispatcher.cycle(direction);
        }
    }

    pub fn dismiss(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.dispatcher.dismiss();
        }
    }

    pub fn saved_commands(&self) -> &[String] {
        self.active
            .as_ref()
            .map(|a| a.dispatcher.saved_commands())
            .unwrap_or(&[])
    }

    /// Execute the highlighted suggestion or the raw input
    pub fn confirm(&mut self) -> Result<Option<String>, ConsoleError> {
        let active = self.require_active_mut()?;
        let effects = active.dispatcher.confirm(active.batch.batch_path());
        Ok(self.run_effects(effects))
    }

    /// Execute a command. Returns the request id when one was sent.
    pub fn execute(&mut self, text: &str) -> Result<Option<String>, ConsoleError> {
        let active = self.require_active_mut()?;
        let effects = active.dispatcher.execute(text, active.batch.batch_path());
        Ok(self.run_effects(effects))
    }

    /// Start, stop or restart the server process through the command call
    pub fn control(&mut self, action: ControlAction) -> Result<Option<String>, ConsoleError> {
        let active = self.require_active_mut()?;
        match active.dispatcher.control(action, active.batch.batch_path()) {
            Ok(effects) => Ok(self.run_effects(effects)),
            Err(e) => {
                self.record(ConsoleMessage::error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Write a control frame on the live stream
    pub fn send(&mut self, action: ControlAction) -> Result<(), ConsoleError> {
        if let Err(e) = self.session.send(action) {
            self.record(ConsoleMessage::error(e.to_string()));
            return Err(e);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Batch files
    // -----------------------------------------------------------------------

    pub fn select_batch(&mut self, path: &str) -> Result<(), ConsoleError> {
        let active = self.require_active_mut()?;
        match active.batch.select(path) {
            Ok(_) => {
                let selected = active.batch.batch_path().unwrap_or_default().to_string();
                self.record(ConsoleMessage::system(format!("Batch file set to {selected}")));
                Ok(())
            }
            Err(e) => {
                self.record(ConsoleMessage::error(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn add_favorite(&mut self, path: &str) -> Result<FavoriteOutcome, ConsoleError> {
        let active = self.require_active_mut()?;
        match active.batch.add_favorite(path) {
            Ok(outcome) => {
                let path = path.trim();
                let text = match outcome {
                    FavoriteOutcome::Added => format!("Added favorite: {path}"),
                    FavoriteOutcome::AlreadyPresent => format!("{path} is already a favorite"),
                };
                self.record(ConsoleMessage::system(text));
                Ok(outcome)
            }
            Err(e) => {
                self.record(ConsoleMessage::error(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn remove_favorite(&mut self, path: &str) -> Result<bool, ConsoleError> {
        let active = self.require_active_mut()?;
        let removed = active.batch.remove_favorite(path)?;
        if removed {
            self.record(ConsoleMessage::system(format!("Removed favorite: {path}")));
        }
        Ok(removed)
    }

    pub fn clear_batch(&mut self) -> Result<(), ConsoleError> {
        let active = self.require_active_mut()?;
        active.batch.clear_selection()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Register a recurring restart for the active server. Returns the
    /// request id; the outcome arrives as a console line.
    pub fn schedule_restart(
        &mut self,
        hour: u8,
        minute: u8,
        days: &[Weekday],
    ) -> Result<String, ConsoleError> {
        let server_id = self.require_active()?.server_id.clone();
        let job = match ScheduledJob::new(&server_id, hour, minute, days) {
            Ok(job) => job,
            Err(e) => {
                self.record(ConsoleMessage::error(e.to_string()));
                return Err(e);
            }
        };

        let (id, request) = self.scheduler.register(job);
        let api = self.api.clone();
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let request_id = id.clone();
        tokio::spawn(async move {
            let result = api.schedule_restart(request).await;
            let _ = events
                .send(ConsoleEvent::ScheduleFinished { id, epoch, result })
                .await;
        });
        Ok(request_id)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn server_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.server_id.as_str())
    }

    pub fn status(&self) -> Option<ServerStatus> {
        self.active.as_ref().map(|a| a.status)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn server_session(&self) -> Option<ServerSession> {
        self.active.as_ref().map(|a| ServerSession {
            server_id: a.server_id.clone(),
            status: a.status,
            batch_path: a.batch.batch_path().map(str::to_string),
            favorite_batches: a.batch.favorites().to_vec(),
            os_target: a.batch.os(),
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_active(&self) -> Result<&ActiveServer, ConsoleError> {
        self.active.as_ref().ok_or(ConsoleError::NoActiveServer)
    }

    fn require_active_mut(&mut self) -> Result<&mut ActiveServer, ConsoleError> {
        self.active.as_mut().ok_or(ConsoleError::NoActiveServer)
    }

    /// Carry out dispatcher effects. Returns the id of the request started,
    /// if any.
    fn run_effects(&mut self, effects: Vec<Effect>) -> Option<String> {
        let mut request_id = None;
        for effect in effects {
            match effect {
                Effect::Append(message) => self.record(message),
                Effect::Request { id, request } => {
                    self.spawn_execute(id.clone(), request);
                    request_id = Some(id);
                }
                Effect::SetStatus(status) => {
                    if let Some(active) = self.active.as_mut() {
                        info!(
                            component = "console",
                            event = "console.status_changed",
                            server_id = %active.server_id,
                            status = %status,
                        );
                        active.status = status;
                    }
                }
            }
        }
        request_id
    }

    fn spawn_execute(&self, id: String, request: ExecuteRequest) {
        let api = self.api.clone();
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = api.execute(request).await;
            let _ = events
                .send(ConsoleEvent::CommandFinished { id, epoch, result })
                .await;
        });
    }

    /// Append to the active log and queue for display. A failed write is
    /// logged; the line is still shown.
    fn record(&mut self, message: ConsoleMessage) {
        if let Some(active) = self.active.as_mut() {
            if let Err(e) = active.log.append(message.clone()) {
                warn!(
                    component = "console",
                    event = "console.persist_failed",
                    server_id = %active.server_id,
                    error = %e,
                );
            }
        }
        self.unseen.push_back(message);
        while self.unseen.len() > self.config.log_capacity.max(1) {
            self.unseen.pop_front();
        }
    }
}
