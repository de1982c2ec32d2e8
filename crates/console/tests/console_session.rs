//! End-to-end console tests against a fake panel backend.
//!
//! The backend is a small axum app on an ephemeral port serving the console
//! stream, the command call and the scheduler call.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use serverdeck_console::{
    ConnectionState, ConsoleApi, ConsoleConfig, ConsoleMessage, HttpConsoleApi, KvStore,
    MemoryStore, MessageKind, ReconnectPolicy, ServerConsole, SqliteStore,
};
use serverdeck_protocol::{ControlAction, Weekday};

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/console/execute", post(execute))
        .route("/console/{server_id}", get(stream))
        .route("/schedule", post(schedule));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn stream(Path(server_id): Path<String>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| feed(socket, server_id))
}

/// Send a fixed script. `ephemeral` closes afterwards; everything else
/// answers control frames until the client goes away.
async fn feed(mut socket: WebSocket, server_id: String) {
    let script = [
        json!({"type": "system", "text": format!("Attached to {server_id}")}).to_string(),
        json!({"text": "Loading world"}).to_string(),
        "not json at all".to_string(),
        json!({"type": "error", "text": "Missing mod: Hydrocraft"}).to_string(),
        json!({"type": "chatter", "text": "Player joined"}).to_string(),
    ];
    for frame in script {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    if server_id == "ephemeral" {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(text.as_str()).unwrap_or_default();
            let action = frame["action"].as_str().unwrap_or("?");
            let reply = json!({"type": "system", "text": format!("control: {action}")});
            if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }
        }
    }
}

async fn execute(Json(body): Json<Value>) -> Response {
    let command = body["command"].as_str().unwrap_or_default();
    match command {
        "save" => Json(json!({"output": "Saved 42 players"})).into_response(),
        "start" => {
            let batch = body["batchPath"].as_str().unwrap_or("none");
            Json(json!({"output": format!("Launching {batch}")})).into_response()
        }
        "boom" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unknown command"})),
        )
            .into_response(),
        "crash" => StatusCode::BAD_GATEWAY.into_response(),
        _ => Json(json!({})).into_response(),
    }
}

async fn schedule(Json(body): Json<Value>) -> Response {
    let game_id = body["game_id"].as_str().unwrap_or_default();
    let hour = body["hour"].as_u64().unwrap_or(99);
    let minute = body["minute"].as_u64().unwrap_or(99);
    let days: Vec<&str> = body["days"]
        .as_array()
        .map(|days| days.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if game_id == "pz-01" {
        let detail = format!(
            "a restart is already scheduled at {hour:02}:{minute:02} on {}",
            days.join(",")
        );
        return (StatusCode::CONFLICT, Json(json!({"detail": detail}))).into_response();
    }
    Json(json!({"message": format!("Restart scheduled for {game_id}")})).into_response()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config_for(addr: SocketAddr) -> ConsoleConfig {
    ConsoleConfig {
        api_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}"),
        scheduler_url: format!("http://{addr}"),
        request_timeout_secs: 5,
        ..ConsoleConfig::default()
    }
}

fn console_for(config: ConsoleConfig, store: Arc<dyn KvStore>) -> ServerConsole<HttpConsoleApi> {
    let api = HttpConsoleApi::new(&config).unwrap();
    ServerConsole::new(config, store, api)
}

/// Pump events into `seen` until `done` holds
async fn pump_until<A, F>(console: &mut ServerConsole<A>, seen: &mut Vec<ConsoleMessage>, done: F)
where
    A: ConsoleApi,
    F: Fn(&[ConsoleMessage]) -> bool,
{
    seen.extend(console.take_unseen());
    tokio::time::timeout(Duration::from_secs(10), async {
        while !done(seen.as_slice()) {
            seen.extend(console.pump().await);
        }
    })
    .await
    .expect("condition reached before timeout");
}

async fn settle<A: ConsoleApi>(console: &mut ServerConsole<A>) -> Vec<ConsoleMessage> {
    let mut seen = Vec::new();
    seen.extend(console.take_unseen());
    tokio::time::timeout(Duration::from_secs(10), async {
        while console.pending_requests() > 0 {
            seen.extend(console.pump().await);
        }
    })
    .await
    .expect("requests settle before timeout");
    seen.extend(console.take_unseen());
    seen
}

fn has_text(seen: &[ConsoleMessage], text: &str) -> bool {
    seen.iter().any(|m| m.text == text)
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streamed_frames_land_in_the_log_in_order() {
    let addr = spawn_backend().await;
    let mut console = console_for(config_for(addr), Arc::new(MemoryStore::new()));
    console.open("ephemeral").unwrap();
    assert_eq!(console.connection_state(), ConnectionState::Connecting);

    let mut seen = Vec::new();
    pump_until(&mut console, &mut seen, |s| {
        has_text(s, "Disconnected from ephemeral")
    })
    .await;

    let lines: Vec<(MessageKind, &str)> = seen.iter().map(|m| (m.kind, m.text.as_str())).collect();
    assert_eq!(
        lines,
        vec![
            (MessageKind::System, "Connected to ephemeral"),
            (MessageKind::System, "Attached to ephemeral"),
            (MessageKind::Output, "Loading world"),
            (MessageKind::Error, "Bad websocket message"),
            (MessageKind::Error, "Missing mod: Hydrocraft"),
            (MessageKind::Output, "Player joined"),
            (MessageKind::System, "Disconnected from ephemeral"),
        ]
    );
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);
    assert_eq!(console.messages().count(), seen.len());
}

#[tokio::test]
async fn control_frames_reach_the_server() {
    let addr = spawn_backend().await;
    let mut console = console_for(config_for(addr), Arc::new(MemoryStore::new()));
    console.open("pz-01").unwrap();

    let mut seen = Vec::new();
    pump_until(&mut console, &mut seen, |s| has_text(s, "Player joined")).await;
    assert_eq!(console.connection_state(), ConnectionState::Connected);

    console.send(ControlAction::Restart).unwrap();
    pump_until(&mut console, &mut seen, |s| has_text(s, "control: restart")).await;

    console.disconnect();
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        console.messages().last().map(|m| m.text.as_str()),
        Some("Disconnected from pz-01")
    );
}

#[tokio::test]
async fn reconnect_policy_retries_after_remote_close() {
    let addr = spawn_backend().await;
    let config = ConsoleConfig {
        reconnect: ReconnectPolicy {
            enabled: true,
            initial_delay_ms: 100,
            max_delay_ms: 400,
            max_attempts: 3,
        },
        ..config_for(addr)
    };
    let mut console = console_for(config, Arc::new(MemoryStore::new()));
    console.open("ephemeral").unwrap();

    let mut seen = Vec::new();
    pump_until(&mut console, &mut seen, |s| {
        s.iter().filter(|m| m.text == "Connected to ephemeral").count() >= 2
    })
    .await;
    assert!(has_text(&seen, "Reconnecting in 0.1s"));

    console.close();
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);
    assert_eq!(console.server_id(), None);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_responses_are_classified() {
    let addr = spawn_backend().await;
    let mut console = console_for(config_for(addr), Arc::new(MemoryStore::new()));
    console.select_server("pz-01").unwrap();

    console.execute("save").unwrap();
    let seen = settle(&mut console).await;
    assert_eq!(seen.last().map(|m| (m.kind, m.text.as_str())), Some((MessageKind::Output, "Saved 42 players")));

    // Application error on a failed status keeps the server's text
    console.execute("boom").unwrap();
    let seen = settle(&mut console).await;
    assert_eq!(seen.last().map(|m| (m.kind, m.text.as_str())), Some((MessageKind::Error, "unknown command")));

    // Failed status with no body is a transport failure
    console.execute("crash").unwrap();
    let seen = settle(&mut console).await;
    assert_eq!(seen.last().map(|m| (m.kind, m.text.as_str())), Some((MessageKind::Error, "Command failed")));

    // Empty response adds nothing beyond the echo
    console.execute("status").unwrap();
    let seen = settle(&mut console).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, MessageKind::Command);
}

#[tokio::test]
async fn control_action_carries_batch_path() {
    let addr = spawn_backend().await;
    let config = ConsoleConfig {
        os_target: serverdeck_console::OsTarget::Unix,
        ..config_for(addr)
    };
    let mut console = console_for(config, Arc::new(MemoryStore::new()));
    console.select_server("pz-01").unwrap();

    assert!(console.control(ControlAction::Start).is_err());
    console.select_batch("/srv/pz/start-server.sh").unwrap();
    console.control(ControlAction::Start).unwrap();
    let seen = settle(&mut console).await;

    assert!(has_text(&seen, "Launching /srv/pz/start-server.sh"));
    assert_eq!(console.status(), Some(serverdeck_console::ServerStatus::Running));
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schedule_rejection_carries_service_detail() {
    let addr = spawn_backend().await;
    let mut console = console_for(config_for(addr), Arc::new(MemoryStore::new()));
    console.select_server("pz-01").unwrap();

    console
        .schedule_restart(3, 0, &[Weekday::Mon, Weekday::Wed])
        .unwrap();
    let seen = settle(&mut console).await;
    let last = seen.last().unwrap();
    assert_eq!(last.kind, MessageKind::Error);
    assert!(last
        .text
        .contains("a restart is already scheduled at 03:00 on mon,wed"));
}

#[tokio::test]
async fn schedule_acceptance_is_a_system_line() {
    let addr = spawn_backend().await;
    let mut console = console_for(config_for(addr), Arc::new(MemoryStore::new()));
    console.select_server("pz-02").unwrap();

    console.schedule_restart(4, 30, &[Weekday::Sun]).unwrap();
    let seen = settle(&mut console).await;
    let last = seen.last().unwrap();
    assert_eq!(last.kind, MessageKind::System);
    assert_eq!(last.text, "Restart scheduled for pz-02");
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_state_survives_restart() {
    let addr = spawn_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("console.db");

    let before: Vec<ConsoleMessage> = {
        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&db).unwrap());
        let mut console = console_for(config_for(addr), store);
        console.select_server("pz-01").unwrap();
        console.execute("players").unwrap();
        settle(&mut console).await;
        console.messages().cloned().collect()
    };
    assert_eq!(before.len(), 2);

    let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&db).unwrap());
    let mut console = console_for(config_for(addr), store);
    assert_eq!(console.restore().unwrap().as_deref(), Some("pz-01"));
    let after: Vec<ConsoleMessage> = console.messages().cloned().collect();
    assert_eq!(after, before);
    assert!(console.saved_commands().iter().any(|c| c == "players"));
}
