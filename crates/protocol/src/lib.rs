//! serverdeck protocol
//!
//! Wire types shared by the console client and the game-server backend.
//! Stream frames travel as JSON text frames over WebSocket; command and
//! scheduler calls are JSON request/response bodies over HTTP.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::{ControlFrame, ExecuteRequest, ScheduleRequest};
pub use server::{ConsoleFrame, ExecuteResponse, ScheduleReply};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
