//! Events delivered to the console owner
//!
//! The stream reader and every outstanding request run as their own tasks
//! and report back over one channel. The owner applies events one at a time.

use std::time::Duration;

use serverdeck_protocol::ExecuteResponse;

use crate::api::ScheduleOutcome;
use crate::error::ApiError;

#[derive(Debug)]
pub enum ConsoleEvent {
    /// Something happened on a console stream
    Transport {
        server_id: String,
        generation: u64,
        event: TransportEvent,
    },

    /// A command request finished
    CommandFinished {
        id: String,
        epoch: u64,
        result: Result<ExecuteResponse, ApiError>,
    },

    /// A scheduler registration finished
    ScheduleFinished {
        id: String,
        epoch: u64,
        result: Result<ScheduleOutcome, ApiError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Connected,

    /// Raw text of one inbound frame
    Frame(String),

    /// The stream ended. `retry_in` is set when the reconnect policy will
    /// try again after that delay.
    Closed {
        reason: CloseReason,
        retry_in: Option<Duration>,
    },

    /// A reconnect attempt is starting
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of stream from the server
    Remote,
    /// Connect failure or transport error
    Error(String),
}
