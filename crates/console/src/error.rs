//! Error types for the console subsystem

use thiserror::Error;

use crate::batch::OsTarget;

/// Errors from the persistence port
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Errors from the request channel (command execution, scheduler registration)
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a usable response
    #[error("Request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status and no usable body
    #[error("Service returned HTTP {status}")]
    Status { status: u16 },
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::Transport(error.to_string())
    }
}

/// Errors surfaced by console operations
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("No server selected")]
    NoActiveServer,

    #[error("Console is not connected")]
    NotConnected,

    #[error("Outbound queue is full, control frame dropped")]
    OutboundFull,

    #[error("Failed to encode control frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Select a batch file before running {action}")]
    MissingBatchPath { action: String },

    #[error("Invalid batch file {path:?}: expected a {} script", .os.extension())]
    InvalidBatchPath { path: String, os: OsTarget },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
