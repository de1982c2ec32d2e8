//! serverdeck console
//!
//! Live console sessions for managed game servers: the streamed output log,
//! operator command dispatch with saved-command autocomplete, launch-script
//! (batch file) selection, and recurring restart registration.
//!
//! `ServerConsole` is the entry point. It owns the active server identity
//! and applies events from the stream task and from outstanding requests one
//! at a time.

pub mod api;
pub mod batch;
pub mod commands;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod log;
pub mod message;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod time;

pub use api::{ConsoleApi, HttpConsoleApi, ScheduleOutcome};
pub use batch::{FavoriteOutcome, OsTarget};
pub use commands::Cycle;
pub use config::{ConsoleConfig, ReconnectPolicy};
pub use console::{ServerConsole, ServerSession, ServerStatus};
pub use error::{ApiError, ConsoleError, StoreError};
pub use event::ConsoleEvent;
pub use message::{ConsoleMessage, MessageKind};
pub use session::ConnectionState;
pub use store::{KvStore, MemoryStore, SqliteStore};
