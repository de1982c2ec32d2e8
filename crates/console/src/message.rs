//! Console messages - one line of operator-facing history

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use serverdeck_protocol::FrameKind;

use crate::time::{clock_time, now_millis};

/// Which stream a console line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    Command,
    Output,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::System => "system",
            MessageKind::Command => "command",
            MessageKind::Output => "output",
            MessageKind::Error => "error",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FrameKind> for MessageKind {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::System => MessageKind::System,
            FrameKind::Output => MessageKind::Output,
            FrameKind::Error => MessageKind::Error,
        }
    }
}

/// A single, immutable console line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub id: String,
    pub kind: MessageKind,
    pub text: String,
    pub time: String,
}

impl ConsoleMessage {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self::at(now_millis(), kind, text)
    }

    /// Build a message stamped with `millis`; the id is the timestamp plus a
    /// random suffix so two lines in the same millisecond stay distinct.
    pub fn at(millis: u64, kind: MessageKind, text: impl Into<String>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}-{}", millis, &suffix[..8]),
            kind,
            text: text.into(),
            time: clock_time(millis),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageKind::System, text)
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Command, text)
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Output, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, text)
    }
}
