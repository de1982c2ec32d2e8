//! Server → Client messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::FrameKind;

/// A frame streamed from the server console.
///
/// `type` is kept as a raw JSON value so that unknown, missing or
/// non-string kinds degrade to output instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleFrame {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub text: String,
}

impl ConsoleFrame {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_wire(self.kind.as_ref().and_then(Value::as_str))
    }
}

/// Response of the command execution call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Body returned by the scheduling service, on accept or reject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScheduleReply {
    /// Service-provided rejection detail, if any.
    ///
    /// `detail` may be a plain string or a structured validation payload.
    pub fn rejection_detail(&self) -> Option<String> {
        let from_detail = match &self.detail {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        from_detail
            .or_else(|| self.error.clone())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}
