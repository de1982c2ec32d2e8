//! Client → Server messages

use serde::{Deserialize, Serialize};

use crate::types::{ControlAction, Weekday};

/// Body of the command execution call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub game_id: String,
    pub command: String,
    pub batch_path: Option<String>,
}

/// Body of the scheduler registration call.
///
/// The scheduling service uses snake_case field names, unlike the console API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub game_id: String,
    pub hour: u8,
    pub minute: u8,
    pub days: Vec<Weekday>,
}

/// Frames the client writes onto the console stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Control { action: ControlAction },
}
