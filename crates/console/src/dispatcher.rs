//! Command dispatcher - input line, saved commands and request bookkeeping
//!
//! Pure and synchronous: every operation returns `Effect`s and the owner
//! performs them (append to the log, start a request, update status). That
//! keeps the execution contract testable without a runtime or a network.

use std::collections::HashMap;

use tracing::{debug, warn};

use serverdeck_protocol::{new_id, ControlAction, ExecuteRequest, ExecuteResponse};

use crate::commands::{Autocomplete, Cycle, SavedCommands};
use crate::console::ServerStatus;
use crate::error::{ApiError, ConsoleError};
use crate::message::ConsoleMessage;

pub const COMMAND_FAILED_MESSAGE: &str = "Command failed";

/// Work the owner must carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Append(ConsoleMessage),
    Request { id: String, request: ExecuteRequest },
    SetStatus(ServerStatus),
}

#[derive(Debug, Clone)]
struct PendingCommand {
    command: String,
    control: Option<ControlAction>,
}

pub struct CommandDispatcher {
    server_id: String,
    saved: SavedCommands,
    autocomplete: Autocomplete,
    input: String,
    pending: HashMap<String, PendingCommand>,
}

impl CommandDispatcher {
    pub fn new(server_id: &str, saved: SavedCommands) -> Self {
        Self {
            server_id: server_id.to_string(),
            saved,
            autocomplete: Autocomplete::default(),
            input: String::new(),
            pending: HashMap::new(),
        }
    }

    pub fn saved_commands(&self) -> &[String] {
        self.saved.all()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the input line and refresh the candidates
    pub fn set_input(&mut self, input: &str) {
        self.input = input.to_string();
        self.autocomplete.update(self.saved.matching(input));
    }

    pub fn suggestions(&self) -> &[String] {
        self.autocomplete.candidates()
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.autocomplete.highlighted()
    }

    pub fn cycle(&mut self, direction: Cycle) {
        self.autocomplete.cycle(direction);
    }

    pub fn dismiss(&mut self) {
        self.autocomplete.dismiss();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Execute the highlighted suggestion, or the raw input when none is
    pub fn confirm(&mut self, batch_path: Option<&str>) -> Vec<Effect> {
        let text = match self.autocomplete.highlighted() {
            Some(suggestion) => suggestion.to_string(),
            None => self.input.clone(),
        };
        self.execute(&text, batch_path)
    }

    /// Echo, remember and send `text`. Blank input does nothing.
    pub fn execute(&mut self, text: &str, batch_path: Option<&str>) -> Vec<Effect> {
        self.dispatch(text, batch_path, None)
    }

    /// Run a process control action. Requires a batch file.
    pub fn control(
        &mut self,
        action: ControlAction,
        batch_path: Option<&str>,
    ) -> Result<Vec<Effect>, ConsoleError> {
        if batch_path.is_none() {
            return Err(ConsoleError::MissingBatchPath {
                action: action.to_string(),
            });
        }
        Ok(self.dispatch(action.as_str(), batch_path, Some(action)))
    }

    fn dispatch(
        &mut self,
        text: &str,
        batch_path: Option<&str>,
        control: Option<ControlAction>,
    ) -> Vec<Effect> {
        let command = text.trim();
        if command.is_empty() {
            return Vec::new();
        }
        let command = command.to_string();

        let mut effects = vec![Effect::Append(ConsoleMessage::command(&command))];
        self.input.clear();
        self.autocomplete.dismiss();

        match self.saved.insert(&command) {
            Ok(true) => effects.push(Effect::Append(ConsoleMessage::system(format!(
                "Saved command: {command}"
            )))),
            Ok(false) => {}
            Err(e) => {
                warn!(
                    component = "dispatcher",
                    event = "dispatcher.save_failed",
                    server_id = %self.server_id,
                    error = %e,
                );
                effects.push(Effect::Append(ConsoleMessage::error(format!(
                    "Could not save command: {e}"
                ))));
            }
        }

        let id = new_id();
        self.pending.insert(
            id.clone(),
            PendingCommand {
                command: command.clone(),
                control,
            },
        );
        effects.push(Effect::Request {
            id,
            request: ExecuteRequest {
                game_id: self.server_id.clone(),
                command,
                batch_path: batch_path.map(str::to_string),
            },
        });
        effects
    }

    /// Fold a finished request into effects. Unknown ids are dropped.
    pub fn complete(&mut self, id: &str, result: Result<ExecuteResponse, ApiError>) -> Vec<Effect> {
        let Some(pending) = self.pending.remove(id) else {
            debug!(
                component = "dispatcher",
                event = "dispatcher.unknown_response",
                request_id = %id,
                "Dropping response with no pending command"
            );
            return Vec::new();
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    component = "dispatcher",
                    event = "dispatcher.request_failed",
                    server_id = %self.server_id,
                    command = %pending.command,
                    error = %e,
                );
                return vec![Effect::Append(ConsoleMessage::error(COMMAND_FAILED_MESSAGE))];
            }
        };

        let mut effects = Vec::new();
        let failed = response.error.is_some();
        if let Some(error) = response.error {
            effects.push(Effect::Append(ConsoleMessage::error(error)));
        }
        if let Some(output) = response.output {
            effects.push(Effect::Append(ConsoleMessage::output(output)));
        }
        if let (Some(action), false) = (pending.control, failed) {
            let status = match action {
                ControlAction::Start => ServerStatus::Running,
                ControlAction::Stop | ControlAction::Restart => ServerStatus::Stopped,
            };
            effects.push(Effect::SetStatus(status));
        }
        effects
    }
}
