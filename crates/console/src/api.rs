//! Request channel - command execution and scheduler registration over HTTP

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use serverdeck_protocol::{ExecuteRequest, ExecuteResponse, ScheduleReply, ScheduleRequest};

use crate::config::ConsoleConfig;
use crate::error::ApiError;

/// Outcome of a scheduler registration that reached the service
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Accepted(ScheduleReply),
    Rejected { status: u16, reply: ScheduleReply },
}

/// Request/response calls the console makes outside the stream
pub trait ConsoleApi: Send + Sync + 'static {
    fn execute(
        &self,
        request: ExecuteRequest,
    ) -> impl Future<Output = Result<ExecuteResponse, ApiError>> + Send;

    fn schedule_restart(
        &self,
        request: ScheduleRequest,
    ) -> impl Future<Output = Result<ScheduleOutcome, ApiError>> + Send;
}

/// `ConsoleApi` backed by reqwest
#[derive(Clone)]
pub struct HttpConsoleApi {
    client: reqwest::Client,
    execute_url: String,
    schedule_url: String,
}

impl HttpConsoleApi {
    pub fn new(config: &ConsoleConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            execute_url: config.execute_url(),
            schedule_url: config.schedule_url(),
        })
    }
}

impl ConsoleApi for HttpConsoleApi {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, ApiError> {
        let resp = self
            .client
            .post(&self.execute_url)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(
            component = "api",
            event = "api.execute.response",
            game_id = %request.game_id,
            status = status.as_u16(),
            bytes = body.len(),
        );

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(ExecuteResponse::default());
            }
            return serde_json::from_str(&body).map_err(|e| ApiError::Transport(e.to_string()));
        }

        // A failed status that still carries an application error is the
        // server complaining, not an unreachable server.
        match serde_json::from_str::<ExecuteResponse>(&body) {
            Ok(parsed) if parsed.error.is_some() => Ok(parsed),
            _ => Err(ApiError::Status {
                status: status.as_u16(),
            }),
        }
    }

    async fn schedule_restart(&self, request: ScheduleRequest) -> Result<ScheduleOutcome, ApiError> {
        let resp = self
            .client
            .post(&self.schedule_url)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let reply = serde_json::from_str::<ScheduleReply>(&body).unwrap_or_default();

        debug!(
            component = "api",
            event = "api.schedule.response",
            game_id = %request.game_id,
            status = status.as_u16(),
        );

        if status.is_success() {
            Ok(ScheduleOutcome::Accepted(reply))
        } else {
            Ok(ScheduleOutcome::Rejected {
                status: status.as_u16(),
                reply,
            })
        }
    }
}

/// Short reason phrase for a status code, for operator-facing messages
pub fn status_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(|reason| format!("HTTP {status} {reason}"))
        .unwrap_or_else(|| format!("HTTP {status}"))
}
