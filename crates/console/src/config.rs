//! Console configuration
//!
//! Loaded from `{data_dir}/config.toml` when present; every field has a
//! default. Front ends layer flags and environment on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::OsTarget;
use crate::error::ConsoleError;
use crate::log::DEFAULT_LOG_CAPACITY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Base URL of the panel API (command execution)
    pub api_url: String,
    /// Base URL of the console stream (`ws://` or `wss://`)
    pub ws_url: String,
    /// Base URL of the scheduling service
    pub scheduler_url: String,
    pub os_target: OsTarget,
    pub log_capacity: usize,
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".to_string(),
            ws_url: "ws://127.0.0.1:3000".to_string(),
            scheduler_url: "http://127.0.0.1:5000".to_string(),
            os_target: OsTarget::host(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            request_timeout_secs: 30,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ConsoleConfig {
    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConsoleError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConsoleError::Config(format!("{}: {e}", path.display())))?;
        let config: ConsoleConfig = toml::from_str(&content)
            .map_err(|e| ConsoleError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConsoleError> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConsoleError::Config(format!(
                "ws_url must start with ws:// or wss://, got {:?}",
                self.ws_url
            )));
        }
        for (name, url) in [("api_url", &self.api_url), ("scheduler_url", &self.scheduler_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConsoleError::Config(format!(
                    "{name} must start with http:// or https://, got {url:?}"
                )));
            }
        }
        if self.log_capacity == 0 {
            return Err(ConsoleError::Config("log_capacity must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConsoleError::Config("request_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Stream endpoint for one server identity
    pub fn stream_url(&self, server_id: &str) -> String {
        format!(
            "{}/console/{}",
            self.ws_url.trim_end_matches('/'),
            urlencoding::encode(server_id)
        )
    }

    pub fn execute_url(&self) -> String {
        format!("{}/console/execute", self.api_url.trim_end_matches('/'))
    }

    pub fn schedule_url(&self) -> String {
        format!("{}/schedule", self.scheduler_url.trim_end_matches('/'))
    }
}

/// Automatic reconnect after a remote close. Off unless enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based), or None once exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Some(Duration::from_millis(delay))
    }
}
