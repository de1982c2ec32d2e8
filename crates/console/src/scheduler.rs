//! Restart scheduling - write-only registration against the scheduling service

use std::collections::HashMap;

use tracing::{info, warn};

use serverdeck_protocol::{new_id, ScheduleRequest, Weekday};

use crate::api::{status_reason, ScheduleOutcome};
use crate::error::{ApiError, ConsoleError};
use crate::message::ConsoleMessage;

/// A validated recurring restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    server_id: String,
    hour: u8,
    minute: u8,
    days: Vec<Weekday>,
}

impl ScheduledJob {
    /// Validate shape before anything reaches the service. Days are
    /// deduplicated and put in week order.
    pub fn new(
        server_id: &str,
        hour: u8,
        minute: u8,
        days: &[Weekday],
    ) -> Result<Self, ConsoleError> {
        if server_id.trim().is_empty() {
            return Err(ConsoleError::NoActiveServer);
        }
        if hour > 23 {
            return Err(ConsoleError::InvalidSchedule(format!(
                "hour must be 0-23, got {hour}"
            )));
        }
        if minute > 59 {
            return Err(ConsoleError::InvalidSchedule(format!(
                "minute must be 0-59, got {minute}"
            )));
        }
        let mut days = days.to_vec();
        days.sort();
        days.dedup();
        if days.is_empty() {
            return Err(ConsoleError::InvalidSchedule(
                "pick at least one day".to_string(),
            ));
        }
        Ok(Self {
            server_id: server_id.to_string(),
            hour,
            minute,
            days,
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    pub fn request(&self) -> ScheduleRequest {
        ScheduleRequest {
            game_id: self.server_id.clone(),
            hour: self.hour,
            minute: self.minute,
            days: self.days.clone(),
        }
    }

    /// e.g. `03:00 on mon, wed`
    pub fn describe(&self) -> String {
        let days: Vec<&str> = self.days.iter().map(Weekday::as_str).collect();
        format!("{:02}:{:02} on {}", self.hour, self.minute, days.join(", "))
    }
}

/// Parse `HH:MM`
pub fn parse_time(value: &str) -> Result<(u8, u8), ConsoleError> {
    let invalid = || ConsoleError::InvalidSchedule(format!("expected HH:MM, got {value:?}"));
    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hour = hour.trim().parse::<u8>().map_err(|_| invalid())?;
    let minute = minute.trim().parse::<u8>().map_err(|_| invalid())?;
    Ok((hour, minute))
}

/// Parse a comma separated day list such as `mon,wed`
pub fn parse_days(value: &str) -> Result<Vec<Weekday>, ConsoleError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|e| ConsoleError::InvalidSchedule(e.to_string()))
        })
        .collect()
}

/// Tracks registrations awaiting a reply
#[derive(Default)]
pub struct SchedulerClient {
    pending: HashMap<String, ScheduledJob>,
}

impl SchedulerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `job` as in flight and return its correlation id and body
    pub fn register(&mut self, job: ScheduledJob) -> (String, ScheduleRequest) {
        let id = new_id();
        let request = job.request();
        info!(
            component = "scheduler",
            event = "scheduler.register",
            server_id = %job.server_id,
            schedule = %job.describe(),
        );
        self.pending.insert(id.clone(), job);
        (id, request)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget everything in flight (identity change)
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Turn a finished registration into a console line
    pub fn complete(
        &mut self,
        id: &str,
        result: Result<ScheduleOutcome, ApiError>,
    ) -> Option<ConsoleMessage> {
        let job = self.pending.remove(id)?;

        let message = match result {
            Ok(ScheduleOutcome::Accepted(reply)) => {
                let text = reply
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Scheduled restart at {}", job.describe()));
                ConsoleMessage::system(text)
            }
            Ok(ScheduleOutcome::Rejected { status, reply }) => {
                warn!(
                    component = "scheduler",
                    event = "scheduler.rejected",
                    server_id = %job.server_id,
                    status,
                );
                let text = match reply.rejection_detail() {
                    Some(detail) => format!("Failed to schedule restart: {detail}"),
                    None => format!("Failed to schedule restart ({})", status_reason(status)),
                };
                ConsoleMessage::error(text)
            }
            Err(e) => {
                warn!(
                    component = "scheduler",
                    event = "scheduler.request_failed",
                    server_id = %job.server_id,
                    error = %e,
                );
                ConsoleMessage::error("Failed to schedule restart: scheduling service unreachable")
            }
        };
        Some(message)
    }
}
