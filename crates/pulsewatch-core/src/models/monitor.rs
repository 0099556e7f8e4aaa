//! Monitor and trigger data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of results kept per monitor or trigger
pub const HISTORY_LIMIT: usize = 5;

/// Values longer than this are replaced once they stop being the newest entry
pub const VALUE_SIZE_LIMIT: usize = 30;

/// Placeholder for replaced values
pub const VALUE_REPLACEMENT: &str = "...";

/// A monitored HTTP resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Unique monitor name, also the scheduler job name
    pub name: String,
    /// Resource URL
    pub url: String,
    /// Body sent with the GET request
    #[serde(default)]
    pub body: String,
    /// Poll interval in seconds
    pub interval: u64,
}

impl MonitorSpec {
    /// Create a new monitor spec
    pub fn new(name: impl Into<String>, url: impl Into<String>, interval: u64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            body: String::new(),
            interval,
        }
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Check the spec before scheduling it
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("monitor name must not be empty"));
        }
        if self.name.contains('/') {
            return Err(Error::validation(format!("monitor name {} must not contain '/'", self.name)));
        }
        if self.interval == 0 {
            return Err(Error::validation(format!(
                "monitor {} interval must be at least one second",
                self.name
            )));
        }
        url::Url::parse(&self.url)
            .map_err(|e| Error::validation(format!("monitor {} url: {e}", self.name)))?;
        Ok(())
    }
}

/// Outcome of a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorStatus {
    /// 2xx response
    Success,
    /// Non-2xx response or transport failure
    Fail,
}

/// One entry of a monitor's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResult {
    /// Fetch outcome
    pub status: MonitorStatus,
    /// Response body, possibly replaced by a placeholder
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// When the fetch completed
    pub updated_at: DateTime<Utc>,
}

impl MonitorResult {
    /// Create a result stamped with the current time
    pub fn now(status: MonitorStatus, value: impl Into<String>) -> Self {
        Self {
            status,
            value: value.into(),
            updated_at: Utc::now(),
        }
    }
}

/// A condition linking a monitor to a registered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    /// Trigger name, unique per monitor
    pub name: String,
    /// Registry id of the notification to deliver
    pub notification: String,
    /// Dot-separated path into the fetched JSON
    pub field_path: String,
    /// Comparison operator
    pub op: String,
    /// Right-hand side of the comparison
    pub operand: String,
}

/// One entry of a trigger's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTriggerResult {
    /// Whether the condition matched
    pub triggered: bool,
    /// Explanation when not triggered or delivery failed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// When the condition was evaluated
    pub updated_at: DateTime<Utc>,
}
