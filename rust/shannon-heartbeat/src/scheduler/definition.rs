//! Heartbeat definitions as handed to the scheduler.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::cron::ScheduleExpression;

/// Default per-run timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// When a heartbeat fires. Resolved once when definitions are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// One absolute instant.
    RunAt(DateTime<Utc>),
    /// Recurring cron expression, evaluated in local time.
    Cron(ScheduleExpression),
    /// Fixed delay after each completed run.
    Interval(Duration),
}

impl Schedule {
    /// The next instant this schedule is due, relative to `now`.
    ///
    /// A `RunAt` that is already past fires immediately.
    pub fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::RunAt(at) if *at > now => Some(*at),
            Self::RunAt(_) => Some(now),
            Self::Cron(expr) => expr
                .next_occurrence(&now.with_timezone(&Local))
                .map(|next| next.with_timezone(&Utc)),
            Self::Interval(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|every| now.checked_add_signed(every)),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunAt(at) => write!(f, "at {}", at.to_rfc3339()),
            Self::Cron(expr) => write!(f, "cron {expr}"),
            Self::Interval(every) => write!(f, "every {}s", every.as_secs()),
        }
    }
}

/// How an agent session handles tool permission prompts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionMode {
    /// Tools run without approval.
    #[default]
    Auto,
    /// Approval prompts are routed back through the chat channel.
    Interactive,
    /// Any other mode name; treated like `Interactive`.
    Other(String),
}

impl PermissionMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl From<String> for PermissionMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Self::Auto,
            "interactive" => Self::Interactive,
            _ => Self::Other(value),
        }
    }
}

impl From<PermissionMode> for String {
    fn from(mode: PermissionMode) -> Self {
        match mode {
            PermissionMode::Auto => "auto".to_string(),
            PermissionMode::Interactive => "interactive".to_string(),
            PermissionMode::Other(name) => name,
        }
    }
}

/// One scheduled heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatDefinition {
    /// Unique key.
    pub name: String,
    pub description: String,
    pub schedule: Schedule,
    /// Chat channel the heartbeat posts into.
    pub channel_id: String,
    pub working_dir: PathBuf,
    pub prompt: String,
    pub permission_mode: PermissionMode,
    /// Reuse one agent session identity across runs.
    pub persistent: bool,
    pub timeout: Duration,
    pub enabled: bool,
    /// Disable permanently after the first completed run.
    pub once: bool,
}

impl HeartbeatDefinition {
    /// Build an enabled, recurring, non-persistent definition with defaults.
    pub fn new(
        name: impl Into<String>,
        schedule: Schedule,
        channel_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            schedule,
            channel_id: channel_id.into(),
            working_dir: PathBuf::from("."),
            prompt: prompt.into(),
            permission_mode: PermissionMode::Auto,
            persistent: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            enabled: true,
            once: false,
        }
    }
}
