//! Per-heartbeat runtime state and status snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::definition::HeartbeatDefinition;

/// Handle to one in-flight heartbeat execution.
#[derive(Debug)]
pub struct RunHandle {
    pub(crate) task: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
}

impl RunHandle {
    /// Force-cancel the execution: signal the token so the session is killed,
    /// then abort the task.
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Mutable runtime state of one heartbeat.
///
/// Two states: Idle (`running == false`) and Running. `run_thread` is present
/// iff the heartbeat is Running.
#[derive(Debug)]
pub struct HeartbeatState {
    pub definition: HeartbeatDefinition,
    pub running: bool,
    pub run_count: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub(crate) run_thread: Option<RunHandle>,
    /// Agent session identity reused by persistent heartbeats.
    pub session_id: Option<String>,
}

impl HeartbeatState {
    /// Create an Idle state with its first run computed from `now`.
    pub fn new(definition: HeartbeatDefinition, now: DateTime<Utc>) -> Self {
        let next_run_at = definition.schedule.next_run(now);
        Self {
            definition,
            running: false,
            run_count: 0,
            next_run_at,
            last_run_at: None,
            last_completed_at: None,
            last_error: None,
            run_thread: None,
            session_id: None,
        }
    }

    /// Whether an execution handle is attached.
    pub fn has_run_thread(&self) -> bool {
        self.run_thread.is_some()
    }

    pub fn status(&self) -> HeartbeatStatus {
        HeartbeatStatus {
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            next_run_at: self.next_run_at,
            last_run_at: self.last_run_at,
            run_count: self.run_count,
            running: self.running,
            last_error: self.last_error.clone(),
        }
    }
}

/// Point-in-time view of a heartbeat for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatStatus {
    pub name: String,
    pub description: String,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub running: bool,
    pub last_error: Option<String>,
}

impl fmt::Display for HeartbeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = |t: Option<DateTime<Utc>>| {
            t.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        };
        write!(
            f,
            "{} [{}] runs={} next={} last={}",
            self.name,
            if self.running { "running" } else { "idle" },
            self.run_count,
            stamp(self.next_run_at),
            stamp(self.last_run_at),
        )?;
        if let Some(error) = &self.last_error {
            write!(f, " error={error}")?;
        }
        Ok(())
    }
}
