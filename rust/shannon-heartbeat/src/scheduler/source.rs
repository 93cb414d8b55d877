//! Heartbeat definitions file.
//!
//! The file is YAML with a single `heartbeats` mapping from name to entry:
//!
//! ```yaml
//! heartbeats:
//!   morning-digest:
//!     description: Morning digest
//!     cron: "0 9 * * 1-5"
//!     channel_id: 4xp9fdt7pbgium38k2ko3x4ehc
//!     working_dir: /srv/agents/digest
//!     prompt: Summarize yesterday's merged pull requests.
//!     permission_mode: auto
//!     timeout: 600
//!   release-reminder:
//!     run_at: "2026-11-02T15:00:00Z"
//!     once: true
//!     channel_id: 4xp9fdt7pbgium38k2ko3x4ehc
//!     prompt: Remind the team about the release freeze.
//! ```
//!
//! Loading never fails: an unreadable or malformed document yields no
//! definitions, and invalid entries are skipped with a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_yaml::Value;

use super::cron::ScheduleExpression;
use super::definition::{DEFAULT_TIMEOUT_SECS, HeartbeatDefinition, PermissionMode, Schedule};
use crate::error::HeartbeatResult;
use crate::persist::write_atomic;

/// Where the scheduler reads its definitions from.
pub trait DefinitionSource: Send + Sync {
    /// Enabled, valid definitions. Never fails; degrades to an empty list.
    fn definitions(&self) -> Vec<HeartbeatDefinition>;

    /// Backing file, watched for modification-time changes.
    fn path(&self) -> &Path;

    /// Patch one entry's `enabled` flag in the backing document.
    ///
    /// A missing file or unknown name is a no-op.
    fn set_enabled(&self, name: &str, enabled: bool) -> HeartbeatResult<()>;
}

#[derive(Debug, Deserialize)]
struct RawHeartbeat {
    description: Option<String>,
    cron: Option<String>,
    interval: Option<u64>,
    run_at: Option<String>,
    channel_id: Option<String>,
    working_dir: Option<PathBuf>,
    prompt: Option<String>,
    #[serde(default)]
    permission_mode: PermissionMode,
    #[serde(default)]
    persistent: bool,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    once: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// YAML-backed [`DefinitionSource`].
#[derive(Debug, Clone)]
pub struct HeartbeatFile {
    path: PathBuf,
}

impl HeartbeatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse a definitions document.
    pub fn parse_document(text: &str) -> Vec<HeartbeatDefinition> {
        let document: Value = match serde_yaml::from_str(text) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "Heartbeat definitions are not valid YAML");
                return Vec::new();
            }
        };

        let Some(entries) = document.get("heartbeats").and_then(Value::as_mapping) else {
            tracing::warn!("Heartbeat definitions have no `heartbeats` mapping");
            return Vec::new();
        };

        let mut definitions = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(name) = key.as_str() else {
                tracing::warn!(key = ?key, "Skipping heartbeat with non-string name");
                continue;
            };
            let raw: RawHeartbeat = match serde_yaml::from_value(value.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(heartbeat = name, error = %e, "Skipping malformed heartbeat");
                    continue;
                }
            };
            if !raw.enabled {
                tracing::debug!(heartbeat = name, "Skipping disabled heartbeat");
                continue;
            }
            match Self::into_definition(name, raw) {
                Ok(definition) => definitions.push(definition),
                Err(reason) => {
                    tracing::warn!(
                        heartbeat = name,
                        reason = %reason,
                        "Skipping invalid heartbeat"
                    );
                }
            }
        }
        definitions
    }

    fn into_definition(name: &str, raw: RawHeartbeat) -> Result<HeartbeatDefinition, String> {
        let channel_id = raw
            .channel_id
            .filter(|c| !c.trim().is_empty())
            .ok_or("missing channel_id")?;
        let prompt = raw
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or("missing prompt")?;

        let schedule = if let Some(run_at) = raw.run_at.as_deref() {
            let at = parse_run_at(run_at).ok_or_else(|| format!("invalid run_at {run_at:?}"))?;
            Schedule::RunAt(at)
        } else if let Some(cron) = raw.cron.as_deref() {
            Schedule::Cron(ScheduleExpression::parse(cron).map_err(|e| e.to_string())?)
        } else if let Some(seconds) = raw.interval.filter(|s| *s > 0) {
            Schedule::Interval(Duration::from_secs(seconds))
        } else {
            return Err("no run_at, cron or positive interval".to_string());
        };

        Ok(HeartbeatDefinition {
            name: name.to_string(),
            description: raw.description.unwrap_or_else(|| name.to_string()),
            schedule,
            channel_id,
            working_dir: raw.working_dir.unwrap_or_else(|| PathBuf::from(".")),
            prompt,
            permission_mode: raw.permission_mode,
            persistent: raw.persistent,
            timeout: Duration::from_secs(raw.timeout),
            enabled: raw.enabled,
            once: raw.once,
        })
    }
}

/// RFC 3339, or a local wall-clock `YYYY-MM-DD HH:MM[:SS]`.
fn parse_run_at(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|at| at.with_timezone(&Utc))
}

impl DefinitionSource for HeartbeatFile {
    fn definitions(&self) -> Vec<HeartbeatDefinition> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Self::parse_document(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No heartbeat definitions file");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read heartbeat definitions"
                );
                Vec::new()
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> HeartbeatResult<()> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut document: Value = serde_yaml::from_str(&text)?;
        let Some(entry) = document
            .get_mut("heartbeats")
            .and_then(|heartbeats| heartbeats.get_mut(name))
            .and_then(Value::as_mapping_mut)
        else {
            tracing::debug!(heartbeat = name, "No definitions entry to patch");
            return Ok(());
        };
        entry.insert(Value::from("enabled"), Value::Bool(enabled));

        write_atomic(&self.path, serde_yaml::to_string(&document)?.as_bytes())?;
        tracing::info!(heartbeat = name, enabled, "Patched heartbeat definition");
        Ok(())
    }
}
