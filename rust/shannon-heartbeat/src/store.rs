//! Durable thread -> agent session mapping.
//!
//! The whole mapping lives in one JSON object and is rewritten atomically on
//! every mutation, so a crash mid-write leaves the previous file intact. All
//! operations degrade instead of failing: a missing or corrupt file loads as
//! empty, and write failures are logged and dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::HeartbeatResult;
use crate::persist::write_atomic;

/// Session identity and bookkeeping for one conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Agent-side session identifier used to resume the conversation.
    pub claude_session_id: String,
    pub channel_id: String,
    pub working_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_paused: bool,
    pub message_count: u64,
}

impl PersistedSession {
    /// A fresh, unpaused record started now.
    pub fn new(
        claude_session_id: impl Into<String>,
        channel_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            claude_session_id: claude_session_id.into(),
            channel_id: channel_id.into(),
            working_dir: working_dir.into(),
            started_at: now,
            last_activity_at: now,
            is_paused: false,
            message_count: 0,
        }
    }
}

/// Thread id -> session record.
pub type SessionMap = BTreeMap<String, PersistedSession>;

/// JSON-file backed session store.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every persisted session. Never fails.
    pub fn load(&self) -> SessionMap {
        self.read().unwrap_or_else(|e| {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Session store unreadable, ignoring it"
            );
            SessionMap::new()
        })
    }

    /// Strict read: only a missing file counts as empty.
    fn read(&self) -> HeartbeatResult<SessionMap> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    pub fn get(&self, key: &str) -> Option<PersistedSession> {
        self.load().remove(key)
    }

    /// Insert or replace the record for `key`.
    pub fn save(&self, key: &str, record: PersistedSession) {
        self.update("save", key, |sessions| {
            sessions.insert(key.to_string(), record);
            true
        });
    }

    /// Forget `key`. No-op if absent.
    pub fn remove(&self, key: &str) {
        self.update("remove", key, |sessions| sessions.remove(key).is_some());
    }

    /// Bump `last_activity_at` for `key` to now. No-op if absent.
    pub fn touch(&self, key: &str) {
        self.update("touch", key, |sessions| match sessions.get_mut(key) {
            Some(session) => {
                session.last_activity_at = Utc::now();
                true
            }
            None => false,
        });
    }

    fn update(&self, operation: &str, key: &str, apply: impl FnOnce(&mut SessionMap) -> bool) {
        let _guard = self.write_lock.lock();
        // Never overwrite a file we could not read.
        let mut sessions = match self.read() {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    operation,
                    thread = key,
                    error = %e,
                    "Session store unreadable, keeping it untouched"
                );
                return;
            }
        };
        if !apply(&mut sessions) {
            return;
        }
        if let Err(e) = self.write(&sessions) {
            tracing::error!(
                path = %self.path.display(),
                operation,
                thread = key,
                error = %e,
                "Failed to persist session store"
            );
        }
    }

    fn write(&self, sessions: &SessionMap) -> HeartbeatResult<()> {
        let json = serde_json::to_string_pretty(sessions)?;
        write_atomic(&self.path, json.as_bytes())
    }
}
