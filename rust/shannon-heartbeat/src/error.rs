use thiserror::Error;

use crate::scheduler::cron::MalformedScheduleError;

/// Core error type for heartbeat execution and persistence
#[derive(Error, Debug)]
pub enum HeartbeatError {
    /// The chat platform rejected or dropped a post
    #[error("Chat post to channel '{channel_id}' failed")]
    PostFailed { channel_id: String },

    /// Agent session construction or I/O errors
    #[error("Agent session error: {0}")]
    Session(String),

    #[error(transparent)]
    Schedule(#[from] MalformedScheduleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A heartbeat execution panicked before it could report
    #[error("Heartbeat execution panicked: {0}")]
    Panicked(String),
}

/// Result type alias for heartbeat operations
pub type HeartbeatResult<T> = Result<T, HeartbeatError>;

impl From<serde_json::Error> for HeartbeatError {
    fn from(err: serde_json::Error) -> Self {
        HeartbeatError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeartbeatError {
    fn from(err: serde_yaml::Error) -> Self {
        HeartbeatError::Serialization(err.to_string())
    }
}

impl From<tempfile::PersistError> for HeartbeatError {
    fn from(err: tempfile::PersistError) -> Self {
        HeartbeatError::Io(err.error)
    }
}

impl HeartbeatError {
    /// Create a session error with context
    pub fn session(reason: impl Into<String>) -> Self {
        HeartbeatError::Session(reason.into())
    }
}
