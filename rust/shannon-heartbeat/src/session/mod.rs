//! Agent session abstraction.
//!
//! A session is one conversation with the agent process. Its progress is
//! reported as [`SessionEvent`]s on the channel handed to the
//! [`SessionFactory`]. The scheduler relays those events to chat, waits for
//! `Complete`, and kills the session on timeout or shutdown.

pub mod process;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::HeartbeatResult;

pub use process::{ProcessSession, ProcessSessionFactory};

/// Routes agent permission prompts back through the chat platform.
#[derive(Clone, PartialEq, Eq)]
pub struct PermissionConfig {
    pub base_url: String,
    pub bot_token: String,
}

impl fmt::Debug for PermissionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionConfig")
            .field("base_url", &self.base_url)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

/// What the factory needs to build a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub working_dir: PathBuf,
    /// Resume this agent session identity instead of starting fresh.
    pub resume_session_id: Option<String>,
    /// `None` lets tools run unchecked.
    pub permission: Option<PermissionConfig>,
}

/// Final outcome reported by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    pub result: Option<String>,
    pub session_id: Option<String>,
    pub is_error: bool,
}

/// Progress reported by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A chunk of assistant text.
    Text(String),
    /// The agent invoked a tool.
    ToolUse { name: String, input: serde_json::Value },
    /// The session finished.
    Complete(SessionOutcome),
}

/// One live agent session.
#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn start(&mut self) -> HeartbeatResult<()>;

    async fn send_message(&mut self, text: &str) -> HeartbeatResult<()>;

    /// Whether the session has signalled completion.
    fn is_complete(&self) -> bool;

    /// Forcibly terminate the session.
    async fn kill(&mut self);

    /// Agent-side session identity, once known.
    fn session_id(&self) -> Option<String>;

    fn process_pid(&self) -> Option<u32>;
}

/// Builds sessions for heartbeat runs.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        spec: SessionSpec,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> HeartbeatResult<Box<dyn AgentSession>>;
}
