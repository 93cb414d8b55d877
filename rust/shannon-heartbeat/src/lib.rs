//! Shannon Heartbeat - scheduled agent runs for chat channels
//!
//! Background infrastructure for a chat-platform agent bridge:
//!
//! - **Heartbeats**: agent sessions started on a cron, interval or one-shot
//!   schedule, each announced in a channel and answered in that thread
//! - **Thread message queue**: at most one in-flight agent turn per
//!   conversation thread, later messages buffered in arrival order
//! - **Session store**: durable thread -> agent session identity, written
//!   atomically so restarts can resume conversations
//!
//! # Architecture
//!
//! - [`scheduler`]: cron grammar, definitions, hot reload and the dispatch loop
//! - [`queue`]: per-thread claim and buffer
//! - [`store`]: JSON-file session persistence
//! - [`session`]: agent session seam and the CLI subprocess implementation
//! - [`chat`]: chat platform seam and the Mattermost client
//! - [`config`]: layered configuration and validation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shannon_heartbeat::{config::AppConfig, HeartbeatFile, HeartbeatScheduler,
//!     MattermostClient, ProcessSessionFactory};
//!
//! let config = AppConfig::load(None)?;
//! let scheduler = HeartbeatScheduler::new(
//!     Arc::new(HeartbeatFile::new(&config.scheduler.definitions_path)),
//!     Arc::new(MattermostClient::new(&config.platform.base_url, &config.platform.bot_token)?),
//!     Arc::new(ProcessSessionFactory::new(
//!         &config.agent.command,
//!         config.agent.extra_args.clone(),
//!     )),
//!     config.scheduler_settings(),
//! );
//! scheduler.start();
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod persist;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod store;

pub use chat::{ChatClient, MattermostClient, Post};
pub use error::{HeartbeatError, HeartbeatResult};
pub use queue::ThreadMessageQueue;
pub use scheduler::{
    DefinitionSource, HeartbeatDefinition, HeartbeatFile, HeartbeatScheduler, HeartbeatState,
    HeartbeatStatus, MalformedScheduleError, PermissionMode, Schedule, ScheduleExpression,
    SchedulerSettings,
};
pub use session::{
    AgentSession, PermissionConfig, ProcessSessionFactory, SessionEvent, SessionFactory,
    SessionOutcome, SessionSpec,
};
pub use store::{PersistedSession, SessionStore};
