//! Configuration for the heartbeat service.
//!
//! Layers, later wins:
//! 1. built-in defaults
//! 2. `config/shannon-heartbeat.{yaml,toml,json}`, or the file passed explicitly
//! 3. `SHANNON_HEARTBEAT__<SECTION>__<KEY>` environment variables
//!
//! ```rust,ignore
//! use shannon_heartbeat::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load(None)?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerSettings;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SHANNON_HEARTBEAT";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::load_unchecked(file)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load without validation.
    ///
    /// An explicitly passed file must exist; the default file is optional.
    pub fn load_unchecked(file: Option<&Path>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config/shannon-heartbeat").required(false),
        };

        let config = config::Config::builder()
            .set_default("scheduler.definitions_path", "config/heartbeats.yaml")?
            .set_default("scheduler.tick_interval_ms", default_tick_interval_ms())?
            .set_default("scheduler.completion_poll_ms", default_completion_poll_ms())?
            .set_default("agent.command", default_agent_command())?
            .set_default("logging.level", default_log_level())?
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("agent.extra_args")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize()?;

        if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
            app_config.logging.format = LogFormat::Json;
        }

        Ok(app_config)
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: Duration::from_millis(self.scheduler.tick_interval_ms),
            completion_poll_interval: Duration::from_millis(self.scheduler.completion_poll_ms),
            platform_base_url: self.platform.base_url.clone(),
            bot_token: self.platform.bot_token.clone(),
        }
    }
}

/// Chat platform connection.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// REST base URL, e.g. `https://chat.example.com`.
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub bot_token: String,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("base_url", &self.base_url)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Heartbeat definitions YAML file.
    #[serde(default = "default_definitions_path")]
    pub definitions_path: PathBuf,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_completion_poll_ms")]
    pub completion_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            definitions_path: default_definitions_path(),
            tick_interval_ms: default_tick_interval_ms(),
            completion_poll_ms: default_completion_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Thread -> session mapping file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

/// Agent CLI invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,
    /// Passed before the session flags.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_definitions_path() -> PathBuf {
    PathBuf::from("config/heartbeats.yaml")
}

fn default_tick_interval_ms() -> u64 {
    10_000
}

fn default_completion_poll_ms() -> u64 {
    500
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/sessions.json")
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
