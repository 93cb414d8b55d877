//! Startup validation of the loaded configuration.

use super::error::{ConfigResult, ConfigurationError};
use super::AppConfig;

/// Rejects configurations the service cannot run with.
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire configuration, reporting every problem at once.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if config.platform.base_url.trim().is_empty() {
            errors.push(ConfigurationError::missing_required(
                "platform.base_url",
                "Posting heartbeat output to the chat platform",
                "SHANNON_HEARTBEAT__PLATFORM__BASE_URL",
            ));
        }
        if config.platform.bot_token.trim().is_empty() {
            errors.push(ConfigurationError::missing_required(
                "platform.bot_token",
                "Authenticating against the chat platform",
                "SHANNON_HEARTBEAT__PLATFORM__BOT_TOKEN",
            ));
        }
        if config.scheduler.tick_interval_ms == 0 {
            errors.push(ConfigurationError::invalid(
                "scheduler.tick_interval_ms must be greater than zero",
                "Set SHANNON_HEARTBEAT__SCHEDULER__TICK_INTERVAL_MS to e.g. 10000",
            ));
        }
        if config.scheduler.completion_poll_ms == 0 {
            errors.push(ConfigurationError::invalid(
                "scheduler.completion_poll_ms must be greater than zero",
                "Set SHANNON_HEARTBEAT__SCHEDULER__COMPLETION_POLL_MS to e.g. 500",
            ));
        }
        if config.agent.command.trim().is_empty() {
            errors.push(ConfigurationError::invalid(
                "agent.command is empty",
                "Set SHANNON_HEARTBEAT__AGENT__COMMAND to the agent CLI, e.g. claude",
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigurationError::multiple(errors)),
        }
    }
}
