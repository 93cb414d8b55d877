//! Errors raised while validating the heartbeat service configuration.

/// A setting the service refuses to start with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {problem}\n\nHow to fix: {remedy}")]
    Invalid { problem: String, remedy: String },

    #[error(
        "Missing required configuration: {setting}\n\n\
         Required for: {needed_for}\n\
         Set via: {env_var}"
    )]
    MissingRequired {
        /// Dotted key, e.g. `platform.bot_token`.
        setting: String,
        needed_for: String,
        env_var: String,
    },

    /// Every problem found in one validation pass.
    #[error("{}", numbered(.0))]
    Multiple(Vec<ConfigurationError>),
}

fn numbered(errors: &[ConfigurationError]) -> String {
    let mut out = String::from("Multiple configuration errors:\n");
    for (i, err) in errors.iter().enumerate() {
        out.push_str(&format!("\n{}. {err}\n", i + 1));
    }
    out
}

impl ConfigurationError {
    #[must_use]
    pub fn invalid(problem: impl Into<String>, remedy: impl Into<String>) -> Self {
        Self::Invalid {
            problem: problem.into(),
            remedy: remedy.into(),
        }
    }

    #[must_use]
    pub fn missing_required(
        setting: impl Into<String>,
        needed_for: impl Into<String>,
        env_var: impl Into<String>,
    ) -> Self {
        Self::MissingRequired {
            setting: setting.into(),
            needed_for: needed_for.into(),
            env_var: env_var.into(),
        }
    }

    #[must_use]
    pub fn multiple(errors: Vec<ConfigurationError>) -> Self {
        Self::Multiple(errors)
    }

    /// How many settings were rejected.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Multiple(errors) => errors.len(),
            _ => 1,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
