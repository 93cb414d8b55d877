//! Logging setup and operation timing.

use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Measures one operation and logs its duration when finished.
///
/// ```rust,ignore
/// let timer = OpTimer::new("scheduler", "reload");
/// // ... reload ...
/// timer.finish();
/// ```
#[derive(Debug)]
pub struct OpTimer {
    /// Component being timed (e.g. "scheduler", "heartbeat").
    component: String,
    /// Operation or heartbeat name.
    operation: String,
    start: Instant,
}

impl OpTimer {
    #[must_use]
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        let component = component.into();
        let operation = operation.into();

        tracing::debug!(component = %component, operation = %operation, "Operation started");

        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn finish(self) {
        tracing::info!(
            component = %self.component,
            operation = %self.operation,
            duration_ms = self.elapsed_ms(),
            "Operation completed"
        );
    }

    /// Log success or the error, with the duration.
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: Result<&T, &E>) {
        let duration_ms = self.elapsed_ms();
        match result {
            Ok(_) => tracing::info!(
                component = %self.component,
                operation = %self.operation,
                duration_ms,
                "Operation completed successfully"
            ),
            Err(e) => tracing::error!(
                component = %self.component,
                operation = %self.operation,
                duration_ms,
                error = %e,
                "Operation failed"
            ),
        }
    }
}
