//! Log subscriber for the pool service. Scheduler ticks and HTTP-triggered runs execute on
//! blocking worker threads, so thread names are kept on every line.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("APP_LOG_LEVEL '{directive}' is not a usable log filter")]
    InvalidDirective {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("a global log subscriber is already installed")]
    AlreadyInstalled(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Filter from `RUST_LOG` when it parses, otherwise from the configured directive.
fn pool_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::InvalidDirective {
        directive: config.log_level.clone(),
        source,
    })
}

/// Installs the global subscriber. Call once, before the scheduler or server starts.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = pool_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_ansi(config.ansi)
        .compact()
        .try_init()
        .map_err(TelemetryError::AlreadyInstalled)
}
