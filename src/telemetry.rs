use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the configured filter when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TracingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|err| TracingError::Filter {
            filter: config.filter.clone(),
            reason: err.to_string(),
        })?,
    };

    if config.json {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false));
        set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true));
        set_global_default(subscriber)?;
    }

    Ok(())
}
