//! Logging setup

use tracing_subscriber::EnvFilter;

use crate::MascError;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Fails if a subscriber
/// is already installed or the filter does not parse.
pub fn init_logging(default_filter: &str) -> Result<(), MascError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|err| MascError::Logging(format!("{default_filter:?}: {err}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| MascError::Logging(err.to_string()))
}
