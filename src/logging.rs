use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{OptabError, Result};
use crate::settings::Settings;

/// Installs a formatting subscriber filtered by `RUST_LOG`, or by the
/// settings when that is unset. Calling it again keeps the first subscriber.
pub fn init(settings: &Settings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log_filter)
            .map_err(|e| OptabError::Config(format!("Invalid log filter '{}': {}", settings.log_filter, e)))?,
    };
    // a subscriber is already installed when this fails
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    Ok(())
}
