pub mod fetch;
pub mod run;
pub mod validate;

// Re-export command functions for convenience
pub use fetch::{snapshot, teams};
pub use run::run;
pub use validate::validate;

use anyhow::{Context, Result};
use std::path::Path;

use stern_insider::config::Config;

/// Load the config from `path`, or from `STERN_*` variables without one
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
