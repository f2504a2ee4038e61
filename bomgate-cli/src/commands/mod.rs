//! Command handlers -- one module per subcommand

pub mod config;
pub mod ingest;

use std::path::Path;

use tracing::warn;

use bomgate_core::config::BomgateConfig;

use crate::error::CliError;

/// Load the effective configuration.
///
/// A missing file falls back to defaults plus environment overrides, so the
/// CLI works without a `bomgate.toml`. Any other load error is returned.
pub async fn load_config(path: &Path) -> Result<BomgateConfig, CliError> {
    if tokio::fs::try_exists(path).await? {
        return Ok(BomgateConfig::load(path).await?);
    }

    warn!(path = %path.display(), "configuration file not found, using defaults");
    let mut config = BomgateConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
