//! Config resolution for commands that talk to readers.

use std::path::PathBuf;

use tagflow_config::Config;
use tagflow_core::TagService;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file in effect: `--config` / `TAGFLOW_CONFIG`, else the platform default.
pub fn path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(tagflow_config::config_path)
}

/// Load the config file plus environment overrides. A missing file yields defaults.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(tagflow_config::load_config_from(&path(global))?)
}

/// Load, validate and assemble the service. Requires at least one reader.
pub fn build_service(global: &GlobalOpts) -> Result<TagService, CliError> {
    let cfg = load(global)?;
    if cfg.readers.is_empty() {
        return Err(CliError::NoConfig {
            path: path(global).display().to_string(),
        });
    }
    let service_config = tagflow_config::to_service_config(&cfg)?;
    Ok(TagService::from_config(service_config)?)
}
