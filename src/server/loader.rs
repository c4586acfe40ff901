//! Layered configuration
//!
//! Later layers win: compiled-in defaults, `config/default`, `config/{ANVIL_ENV}`,
//! `config/local`, then `ANVIL_*` variables with `__` between sections
//! (`ANVIL_ORCHESTRATOR__MAX_RETRIES=5`).

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Compiled-in defaults
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

const ENV_PREFIX: &str = "ANVIL";

/// Load from `./config` and the environment
pub fn load_config() -> Result<AppConfig> {
    let profile = std::env::var("ANVIL_ENV").unwrap_or_else(|_| "development".to_string());
    load_config_from(Path::new("config"), &profile)
}

/// Load with override files looked up in `dir`
pub fn load_config_from(dir: &Path, profile: &str) -> Result<AppConfig> {
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

    for layer in ["default", profile, "local"] {
        builder = builder.add_source(File::from(dir.join(layer)).required(false));
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to assemble configuration layers")?
        .try_deserialize()
        .context("Configuration does not match the expected shape")
}
