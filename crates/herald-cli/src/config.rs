//! Herald CLI configuration management
//!
//! Layered loading with figment, priority ordered: CLI args > environment
//! variables (HERALD_*) > configuration file (herald.toml) > defaults.
//! The runtime sections come straight from [`HeraldConfig`]; this module
//! only adds the pieces that belong to the binary, paths and bot behavior.
//!
//! Environment variables nest with double underscores so snake_case
//! leaves survive (`HERALD_PATHS__BASE_DIR`, `HERALD_BOT__ANTICALL`).
//! Two shorthand variables are mapped explicitly: `HERALD_DATA_DIR`
//! (instance base directory) and `HERALD_CACHE_FLUSH` (cache flush
//! interval in seconds).

use crate::cli::Cli;
use crate::error::{CliError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use herald_core::config::HeraldConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Filesystem layout for instance state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Every instance gets `<base_dir>/<instance_id>/{session,data}`.
    pub base_dir: PathBuf,
    /// Optional template directory whose files seed a new instance's data
    /// directory.
    pub template_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("instances"),
            template_dir: None,
        }
    }
}

/// Bot behavior toggles read by the default collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Reject incoming calls and block repeat callers.
    pub anticall: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self { anticall: true }
    }
}

/// Complete configuration for the `herald` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Runtime configuration: supervisor, cache, memory watchdog, control.
    pub herald: HeraldConfig,
    /// Instance state layout.
    pub paths: PathsConfig,
    /// Bot behavior.
    pub bot: BotConfig,
}

// ----------------------------------------------------------------------------
// Configuration Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with CLI overrides applied on top of the layered
    /// sources.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        figment = match &cli.config {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file("herald.toml")),
        };
        figment = figment.merge(Env::prefixed("HERALD_").split("__"));

        if let Ok(data_dir) = std::env::var("HERALD_DATA_DIR") {
            figment = figment.merge(("paths.base_dir", data_dir));
        }
        if let Ok(flush) = std::env::var("HERALD_CACHE_FLUSH") {
            let secs: u64 = flush.parse().map_err(|_| {
                CliError::Config(format!(
                    "HERALD_CACHE_FLUSH must be an interval in seconds, got {:?}",
                    flush
                ))
            })?;
            figment = figment.merge(("herald.cache.flush_interval_secs", secs));
        }

        if let Some(base_dir) = &cli.base_dir {
            figment = figment.merge(("paths.base_dir", base_dir.clone()));
        }

        let config: AppConfig = figment.extract()?;
        config.herald.validate().map_err(CliError::Config)?;
        Ok(config)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
