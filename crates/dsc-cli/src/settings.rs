//! Configuration loading for the DSC CLI

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use dsc_core::PointMassConfig;
use dsc_rl::{ChainingConfig, ClassifierConfig, DdpgConfig, DqnConfig};

/// Complete configuration of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub chaining: ChainingConfig,
    pub classifier: ClassifierConfig,
    pub ddpg: DdpgConfig,
    pub dqn: DqnConfig,
    pub environment: PointMassConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub episodes: u64,
    /// Directory that receives `run_<seed>/` artifacts
    pub log_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            log_dir: PathBuf::from("runs"),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// An explicit path must exist; otherwise the standard locations are
    /// searched and defaults are used when none is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) if !path.exists() => {
                bail!("Config file not found: {}", path.display());
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

        if let Some(path) = &config_path {
            tracing::info!("Loading config from: {:?}", path);
            builder = builder.add_source(File::from(path.clone()).required(true));
        } else {
            tracing::debug!("No config file found, using defaults");
        }

        // DSC__CHAINING__MAX_STEPS=200 and friends
        builder = builder.add_source(
            Environment::with_prefix("DSC")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chaining.validate().context("Invalid [chaining] section")?;
        self.classifier
            .validate()
            .context("Invalid [classifier] section")?;
        Ok(())
    }

    /// Find the configuration file
    pub fn find_config_file() -> Option<PathBuf> {
        // Check in order: DSC_CONFIG env, ./dsc.toml, ~/.config/dsc/dsc.toml
        if let Ok(path) = std::env::var("DSC_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from("dsc.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("dsc").join("dsc.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
