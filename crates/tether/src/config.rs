//! CLI configuration

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tether_lifecycle::LifecycleConfig;
use tether_types::{ConnectorProvider, Tags};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// How long `register` waits for the registration to become active
    pub create_timeout_secs: Option<u64>,

    /// Shortest interval between status polls
    pub poll_min_interval_secs: Option<u64>,

    /// Longest interval between status polls
    pub poll_max_interval_secs: Option<u64>,

    /// Directory holding tracked state and the simulated backend
    pub state_dir: Option<PathBuf>,

    /// Provider used when `--provider` is not given
    pub default_provider: Option<String>,

    /// Tags merged under every registration's own tags
    #[serde(default)]
    pub default_tags: Tags,
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: CliConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(CliConfig::default())
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> CliResult<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("tether").join("config.toml"))
    }

    /// State directory, falling back to the platform data directory
    pub fn state_dir(&self) -> CliResult<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }

        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| CliError::Config("Cannot find data directory".into()))?;
        Ok(data_dir.join("tether"))
    }

    /// Parsed default provider, if configured
    pub fn default_provider(&self) -> CliResult<Option<ConnectorProvider>> {
        self.default_provider
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .map_err(|e| CliError::Config(format!("default_provider: {}", e)))
            })
            .transpose()
    }

    /// Lifecycle configuration with file overrides applied
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        let mut config = LifecycleConfig::default();

        if let Some(secs) = self.create_timeout_secs {
            config.create_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.poll_min_interval_secs {
            config.poll.min_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.poll_max_interval_secs {
            config.poll.max_interval = Duration::from_secs(secs);
        }

        config
    }
}
