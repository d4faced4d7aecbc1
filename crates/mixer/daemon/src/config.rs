//! Configuration for mixer-daemon

use crate::error::{DaemonError, DaemonResult};
use mixer_runtime::{AccountConfig, MixerConfig, RuntimeConfig};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Account parameters
    #[serde(default)]
    pub account: AccountConfig,

    /// Runtime queue sizes and initial lists
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Replay output
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Request a group channel for every group on the initial roster
    #[serde(default = "default_true")]
    pub open_groups: bool,

    /// Pretty-print the channel snapshots
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            open_groups: true,
            pretty: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl DaemonConfig {
    /// Load configuration from file, then `MIXER_` environment overrides
    /// (`MIXER_RUNTIME__EVENT_QUEUE_CAPACITY=64`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MIXER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// The per-connection part handed to the runtime.
    pub fn mixer_config(&self) -> DaemonResult<MixerConfig> {
        if self.account.account.is_empty() {
            return Err(DaemonError::Config("account name is required".into()));
        }
        let config = MixerConfig {
            account: self.account.clone(),
            runtime: self.runtime.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> DaemonResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
