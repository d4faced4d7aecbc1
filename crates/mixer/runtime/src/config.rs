//! Runtime configuration

use crate::classifier::ListVariant;
use mixer_types::{MixerError, MixerResult};
use serde::{Deserialize, Serialize};

/// Per-connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Account parameters
    #[serde(default)]
    pub account: AccountConfig,

    /// Queue sizes and start-up behaviour
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Account parameters. Only the account name matters to the runtime: it is
/// what the self handle displays as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub account: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            client_id: String::new(),
            server: default_server(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Capacity of the roster event queue feeding the router
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Per-channel observer buffer
    #[serde(default = "default_channel_event_capacity")]
    pub channel_event_capacity: usize,

    /// Connection-level observer buffer
    #[serde(default = "default_connection_event_capacity")]
    pub connection_event_capacity: usize,

    /// Lists announced as soon as the connection goes active
    #[serde(default = "default_initial_lists")]
    pub initial_lists: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            channel_event_capacity: default_channel_event_capacity(),
            connection_event_capacity: default_connection_event_capacity(),
            initial_lists: default_initial_lists(),
        }
    }
}

fn default_server() -> String {
    "stream.mxit.co.za".to_string()
}

fn default_port() -> u16 {
    9119
}

fn default_event_queue_capacity() -> usize {
    256
}

fn default_channel_event_capacity() -> usize {
    128
}

fn default_connection_event_capacity() -> usize {
    256
}

fn default_initial_lists() -> Vec<String> {
    vec!["subscribe".to_string(), "publish".to_string()]
}

impl MixerConfig {
    pub fn for_account(account: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.account.account = account.into();
        config
    }

    pub fn validate(&self) -> MixerResult<()> {
        let capacities = [
            ("event_queue_capacity", self.runtime.event_queue_capacity),
            ("channel_event_capacity", self.runtime.channel_event_capacity),
            ("connection_event_capacity", self.runtime.connection_event_capacity),
        ];
        for (name, capacity) in capacities {
            if capacity == 0 {
                return Err(MixerError::NotAvailable(format!("{} must be positive", name)));
            }
        }
        for list in &self.runtime.initial_lists {
            ListVariant::from_list_name(list)?;
        }
        Ok(())
    }
}
