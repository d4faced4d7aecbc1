//! Mixer Daemon library
//!
//! Process-level pieces of `mixerd`:
//! - layered configuration (defaults, TOML file, `MIXER_` environment)
//! - the replay driver feeding a recorded roster and event script
//!   through a connection

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod replay;

pub use config::{DaemonConfig, ReplayConfig};
pub use error::{DaemonError, DaemonResult};
pub use replay::{load_roster, load_script, Replay, ScriptEntry};
