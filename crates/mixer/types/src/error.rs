//! Mixer error types

use crate::handle::HandleKind;
use thiserror::Error;

/// Errors surfaced to callers of the Mixer runtime.
///
/// Roster-routing problems never show up here: those are logged and
/// dropped by the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixerError {
    #[error("invalid key for {kind} handle: {reason}")]
    InvalidKey { kind: HandleKind, reason: String },

    #[error("unknown list type: {0}")]
    UnknownListType(String),

    #[error("not available: {0}")]
    NotAvailable(String),

    #[error("channel already exists: {0}")]
    AlreadyExists(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("connection is not active")]
    Disconnected,

    #[error("service error: {0}")]
    Service(String),
}

impl MixerError {
    pub fn empty_key(kind: HandleKind) -> Self {
        MixerError::InvalidKey {
            kind,
            reason: "natural key is empty".into(),
        }
    }
}

/// Result type for Mixer operations
pub type MixerResult<T> = std::result::Result<T, MixerError>;
