// argus_core/src/error.rs

use crate::types::ProviderId;
use thiserror::Error;

/// Errors surfaced by the perception engine.
///
/// Backend failures never show up here: a failed cast is converted into a
/// per-ray miss by the cast adapter and only counted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerceptionError {
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("{0} used before Initialize")]
    NotInitialized(ProviderId),

    #[error("{0} used after it was destroyed")]
    Destroyed(ProviderId),

    #[error("no detection class named '{0}'")]
    UnknownClass(String),

    #[error("detection class '{0}' already exists")]
    DuplicateClass(String),
}

impl PerceptionError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
