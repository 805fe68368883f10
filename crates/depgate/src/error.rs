#![forbid(unsafe_code)]

use depgate_core::SequenceError;
use thiserror::Error;

/// Errors from controlling a component through a [`ComponentController`].
///
/// [`ComponentController`]: crate::ComponentController
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("component {component} has been destroyed")]
    Gone { component: String },

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Errors from loading or validating a [`RetryPolicy`].
///
/// [`RetryPolicy`]: crate::RetryPolicy
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "policy-config")]
    #[error("invalid TOML policy: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "policy-config")]
    #[error("invalid JSON policy: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
