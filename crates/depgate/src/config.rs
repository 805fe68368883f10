#![forbid(unsafe_code)]

//! Loading [`RetryPolicy`] from TOML or JSON.
//!
//! Missing keys take their [`Default`] values; unknown keys are rejected.
//! Every loaded policy is validated before it is returned.
//!
//! ```toml
//! initial_delay_ms = 250
//! multiplier = 1.5
//! max_delay_ms = 10000
//! max_attempts = 8
//! ```

use std::path::Path;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

impl RetryPolicy {
    /// Parse and validate a TOML policy.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let policy: Self = toml::from_str(source)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Parse and validate a JSON policy.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(source)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load a policy file. `.json` files are parsed as JSON, anything else
    /// as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let policy = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        tracing::debug!(
            message = "config.policy_loaded",
            path = %path.display(),
            max_attempts = policy.max_attempts
        );
        Ok(policy)
    }
}
