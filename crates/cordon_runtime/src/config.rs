//! Runtime configuration.

use cordon_core::{CollisionPolicy, ContextError, ContextResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs shared by composition and dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How merges treat distinct variants sharing a tag
    pub collision_policy: CollisionPolicy,
    /// Cancel the session scope after a handler succeeds
    pub cancel_on_handled: bool,
    /// Emit a warning when a fault escapes a dispatch
    pub log_unhandled: bool,
}

impl RuntimeConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            collision_policy: CollisionPolicy::Reject,
            cancel_on_handled: true,
            log_unhandled: true,
        }
    }

    /// Set the collision policy
    #[must_use]
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Set whether handled faults cancel the scope
    #[must_use]
    pub fn with_cancel_on_handled(mut self, cancel: bool) -> Self {
        self.cancel_on_handled = cancel;
        self
    }

    /// Set whether unhandled faults are logged
    #[must_use]
    pub fn with_log_unhandled(mut self, log: bool) -> Self {
        self.log_unhandled = log;
        self
    }

    /// Parse a JSON document
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] if the document is malformed
    pub fn from_json_str(json: &str) -> ContextResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] if the file cannot be read or parsed
    pub fn from_json_file(path: impl AsRef<Path>) -> ContextResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ContextError::Config {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json_str(&raw)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}
