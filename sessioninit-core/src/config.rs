//! Configuration types

use crate::{ConfigError, SessionInitResult};
use serde::{Deserialize, Serialize};

/// Name of the cluster setting that turns the authentication cache on or off.
pub const CACHE_ENABLED_SETTING_NAME: &str = "server.authentication_cache.enabled";

/// Default memory budget for cached authentication data (64 MiB).
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 64 * 1024 * 1024;

/// Upper bound accepted for the memory budget (1 TiB).
pub const MAX_MEMORY_BUDGET_BYTES: u64 = 1 << 40;

/// Configuration for the authentication cache.
///
/// The memory budget is the only sizing knob. There is no entry count limit,
/// TTL or LRU policy: entries leave the cache only when a catalog table
/// version moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthCacheConfig {
    /// Initial value of `server.authentication_cache.enabled`.
    pub enabled: bool,
    /// Hard ceiling on the estimated bytes held by cached entries.
    pub memory_budget_bytes: u64,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
        }
    }
}

impl AuthCacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the cache.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the memory budget in bytes.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    /// Validate the configuration.
    ///
    /// A zero budget is allowed; it simply means nothing is ever cached.
    pub fn validate(&self) -> SessionInitResult<()> {
        if self.memory_budget_bytes > MAX_MEMORY_BUDGET_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "memory_budget_bytes".to_string(),
                value: self.memory_budget_bytes.to_string(),
                reason: format!("must be at most {}", MAX_MEMORY_BUDGET_BYTES),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionInitError;

    #[test]
    fn test_default_config_is_enabled() {
        let config = AuthCacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.memory_budget_bytes, DEFAULT_MEMORY_BUDGET_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = AuthCacheConfig::new()
            .with_enabled(false)
            .with_memory_budget(0);
        assert!(!config.enabled);
        assert_eq!(config.memory_budget_bytes, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_budget_rejected() {
        let config = AuthCacheConfig::new().with_memory_budget(MAX_MEMORY_BUDGET_BYTES + 1);
        assert!(matches!(
            config.validate(),
            Err(SessionInitError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let config: AuthCacheConfig =
            serde_json::from_str(r#"{"memory_budget_bytes": 4096}"#).expect("valid json");
        assert!(config.enabled);
        assert_eq!(config.memory_budget_bytes, 4096);
    }
}
