//! The live `server.authentication_cache.enabled` cluster setting.

use sessioninit_core::{AuthCacheConfig, CACHE_ENABLED_SETTING_NAME};
use std::sync::atomic::{AtomicBool, Ordering};

/// Runtime switch for the authentication cache.
///
/// Shared through `Arc` between the cache and whatever applies cluster
/// setting changes. A change is observed by the next lookup.
#[derive(Debug)]
pub struct CacheSettings {
    enabled: AtomicBool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CacheSettings {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn from_config(config: &AuthCacheConfig) -> Self {
        Self::new(config.enabled)
    }

    /// The cluster setting name.
    pub fn name(&self) -> &'static str {
        CACHE_ENABLED_SETTING_NAME
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}
