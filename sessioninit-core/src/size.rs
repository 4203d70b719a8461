//! Static size model for cached entries.
//!
//! Sizes are estimates charged against the cache's memory budget. They use
//! fixed per-type overheads plus the length of variable-size payloads, so the
//! numbers are identical on every platform and build.

use crate::{AuthInfo, SettingsCacheEntry, SqlUsername};

/// Fixed cost of a username map key (string header).
pub const USERNAME_OVERHEAD: u64 = 24;
/// Fixed cost of an `AuthInfo` value: flags, option tags and hash header.
pub const AUTH_INFO_OVERHEAD: u64 = 48;
/// Fixed cost of a `VALID UNTIL` timestamp slot, charged whether set or not.
pub const TIMESTAMP_OVERHEAD: u64 = 16;
/// Fixed cost of a settings entry: key, username header and vector header.
pub const SETTINGS_ENTRY_OVERHEAD: u64 = 56;

/// Types with a deterministic estimate of the memory they pin in the cache.
pub trait EstimatedSize {
    fn estimated_size(&self) -> u64;
}

/// Estimated bytes for caching `info` under `username`.
pub fn auth_info_entry_size(username: &SqlUsername, info: &AuthInfo) -> u64 {
    let hash_size = info
        .hashed_password
        .as_ref()
        .map(|hash| hash.size() as u64)
        .unwrap_or(0);
    USERNAME_OVERHEAD
        + username.normalized().len() as u64
        + AUTH_INFO_OVERHEAD
        + hash_size
        + TIMESTAMP_OVERHEAD
}

impl EstimatedSize for SettingsCacheEntry {
    fn estimated_size(&self) -> u64 {
        let settings: u64 = self.settings.iter().map(|s| s.len() as u64).sum();
        SETTINGS_ENTRY_OVERHEAD + self.key.username.normalized().len() as u64 + settings
    }
}
