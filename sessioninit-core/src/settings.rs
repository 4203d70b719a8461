//! Default session settings keyed by (database, role).
//!
//! A login resolves its session defaults from up to four rows of
//! `system.database_role_settings`, most specific first:
//!
//! ```text
//! (db,      user)      ALTER ROLE user IN DATABASE db SET ...
//! (default, user)      ALTER ROLE user SET ...
//! (db,      default)   ALTER DATABASE db SET ...   (ALTER ROLE ALL IN DATABASE)
//! (default, default)   ALTER ROLE ALL SET ...
//! ```

use crate::{DescriptorId, SqlUsername};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Key of one default-settings cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettingsCacheKey {
    /// `DescriptorId::DEFAULT_DATABASE` for settings that apply to every database.
    pub database_id: DescriptorId,
    /// `SqlUsername::default_role()` for settings that apply to every role.
    pub username: SqlUsername,
}

impl SettingsCacheKey {
    pub fn new(database_id: DescriptorId, username: SqlUsername) -> Self {
        Self {
            database_id,
            username,
        }
    }
}

/// One precedence level of resolved session defaults.
///
/// Settings are `name=value` strings in the order they were stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsCacheEntry {
    pub key: SettingsCacheKey,
    pub settings: Vec<String>,
}

impl SettingsCacheEntry {
    pub fn new(key: SettingsCacheKey, settings: Vec<String>) -> Self {
        Self { key, settings }
    }

    /// An entry recording that no override exists at this precedence level.
    pub fn empty(key: SettingsCacheKey) -> Self {
        Self {
            key,
            settings: Vec::new(),
        }
    }
}

/// Returns every settings key relevant to `database_id` and `username`, in
/// descending order of precedence.
pub fn generate_settings_cache_keys(
    database_id: DescriptorId,
    username: &SqlUsername,
) -> [SettingsCacheKey; 4] {
    [
        SettingsCacheKey::new(database_id, username.clone()),
        SettingsCacheKey::new(DescriptorId::DEFAULT_DATABASE, username.clone()),
        SettingsCacheKey::new(database_id, SqlUsername::default_role()),
        SettingsCacheKey::new(DescriptorId::DEFAULT_DATABASE, SqlUsername::default_role()),
    ]
}

/// Flatten precedence-ordered entries into the `(name, value)` pairs a new
/// session should apply.
///
/// The first entry to mention a setting name wins; later (less specific)
/// entries can't override it. Strings without an `=` are ignored.
pub fn resolve_session_defaults(entries: &[SettingsCacheEntry]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for entry in entries {
        for setting in &entry.settings {
            let Some((name, value)) = setting.split_once('=') else {
                continue;
            };
            let name = name.trim().to_lowercase();
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }
            resolved.push((name, value.trim().to_string()));
        }
    }
    resolved
}
