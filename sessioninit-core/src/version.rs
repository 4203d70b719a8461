//! Catalog table versions and the three-way staleness comparison.
//!
//! The cache tracks one watermark per source table. A caller's catalog
//! snapshot carries its own observed version for each table; comparing the
//! two tuples decides whether cached data may be used, must be discarded, or
//! must be ignored for this request.
//!
//! ```text
//! caller > watermark (any table)  ──→ Stale      (advance watermarks, clear)
//! caller < watermark (any table)  ──→ CallerBehind (bypass the cache)
//! caller == watermark (all)       ──→ Current    (serve from cache)
//! ```

use crate::DescriptorVersion;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SYSTEM TABLES
// ============================================================================

/// Catalog tables whose contents feed the authentication cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemTable {
    /// `system.users`: usernames and hashed passwords.
    Users,
    /// `system.role_options`: LOGIN/NOLOGIN, VALID UNTIL and friends.
    RoleOptions,
    /// `system.database_role_settings`: per-database/per-role session defaults.
    DatabaseRoleSettings,
}

impl SystemTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemTable::Users => "users",
            SystemTable::RoleOptions => "role_options",
            SystemTable::DatabaseRoleSettings => "database_role_settings",
        }
    }
}

impl fmt::Display for SystemTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transactional catalog view reports about one system table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table: SystemTable,
    pub version: DescriptorVersion,
    /// True when the view sees an in-progress version written by its own
    /// transaction that has not been committed yet.
    pub uncommitted: bool,
}

impl TableDescriptor {
    pub fn committed(table: SystemTable, version: DescriptorVersion) -> Self {
        Self {
            table,
            version,
            uncommitted: false,
        }
    }

    pub fn uncommitted(table: SystemTable, version: DescriptorVersion) -> Self {
        Self {
            table,
            version,
            uncommitted: true,
        }
    }

    pub fn is_uncommitted(&self) -> bool {
        self.uncommitted
    }
}

// ============================================================================
// VERSION TUPLE
// ============================================================================

/// Outcome of comparing a caller's versions against the stored watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The caller saw a newer version of at least one table.
    Stale,
    /// The caller saw an older version of at least one table and no newer one.
    CallerBehind,
    /// Every version matches.
    Current,
}

/// Versions of the three source tables, compared jointly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TableVersions {
    pub users: DescriptorVersion,
    pub role_options: DescriptorVersion,
    pub db_role_settings: DescriptorVersion,
}

impl TableVersions {
    pub fn new(
        users: DescriptorVersion,
        role_options: DescriptorVersion,
        db_role_settings: DescriptorVersion,
    ) -> Self {
        Self {
            users,
            role_options,
            db_role_settings,
        }
    }

    fn as_array(&self) -> [DescriptorVersion; 3] {
        [self.users, self.role_options, self.db_role_settings]
    }

    /// Compare `observed` (the caller's snapshot) against `self` (the watermarks).
    ///
    /// Any newer observed version wins over any older one: a snapshot that is
    /// ahead on one table and behind on another still makes the cache stale.
    pub fn compare(&self, observed: &TableVersions) -> Staleness {
        let stored = self.as_array();
        let seen = observed.as_array();
        if stored.iter().zip(seen.iter()).any(|(s, o)| o > s) {
            Staleness::Stale
        } else if stored.iter().zip(seen.iter()).any(|(s, o)| o < s) {
            Staleness::CallerBehind
        } else {
            Staleness::Current
        }
    }

    /// Component-wise maximum. Watermarks never move backwards.
    pub fn max(&self, other: &TableVersions) -> TableVersions {
        TableVersions {
            users: self.users.max(other.users),
            role_options: self.role_options.max(other.role_options),
            db_role_settings: self.db_role_settings.max(other.db_role_settings),
        }
    }

    pub fn get(&self, table: SystemTable) -> DescriptorVersion {
        match table {
            SystemTable::Users => self.users,
            SystemTable::RoleOptions => self.role_options,
            SystemTable::DatabaseRoleSettings => self.db_role_settings,
        }
    }
}

impl fmt::Display for TableVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(users={}, role_options={}, db_role_settings={})",
            self.users, self.role_options, self.db_role_settings
        )
    }
}
