//! Versioned store for cached authentication data.
//!
//! The store keeps two maps and the table-version watermarks they were
//! populated at. Watermarks, maps and the memory account form one
//! consistency unit behind a single mutex: a watermark never advances
//! without the maps being cleared and the account emptied in the same
//! critical section.
//!
//! The lock is only ever held for in-memory work. Catalog reads happen
//! outside it, and no reference into the maps escapes a method call.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sessioninit_core::{
    auth_info_entry_size, generate_settings_cache_keys, AuthInfo, DescriptorId, DescriptorVersion,
    EstimatedSize, MemoryError, SettingsCacheEntry, SettingsCacheKey, SqlUsername, Staleness,
    TableVersions,
};
use tracing::{debug, warn};

use crate::memory::BoundAccount;

/// Result of consulting the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLookup<T> {
    /// The entry is present and current for the caller's versions.
    Hit(T),
    /// The store may be used but doesn't hold the entry.
    Miss,
    /// The store holds data newer than the caller's snapshot; don't use it.
    Ineligible,
}

/// Result of trying to install a fetched value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBack {
    Installed,
    /// Another waiter on the same load already installed the value.
    AlreadyPresent,
    /// A watermark moved while the value was being fetched.
    VersionMoved,
    /// The memory budget refused the entry.
    OverBudget(MemoryError),
}

#[derive(Debug)]
struct StoreInner {
    watermarks: TableVersions,
    auth_info: HashMap<SqlUsername, AuthInfo>,
    settings: HashMap<SettingsCacheKey, Vec<String>>,
    account: BoundAccount,
    invalidations: u64,
}

impl StoreInner {
    /// Compare `observed` against the watermarks, clearing everything if the
    /// caller has seen newer table versions. Returns whether the store may be
    /// consulted for this caller.
    fn clear_if_stale(&mut self, observed: &TableVersions) -> bool {
        match self.watermarks.compare(observed) {
            Staleness::Stale => {
                let advanced = self.watermarks.max(observed);
                debug!(
                    from = %self.watermarks,
                    to = %advanced,
                    auth_info_entries = self.auth_info.len(),
                    settings_entries = self.settings.len(),
                    released_bytes = self.account.used(),
                    "Catalog versions advanced, clearing authentication cache"
                );
                self.watermarks = advanced;
                self.auth_info = HashMap::new();
                self.settings = HashMap::new();
                self.account.empty();
                self.invalidations += 1;
                true
            }
            Staleness::CallerBehind => false,
            Staleness::Current => true,
        }
    }
}

/// Watermark-guarded maps of cached authentication data.
#[derive(Debug)]
pub struct VersionedStore {
    inner: Mutex<StoreInner>,
}

impl VersionedStore {
    /// Create an empty store charging its entries to `account`.
    pub fn new(account: BoundAccount) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                watermarks: TableVersions::default(),
                auth_info: HashMap::new(),
                settings: HashMap::new(),
                account,
                invalidations: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Critical sections contain no fallible calls; a poisoned guard still
        // holds a consistent store.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up cached AuthInfo for `username` as of the given table versions.
    ///
    /// Only the `users` and `role_options` versions are checked; the stored
    /// `database_role_settings` watermark is passed through unchanged.
    pub fn lookup_auth_info(
        &self,
        username: &SqlUsername,
        users_version: DescriptorVersion,
        role_options_version: DescriptorVersion,
    ) -> StoreLookup<AuthInfo> {
        let mut inner = self.lock();
        let observed = TableVersions::new(
            users_version,
            role_options_version,
            inner.watermarks.db_role_settings,
        );
        if !inner.clear_if_stale(&observed) {
            return StoreLookup::Ineligible;
        }
        match inner.auth_info.get(username) {
            Some(info) => StoreLookup::Hit(info.clone()),
            None => StoreLookup::Miss,
        }
    }

    /// Look up all four precedence levels of default settings for
    /// `database_id` and `username`.
    ///
    /// Any missing level is a miss for the whole set: an absent key can't be
    /// told apart from "no override exists" without reading the catalog.
    pub fn lookup_settings(
        &self,
        database_id: DescriptorId,
        username: &SqlUsername,
        db_role_settings_version: DescriptorVersion,
    ) -> StoreLookup<Vec<SettingsCacheEntry>> {
        let mut inner = self.lock();
        let observed = TableVersions::new(
            inner.watermarks.users,
            inner.watermarks.role_options,
            db_role_settings_version,
        );
        if !inner.clear_if_stale(&observed) {
            return StoreLookup::Ineligible;
        }
        let mut entries = Vec::with_capacity(4);
        for key in generate_settings_cache_keys(database_id, username) {
            let Some(settings) = inner.settings.get(&key) else {
                return StoreLookup::Miss;
            };
            let settings = settings.clone();
            entries.push(SettingsCacheEntry::new(key, settings));
        }
        StoreLookup::Hit(entries)
    }

    /// Install `info` if the watermarks still match the versions it was
    /// fetched at and the memory budget allows it.
    pub fn write_auth_info(
        &self,
        users_version: DescriptorVersion,
        role_options_version: DescriptorVersion,
        username: &SqlUsername,
        info: &AuthInfo,
    ) -> WriteBack {
        let mut inner = self.lock();
        if inner.watermarks.users != users_version
            || inner.watermarks.role_options != role_options_version
        {
            debug!(
                user = %username,
                fetched_users_version = %users_version,
                fetched_role_options_version = %role_options_version,
                watermarks = %inner.watermarks,
                "Table versions moved during fetch, not caching authentication info"
            );
            return WriteBack::VersionMoved;
        }
        // Same versions means the same value; don't charge twice.
        if inner.auth_info.contains_key(username) {
            return WriteBack::AlreadyPresent;
        }
        let size = auth_info_entry_size(username, info);
        if let Err(err) = inner.account.grow(size) {
            warn!(
                user = %username,
                requested = size,
                error = %err,
                "no memory available to cache authentication info"
            );
            return WriteBack::OverBudget(err);
        }
        inner.auth_info.insert(username.clone(), info.clone());
        WriteBack::Installed
    }

    /// Install fetched settings entries if the `database_role_settings`
    /// watermark still matches and the memory budget allows it.
    ///
    /// Keys already present are neither overwritten nor charged again.
    pub fn write_settings(
        &self,
        db_role_settings_version: DescriptorVersion,
        entries: &[SettingsCacheEntry],
    ) -> WriteBack {
        let mut inner = self.lock();
        if inner.watermarks.db_role_settings != db_role_settings_version {
            debug!(
                fetched_version = %db_role_settings_version,
                watermarks = %inner.watermarks,
                "Table versions moved during fetch, not caching default settings"
            );
            return WriteBack::VersionMoved;
        }

        let mut charged = HashSet::new();
        let mut size = 0u64;
        for entry in entries {
            if inner.settings.contains_key(&entry.key) || !charged.insert(&entry.key) {
                continue;
            }
            size += entry.estimated_size();
        }
        if charged.is_empty() {
            return WriteBack::AlreadyPresent;
        }
        if let Err(err) = inner.account.grow(size) {
            warn!(
                requested = size,
                error = %err,
                "no memory available to cache default settings"
            );
            return WriteBack::OverBudget(err);
        }
        for entry in entries {
            inner
                .settings
                .entry(entry.key.clone())
                .or_insert_with(|| entry.settings.clone());
        }
        WriteBack::Installed
    }

    /// Current watermarks.
    pub fn watermarks(&self) -> TableVersions {
        self.lock().watermarks
    }

    pub fn contains_auth_info(&self, username: &SqlUsername) -> bool {
        self.lock().auth_info.contains_key(username)
    }

    pub fn contains_settings(&self, key: &SettingsCacheKey) -> bool {
        self.lock().settings.contains_key(key)
    }

    pub fn auth_info_len(&self) -> usize {
        self.lock().auth_info.len()
    }

    pub fn settings_len(&self) -> usize {
        self.lock().settings.len()
    }

    /// Bytes currently charged to the memory account.
    pub fn accounted_bytes(&self) -> u64 {
        self.lock().account.used()
    }

    /// Number of staleness-triggered clears so far.
    pub fn invalidations(&self) -> u64 {
        self.lock().invalidations
    }
}
