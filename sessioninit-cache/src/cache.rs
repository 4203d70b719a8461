//! Authentication cache facade.
//!
//! Ties the versioned store, the request coalescer and the memory account
//! together behind the two lookups session setup needs:
//!
//! ```text
//! disabled ─────────────────────────────────────────────→ direct read
//! enabled → read table descriptors → uncommitted? ──────→ direct read
//!                                  → staleness check → caller behind → direct read
//!                                                    → hit ─────────→ return
//!                                                    → miss → coalesced load → write-back → return
//! ```
//!
//! Every degradation (disabled, uncommitted, caller behind, over budget,
//! version moved during the fetch) only changes latency. Catalog errors are
//! returned to the caller unchanged.

use std::sync::Arc;

use sessioninit_core::{
    AuthCacheConfig, AuthInfo, DescriptorId, DescriptorVersion, SessionInitResult,
    SettingsCacheEntry, SqlUsername, SystemTable,
};
use tracing::{debug, trace};

use crate::catalog::{AuthInfoFetcher, CatalogView, DefaultSettingsFetcher};
use crate::coalesce::RequestCoalescer;
use crate::context::{RequestContext, Stopper};
use crate::memory::{BoundAccount, MemoryMonitor};
use crate::settings::CacheSettings;
use crate::stats::{CacheCounters, CacheStats};
use crate::store::{StoreLookup, VersionedStore, WriteBack};

/// Name of the memory monitor created by [`AuthCache::from_config`].
pub const AUTH_CACHE_MONITOR_NAME: &str = "authentication-cache";

/// Coalescing key for an AuthInfo load.
pub fn auth_info_request_key(
    username: &SqlUsername,
    users_version: DescriptorVersion,
    role_options_version: DescriptorVersion,
) -> String {
    format!(
        "authinfo-{}-{}-{}",
        username.normalized(),
        users_version,
        role_options_version
    )
}

/// Coalescing key for a default-settings load.
pub fn default_settings_request_key(
    username: &SqlUsername,
    database_id: DescriptorId,
    db_role_settings_version: DescriptorVersion,
) -> String {
    format!(
        "defaultsettings-{}-{}-{}",
        username.normalized(),
        database_id,
        db_role_settings_version
    )
}

/// Shared cache of hashed passwords, login flags and session defaults used
/// during authentication and session initialization.
pub struct AuthCache {
    store: VersionedStore,
    auth_info_loads: RequestCoalescer<AuthInfo>,
    settings_loads: RequestCoalescer<Vec<SettingsCacheEntry>>,
    settings: Arc<CacheSettings>,
    counters: CacheCounters,
}

impl AuthCache {
    /// Create a cache charging entries to `account`. In-flight loads are
    /// aborted when `stopper` quiesces.
    pub fn new(account: BoundAccount, settings: Arc<CacheSettings>, stopper: Stopper) -> Self {
        Self {
            store: VersionedStore::new(account),
            auth_info_loads: RequestCoalescer::new(stopper.clone()),
            settings_loads: RequestCoalescer::new(stopper),
            settings,
            counters: CacheCounters::default(),
        }
    }

    /// Create a cache with its own memory monitor sized from `config`.
    pub fn from_config(config: &AuthCacheConfig, stopper: Stopper) -> SessionInitResult<Self> {
        config.validate()?;
        let monitor = MemoryMonitor::new(AUTH_CACHE_MONITOR_NAME, config.memory_budget_bytes);
        Ok(Self::new(
            monitor.make_bound_account(),
            Arc::new(CacheSettings::from_config(config)),
            stopper,
        ))
    }

    pub fn settings(&self) -> &Arc<CacheSettings> {
        &self.settings
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::from_counters(&self.counters);
        stats.loads_started =
            self.auth_info_loads.loads_started() + self.settings_loads.loads_started();
        stats.invalidations = self.store.invalidations();
        stats.auth_info_entries = self.store.auth_info_len() as u64;
        stats.settings_entries = self.store.settings_len() as u64;
        stats.memory_bytes = self.store.accounted_bytes();
        stats
    }

    /// Return the AuthInfo for `username`.
    ///
    /// Served from the cache when it holds data for exactly the table
    /// versions `view` sees; otherwise read through `fetcher`, with at most
    /// one read in flight per user and version pair.
    pub async fn get_auth_info<V, F>(
        &self,
        ctx: &RequestContext,
        view: &Arc<V>,
        username: &SqlUsername,
        fetcher: &Arc<F>,
    ) -> SessionInitResult<AuthInfo>
    where
        V: CatalogView + 'static,
        F: AuthInfoFetcher<V> + 'static,
    {
        if !self.settings.is_enabled() {
            return self.read_auth_info_directly(ctx, view, username, fetcher).await;
        }

        let users = ctx.run(view.table_descriptor(SystemTable::Users)).await?;
        let role_options = ctx
            .run(view.table_descriptor(SystemTable::RoleOptions))
            .await?;

        // The view's own transaction is changing one of the tables; nothing
        // cached can be trusted and nothing read may be cached.
        if users.is_uncommitted() || role_options.is_uncommitted() {
            debug!(
                user = %username,
                users_uncommitted = users.is_uncommitted(),
                role_options_uncommitted = role_options.is_uncommitted(),
                "Uncommitted table version, bypassing authentication cache"
            );
            return self.read_auth_info_directly(ctx, view, username, fetcher).await;
        }
        let users_version = users.version;
        let role_options_version = role_options.version;

        match self
            .store
            .lookup_auth_info(username, users_version, role_options_version)
        {
            StoreLookup::Hit(info) => {
                trace!(user = %username, "Authentication cache hit");
                CacheCounters::incr(&self.counters.hits);
                return Ok(info);
            }
            StoreLookup::Ineligible => {
                return self.read_auth_info_directly(ctx, view, username, fetcher).await;
            }
            StoreLookup::Miss => CacheCounters::incr(&self.counters.misses),
        }

        let key = auth_info_request_key(username, users_version, role_options_version);
        let load = {
            let view = Arc::clone(view);
            let fetcher = Arc::clone(fetcher);
            let username = username.clone();
            move || async move { fetcher.fetch_auth_info(&view, &username).await }
        };
        let info = self.auth_info_loads.load(ctx, key, load).await?;

        let outcome =
            self.store
                .write_auth_info(users_version, role_options_version, username, &info);
        self.record_write_back(&outcome);
        Ok(info)
    }

    /// Return the default settings for `username` connecting to
    /// `database_name`, one entry per precedence level, most specific first.
    ///
    /// Callers apply entries in order and skip a setting name already set by
    /// an earlier entry. An unknown (or empty) database name resolves to the
    /// default database, so only role-wide settings apply.
    pub async fn get_default_settings<V, F>(
        &self,
        ctx: &RequestContext,
        view: &Arc<V>,
        username: &SqlUsername,
        database_name: &str,
        fetcher: &Arc<F>,
    ) -> SessionInitResult<Vec<SettingsCacheEntry>>
    where
        V: CatalogView + 'static,
        F: DefaultSettingsFetcher<V> + 'static,
    {
        let database_id = self.resolve_database_id(ctx, view, database_name).await?;
        if !self.settings.is_enabled() {
            return self
                .read_settings_directly(ctx, view, username, database_id, fetcher)
                .await;
        }

        let db_role_settings = ctx
            .run(view.table_descriptor(SystemTable::DatabaseRoleSettings))
            .await?;
        if db_role_settings.is_uncommitted() {
            debug!(
                user = %username,
                database_id = %database_id,
                "Uncommitted table version, bypassing default settings cache"
            );
            return self
                .read_settings_directly(ctx, view, username, database_id, fetcher)
                .await;
        }
        let version = db_role_settings.version;

        match self.store.lookup_settings(database_id, username, version) {
            StoreLookup::Hit(entries) => {
                trace!(user = %username, database_id = %database_id, "Default settings cache hit");
                CacheCounters::incr(&self.counters.hits);
                return Ok(entries);
            }
            StoreLookup::Ineligible => {
                return self
                    .read_settings_directly(ctx, view, username, database_id, fetcher)
                    .await;
            }
            StoreLookup::Miss => CacheCounters::incr(&self.counters.misses),
        }

        let key = default_settings_request_key(username, database_id, version);
        let load = {
            let view = Arc::clone(view);
            let fetcher = Arc::clone(fetcher);
            let username = username.clone();
            move || async move {
                fetcher
                    .fetch_default_settings(&view, &username, database_id)
                    .await
            }
        };
        let entries = self.settings_loads.load(ctx, key, load).await?;

        let outcome = self.store.write_settings(version, &entries);
        self.record_write_back(&outcome);
        Ok(entries)
    }

    async fn resolve_database_id<V>(
        &self,
        ctx: &RequestContext,
        view: &Arc<V>,
        database_name: &str,
    ) -> SessionInitResult<DescriptorId>
    where
        V: CatalogView + 'static,
    {
        if database_name.is_empty() {
            return Ok(DescriptorId::DEFAULT_DATABASE);
        }
        match ctx.run(view.database_id_by_name(database_name)).await? {
            Some(id) => Ok(id),
            None => {
                debug!(
                    database = database_name,
                    "Unknown database, using role-wide default settings only"
                );
                Ok(DescriptorId::DEFAULT_DATABASE)
            }
        }
    }

    async fn read_auth_info_directly<V, F>(
        &self,
        ctx: &RequestContext,
        view: &Arc<V>,
        username: &SqlUsername,
        fetcher: &Arc<F>,
    ) -> SessionInitResult<AuthInfo>
    where
        V: CatalogView + 'static,
        F: AuthInfoFetcher<V> + 'static,
    {
        CacheCounters::incr(&self.counters.bypasses);
        ctx.run(fetcher.fetch_auth_info(view, username)).await
    }

    async fn read_settings_directly<V, F>(
        &self,
        ctx: &RequestContext,
        view: &Arc<V>,
        username: &SqlUsername,
        database_id: DescriptorId,
        fetcher: &Arc<F>,
    ) -> SessionInitResult<Vec<SettingsCacheEntry>>
    where
        V: CatalogView + 'static,
        F: DefaultSettingsFetcher<V> + 'static,
    {
        CacheCounters::incr(&self.counters.bypasses);
        ctx.run(fetcher.fetch_default_settings(view, username, database_id))
            .await
    }

    fn record_write_back(&self, outcome: &WriteBack) {
        let counter = match outcome {
            WriteBack::Installed => &self.counters.write_backs,
            WriteBack::AlreadyPresent => return,
            WriteBack::VersionMoved => &self.counters.write_backs_discarded,
            WriteBack::OverBudget(_) => &self.counters.grants_rejected,
        };
        CacheCounters::incr(counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessioninit_core::{SessionInitError, MAX_MEMORY_BUDGET_BYTES};

    #[test]
    fn test_request_keys_embed_versions() {
        let alice = SqlUsername::new("Alice");
        assert_eq!(
            auth_info_request_key(&alice, DescriptorVersion(5), DescriptorVersion(3)),
            "authinfo-alice-5-3"
        );
        assert_eq!(
            default_settings_request_key(&alice, DescriptorId(7), DescriptorVersion(2)),
            "defaultsettings-alice-7-2"
        );
        assert_ne!(
            auth_info_request_key(&alice, DescriptorVersion(5), DescriptorVersion(3)),
            auth_info_request_key(&alice, DescriptorVersion(5), DescriptorVersion(4)),
        );
    }

    #[test]
    fn test_from_config_validates() {
        let config = AuthCacheConfig::new().with_memory_budget(MAX_MEMORY_BUDGET_BYTES + 1);
        assert!(matches!(
            AuthCache::from_config(&config, Stopper::new()),
            Err(SessionInitError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_starts_empty() {
        let cache = AuthCache::from_config(&AuthCacheConfig::default(), Stopper::new())
            .expect("default config is valid");
        assert!(cache.settings().is_enabled());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
