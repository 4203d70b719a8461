//! sessioninit Test Utilities
//!
//! Shared test infrastructure for the sessioninit workspace:
//! - An in-memory catalog implementing [`CatalogView`]
//! - Counting, gateable fetchers for both cached lookups
//! - Proptest generators for core types
//! - Fixtures for the common user/settings scenarios
//! - Custom assertions

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

pub use sessioninit_cache::{
    AuthCache, AuthInfoFetcher, CacheSettings, CatalogView, DefaultSettingsFetcher,
    MemoryMonitor, RequestContext, Stopper,
};
pub use sessioninit_core::{
    generate_settings_cache_keys, AuthCacheConfig, AuthInfo, CatalogError, DescriptorId,
    DescriptorVersion, PasswordHash, SessionInitError, SessionInitResult, SettingsCacheEntry,
    SettingsCacheKey, SqlUsername, SystemTable, TableDescriptor, TableVersions, Timestamp,
};

// ============================================================================
// MOCK CATALOG
// ============================================================================

#[derive(Debug, Clone, Default)]
struct CatalogState {
    versions: TableVersions,
    uncommitted: HashSet<SystemTable>,
    missing: HashSet<SystemTable>,
    databases: HashMap<String, DescriptorId>,
    users: HashMap<SqlUsername, AuthInfo>,
    settings: HashMap<SettingsCacheKey, Vec<String>>,
    read_error: Option<CatalogError>,
}

/// In-memory catalog.
///
/// Clones share state, so a test can mutate the catalog while views handed
/// to the cache observe the change. [`MockCatalog::snapshot`] makes an
/// independent copy for tests that need a view frozen at older versions.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog reporting `users` and `role_options` versions, with
    /// `db_role_settings` at 1.
    pub fn at_versions(users: u64, role_options: u64) -> Self {
        let catalog = Self::new();
        catalog.set_versions(TableVersions::new(
            DescriptorVersion(users),
            DescriptorVersion(role_options),
            DescriptorVersion(1),
        ));
        catalog
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Independent copy of the current state.
    pub fn snapshot(&self) -> Self {
        Self {
            state: Arc::new(Mutex::new(self.state().clone())),
        }
    }

    pub fn versions(&self) -> TableVersions {
        self.state().versions
    }

    pub fn set_versions(&self, versions: TableVersions) {
        self.state().versions = versions;
    }

    /// Advance one table's version by one.
    pub fn bump(&self, table: SystemTable) {
        let mut state = self.state();
        match table {
            SystemTable::Users => state.versions.users = state.versions.users.next(),
            SystemTable::RoleOptions => {
                state.versions.role_options = state.versions.role_options.next()
            }
            SystemTable::DatabaseRoleSettings => {
                state.versions.db_role_settings = state.versions.db_role_settings.next()
            }
        }
    }

    /// Report `table` as modified by the view's own transaction.
    pub fn set_uncommitted(&self, table: SystemTable, uncommitted: bool) {
        let mut state = self.state();
        if uncommitted {
            state.uncommitted.insert(table);
        } else {
            state.uncommitted.remove(&table);
        }
    }

    /// Make descriptor lookups for `table` fail with `TableNotFound`.
    pub fn set_missing(&self, table: SystemTable) {
        self.state().missing.insert(table);
    }

    /// Make every fetcher read against this catalog fail with `err`.
    pub fn fail_reads_with(&self, err: CatalogError) {
        self.state().read_error = Some(err);
    }

    pub fn clear_read_error(&self) {
        self.state().read_error = None;
    }

    pub fn add_database(&self, name: impl Into<String>, id: DescriptorId) {
        self.state().databases.insert(name.into(), id);
    }

    pub fn put_user(&self, username: &SqlUsername, info: AuthInfo) {
        self.state().users.insert(username.clone(), info);
    }

    /// Store a `system.database_role_settings` row.
    pub fn put_settings(
        &self,
        database_id: DescriptorId,
        username: &SqlUsername,
        settings: Vec<String>,
    ) {
        self.state()
            .settings
            .insert(SettingsCacheKey::new(database_id, username.clone()), settings);
    }

    fn read_auth_info(&self, username: &SqlUsername) -> SessionInitResult<AuthInfo> {
        let state = self.state();
        if let Some(err) = &state.read_error {
            return Err(err.clone().into());
        }
        Ok(state
            .users
            .get(username)
            .cloned()
            .unwrap_or_else(AuthInfo::unknown_user))
    }

    fn read_default_settings(
        &self,
        username: &SqlUsername,
        database_id: DescriptorId,
    ) -> SessionInitResult<Vec<SettingsCacheEntry>> {
        let state = self.state();
        if let Some(err) = &state.read_error {
            return Err(err.clone().into());
        }
        Ok(generate_settings_cache_keys(database_id, username)
            .into_iter()
            .map(|key| match state.settings.get(&key) {
                Some(settings) => SettingsCacheEntry::new(key, settings.clone()),
                None => SettingsCacheEntry::empty(key),
            })
            .collect())
    }
}

#[async_trait]
impl CatalogView for MockCatalog {
    async fn table_descriptor(&self, table: SystemTable) -> SessionInitResult<TableDescriptor> {
        let state = self.state();
        if state.missing.contains(&table) {
            return Err(CatalogError::TableNotFound { table }.into());
        }
        let version = state.versions.get(table);
        if state.uncommitted.contains(&table) {
            Ok(TableDescriptor::uncommitted(table, version))
        } else {
            Ok(TableDescriptor::committed(table, version))
        }
    }

    async fn database_id_by_name(&self, name: &str) -> SessionInitResult<Option<DescriptorId>> {
        Ok(self.state().databases.get(name).copied())
    }
}

// ============================================================================
// MOCK FETCHERS
// ============================================================================

/// Holds fetches at their entry point until released.
///
/// Closed by default. Once opened with [`FetchGate::hold`], every fetch
/// signals `entered` and then waits for one [`FetchGate::release`].
#[derive(Debug, Default)]
pub struct FetchGate {
    holding: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl FetchGate {
    pub fn hold(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    /// Release one held fetch. A release issued before the fetch arrives is
    /// remembered.
    pub fn release(&self) {
        self.released.notify_one();
    }

    /// Stop holding future fetches.
    pub fn open(&self) {
        self.holding.store(false, Ordering::SeqCst);
    }

    /// Wait until a held fetch has entered.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    async fn pass(&self) {
        if self.holding.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
    }
}

/// AuthInfo fetcher reading from a [`MockCatalog`] view, counting reads.
#[derive(Debug, Default)]
pub struct MockAuthInfoFetcher {
    calls: AtomicUsize,
    gate: FetchGate,
}

impl MockAuthInfoFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn gate(&self) -> &FetchGate {
        &self.gate
    }
}

#[async_trait]
impl AuthInfoFetcher<MockCatalog> for MockAuthInfoFetcher {
    async fn fetch_auth_info(
        &self,
        view: &MockCatalog,
        username: &SqlUsername,
    ) -> SessionInitResult<AuthInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        view.read_auth_info(username)
    }
}

/// Default-settings fetcher reading from a [`MockCatalog`] view, counting reads.
#[derive(Debug, Default)]
pub struct MockSettingsFetcher {
    calls: AtomicUsize,
    gate: FetchGate,
}

impl MockSettingsFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn gate(&self) -> &FetchGate {
        &self.gate
    }
}

#[async_trait]
impl DefaultSettingsFetcher<MockCatalog> for MockSettingsFetcher {
    async fn fetch_default_settings(
        &self,
        view: &MockCatalog,
        username: &SqlUsername,
        database_id: DescriptorId,
    ) -> SessionInitResult<Vec<SettingsCacheEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        view.read_default_settings(username, database_id)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate a normalized username, occasionally the default role.
    pub fn arb_username() -> impl Strategy<Value = SqlUsername> {
        prop_oneof![
            9 => "[a-z][a-z0-9_]{0,15}".prop_map(SqlUsername::new),
            1 => Just(SqlUsername::default_role()),
        ]
    }

    pub fn arb_descriptor_version() -> impl Strategy<Value = DescriptorVersion> {
        (1u64..50).prop_map(DescriptorVersion)
    }

    pub fn arb_table_versions() -> impl Strategy<Value = TableVersions> {
        (
            arb_descriptor_version(),
            arb_descriptor_version(),
            arb_descriptor_version(),
        )
            .prop_map(|(users, role_options, db_role_settings)| {
                TableVersions::new(users, role_options, db_role_settings)
            })
    }

    pub fn arb_database_id() -> impl Strategy<Value = DescriptorId> {
        prop_oneof![
            1 => Just(DescriptorId::DEFAULT_DATABASE),
            4 => (1u32..1000).prop_map(DescriptorId),
        ]
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_600_000_000i64..1_900_000_000i64).prop_map(|secs| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_password_hash() -> impl Strategy<Value = PasswordHash> {
        prop::collection::vec(any::<u8>(), 16..64).prop_map(PasswordHash::new)
    }

    pub fn arb_auth_info() -> impl Strategy<Value = AuthInfo> {
        prop_oneof![
            1 => Just(AuthInfo::unknown_user()),
            4 => (
                any::<bool>(),
                any::<bool>(),
                prop::option::of(arb_password_hash()),
                prop::option::of(arb_timestamp()),
            )
                .prop_map(|(can_login_sql, can_login_db_console, hashed_password, valid_until)| {
                    AuthInfo {
                        user_exists: true,
                        can_login_sql,
                        can_login_db_console,
                        hashed_password,
                        valid_until,
                    }
                }),
        ]
    }

    /// Generate a `name=value` setting string.
    pub fn arb_setting() -> impl Strategy<Value = String> {
        ("[a-z_]{1,20}", "[a-zA-Z0-9_]{0,20}").prop_map(|(name, value)| format!("{name}={value}"))
    }

    pub fn arb_settings_entry() -> impl Strategy<Value = SettingsCacheEntry> {
        (
            arb_database_id(),
            arb_username(),
            prop::collection::vec(arb_setting(), 0..6),
        )
            .prop_map(|(database_id, username, settings)| {
                SettingsCacheEntry::new(SettingsCacheKey::new(database_id, username), settings)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub fn alice() -> SqlUsername {
        SqlUsername::new("alice")
    }

    pub fn bob() -> SqlUsername {
        SqlUsername::new("bob")
    }

    pub fn alice_password() -> PasswordHash {
        PasswordHash::new(b"$2a$10$alice-hashed-password".to_vec())
    }

    /// Catalog at `(users=5, role_options=3)` holding alice with a password.
    pub fn alice_catalog() -> MockCatalog {
        let catalog = MockCatalog::at_versions(5, 3);
        catalog.put_user(&alice(), AuthInfo::login_user(Some(alice_password())));
        catalog
    }

    /// Catalog with database `shop` (ID 7) and settings for bob at every
    /// precedence level.
    pub fn bob_settings_catalog() -> MockCatalog {
        let catalog = MockCatalog::at_versions(1, 1);
        catalog.add_database("shop", DescriptorId(7));
        catalog.put_settings(
            DescriptorId(7),
            &bob(),
            vec!["search_path=shop".to_string()],
        );
        catalog.put_settings(
            DescriptorId::DEFAULT_DATABASE,
            &bob(),
            vec!["timezone=UTC".to_string(), "search_path=public".to_string()],
        );
        catalog.put_settings(
            DescriptorId(7),
            &SqlUsername::default_role(),
            vec!["statement_timeout=30s".to_string()],
        );
        catalog.put_settings(
            DescriptorId::DEFAULT_DATABASE,
            &SqlUsername::default_role(),
            vec!["application_name=app".to_string(), "timezone=PST".to_string()],
        );
        catalog
    }

    /// Enabled cache with the default budget.
    pub fn cache(stopper: &Stopper) -> AuthCache {
        cache_with_budget(stopper, sessioninit_core::DEFAULT_MEMORY_BUDGET_BYTES)
    }

    pub fn cache_with_budget(stopper: &Stopper, budget: u64) -> AuthCache {
        let monitor = MemoryMonitor::new("test-auth-cache", budget);
        AuthCache::new(
            monitor.make_bound_account(),
            Arc::new(CacheSettings::default()),
            stopper.clone(),
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &SessionInitResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got {result:?}");
    }

    #[track_caller]
    pub fn assert_cancelled<T: std::fmt::Debug>(result: &SessionInitResult<T>) {
        assert!(
            matches!(result, Err(SessionInitError::Cancelled)),
            "Expected Cancelled, got {result:?}"
        );
    }

    #[track_caller]
    pub fn assert_catalog_error<T: std::fmt::Debug>(result: &SessionInitResult<T>) {
        assert!(
            matches!(result, Err(SessionInitError::Catalog(_))),
            "Expected Catalog error, got {result:?}"
        );
    }

    /// Assert the entries follow the four-level precedence order for
    /// `database_id` and `username`.
    #[track_caller]
    pub fn assert_precedence_order(
        entries: &[SettingsCacheEntry],
        database_id: DescriptorId,
        username: &SqlUsername,
    ) {
        let keys: Vec<_> = entries.iter().map(|entry| entry.key.clone()).collect();
        assert_eq!(keys, generate_settings_cache_keys(database_id, username).to_vec());
    }
}
