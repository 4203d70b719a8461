//! Collaborator traits supplied by the catalog/transaction layer.
//!
//! The cache never reads system tables itself. It asks a [`CatalogView`] for
//! table versions and database IDs, and hands misses to a fetcher that
//! performs the actual read inside the same view.

use async_trait::async_trait;
use sessioninit_core::{
    AuthInfo, DescriptorId, SessionInitResult, SettingsCacheEntry, SqlUsername, SystemTable,
    TableDescriptor,
};

/// A consistent transactional view of the catalog.
#[async_trait]
pub trait CatalogView: Send + Sync {
    /// Current descriptor of `table` as seen by this view.
    async fn table_descriptor(&self, table: SystemTable) -> SessionInitResult<TableDescriptor>;

    /// Resolve a database name. `Ok(None)` means the database doesn't exist,
    /// which is not an error.
    async fn database_id_by_name(&self, name: &str) -> SessionInitResult<Option<DescriptorId>>;
}

/// Reads AuthInfo for one user from `system.users` and `system.role_options`.
#[async_trait]
pub trait AuthInfoFetcher<V: CatalogView>: Send + Sync {
    async fn fetch_auth_info(&self, view: &V, username: &SqlUsername)
        -> SessionInitResult<AuthInfo>;
}

/// Reads the four precedence levels of default settings from
/// `system.database_role_settings`.
///
/// Implementations return one entry per key of
/// [`generate_settings_cache_keys`](sessioninit_core::generate_settings_cache_keys),
/// in that order, using an empty entry where no row exists.
#[async_trait]
pub trait DefaultSettingsFetcher<V: CatalogView>: Send + Sync {
    async fn fetch_default_settings(
        &self,
        view: &V,
        username: &SqlUsername,
        database_id: DescriptorId,
    ) -> SessionInitResult<Vec<SettingsCacheEntry>>;
}
