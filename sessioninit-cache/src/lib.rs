//! sessioninit Cache - Authentication and Session Defaults Cache
//!
//! Caches, per node, the data every new connection needs before it can run
//! a query: the user's hashed password and login flags, and the default
//! session settings that apply to the user and database.
//!
//! Entries are only valid for the exact system-table versions they were read
//! at. A caller whose catalog view is ahead of the cache invalidates it; a
//! caller that is behind bypasses it. Concurrent misses for the same key
//! share one read, and every byte held is charged to a bounded memory
//! account.

pub mod cache;
pub mod catalog;
pub mod coalesce;
pub mod context;
pub mod memory;
pub mod settings;
pub mod stats;
pub mod store;

pub use cache::{
    auth_info_request_key, default_settings_request_key, AuthCache, AUTH_CACHE_MONITOR_NAME,
};
pub use catalog::{AuthInfoFetcher, CatalogView, DefaultSettingsFetcher};
pub use coalesce::RequestCoalescer;
pub use context::{CancelHandle, RequestContext, Stopper};
pub use memory::{BoundAccount, MemoryMonitor};
pub use settings::CacheSettings;
pub use stats::CacheStats;
pub use store::{StoreLookup, VersionedStore, WriteBack};

// Re-export the core crate so callers need a single dependency.
pub use sessioninit_core;
