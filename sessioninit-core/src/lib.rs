//! sessioninit Core - Data Types
//!
//! Pure data structures shared by the authentication cache and its callers.
//! This crate contains ONLY data types and value helpers - no caching logic.

mod auth;
mod config;
mod error;
mod identity;
mod settings;
mod size;
mod version;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

pub use identity::{DescriptorId, DescriptorVersion, PasswordHash, SqlUsername, Timestamp};

// ============================================================================
// CATALOG VERSIONS
// ============================================================================

pub use version::{Staleness, SystemTable, TableDescriptor, TableVersions};

// ============================================================================
// CACHED VALUES
// ============================================================================

pub use auth::AuthInfo;
pub use settings::{
    generate_settings_cache_keys, resolve_session_defaults, SettingsCacheEntry, SettingsCacheKey,
};
pub use size::{
    auth_info_entry_size, EstimatedSize, AUTH_INFO_OVERHEAD, SETTINGS_ENTRY_OVERHEAD,
    TIMESTAMP_OVERHEAD, USERNAME_OVERHEAD,
};

// ============================================================================
// ERRORS AND CONFIGURATION
// ============================================================================

pub use config::{
    AuthCacheConfig, CACHE_ENABLED_SETTING_NAME, DEFAULT_MEMORY_BUDGET_BYTES,
    MAX_MEMORY_BUDGET_BYTES,
};
pub use error::{CatalogError, ConfigError, MemoryError, SessionInitError, SessionInitResult};
