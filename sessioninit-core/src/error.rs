//! Error types for session initialization lookups

use crate::SystemTable;
use thiserror::Error;

/// Errors raised by the catalog/transaction layer.
///
/// These describe genuine failures to read the source of truth and are
/// always propagated unchanged to whoever asked for the data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("System table not found: {table}")]
    TableNotFound { table: SystemTable },

    #[error("Descriptor lookup failed for {name}: {reason}")]
    DescriptorLookupFailed { name: String, reason: String },

    #[error("Transaction conflict: {reason}")]
    TransactionConflict { reason: String },

    #[error("Catalog read failed: {reason}")]
    ReadFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Memory budget errors.
///
/// Only the memory accountant produces these, and the cache absorbs them:
/// running out of budget means "don't cache", never "fail the login".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory budget exceeded: requested {requested} bytes with {used} of {limit} in use")]
    BudgetExceeded { requested: u64, used: u64, limit: u64 },
}

/// Master error type for session initialization lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionInitError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Server is shutting down")]
    Quiesced,

    #[error("Shared load for {key} ended without a result")]
    LoadAborted { key: String },
}

impl SessionInitError {
    /// Returns true if this error only concerns the caller that observed it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for session initialization lookups.
pub type SessionInitResult<T> = Result<T, SessionInitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display_table_not_found() {
        let err = CatalogError::TableNotFound {
            table: SystemTable::RoleOptions,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("System table not found"));
        assert!(msg.contains("role_options"));
    }

    #[test]
    fn test_memory_error_display() {
        let err = MemoryError::BudgetExceeded {
            requested: 128,
            used: 1000,
            limit: 1024,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("128"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_session_init_error_from_variants() {
        let catalog = SessionInitError::from(CatalogError::TransactionConflict {
            reason: "restart".to_string(),
        });
        assert!(matches!(catalog, SessionInitError::Catalog(_)));

        let config = SessionInitError::from(ConfigError::InvalidValue {
            field: "memory_budget_bytes".to_string(),
            value: "0".to_string(),
            reason: "too small".to_string(),
        });
        assert!(matches!(config, SessionInitError::Config(_)));
    }

    #[test]
    fn test_only_cancelled_is_cancellation() {
        assert!(SessionInitError::Cancelled.is_cancellation());
        assert!(!SessionInitError::Quiesced.is_cancellation());
        assert!(!SessionInitError::LoadAborted {
            key: "authinfo-alice-1-1".to_string()
        }
        .is_cancellation());
    }
}
