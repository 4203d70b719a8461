//! Identity types for catalog-backed authentication data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// SQL USERNAME
// ============================================================================

/// A normalized SQL username.
///
/// Usernames are case-insensitive identifiers; the normalized form is the
/// lowercased input, nothing else is altered. The empty username is reserved
/// and stands for the "default role" used by role-level session defaults that
/// apply to every user. Real usernames are never empty, so `new("")` is the
/// only input that yields the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SqlUsername(String);

impl SqlUsername {
    /// Normalize a raw identifier into a username.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_lowercase())
    }

    /// The reserved "default role" username (empty string).
    pub fn default_role() -> Self {
        Self(String::new())
    }

    /// The normalized form of this username.
    pub fn normalized(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the default-role sentinel.
    pub fn is_default_role(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SqlUsername {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SqlUsername {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ============================================================================
// DESCRIPTOR IDENTITY
// ============================================================================

/// Catalog descriptor identifier (databases, tables).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DescriptorId(pub u32);

impl DescriptorId {
    /// Sentinel for "no specific database". Never assigned to a real database.
    pub const DEFAULT_DATABASE: DescriptorId = DescriptorId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_default_database(&self) -> bool {
        *self == Self::DEFAULT_DATABASE
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of a catalog table descriptor.
///
/// Versions only ever move forward for a given table; comparing them tells a
/// reader whether two observations of the table saw the same schema/contents
/// generation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DescriptorVersion(pub u64);

impl DescriptorVersion {
    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The next version after this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for DescriptorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// PASSWORD HASH
// ============================================================================

/// An opaque stored password hash.
///
/// The cache never interprets the bytes. `Debug` prints a short SHA-256
/// fingerprint instead of the hash itself so log lines can't leak it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash(Vec<u8>);

impl PasswordHash {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of payload bytes held by this hash.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// First eight bytes of the SHA-256 of the hash, hex encoded.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHash")
            .field("len", &self.0.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
