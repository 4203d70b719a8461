//! Authentication projection of a catalog user row

use crate::{PasswordHash, Timestamp};
use serde::{Deserialize, Serialize};

/// Data used to perform an authentication attempt.
///
/// Built from `system.users` and `system.role_options` as they were at one
/// catalog version. Values are replaced wholesale on refresh, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthInfo {
    /// True if the user has a row in `system.users`.
    pub user_exists: bool,
    /// False if the user has the NOLOGIN or NOSQLLOGIN role option.
    pub can_login_sql: bool,
    /// False if the user has the NOLOGIN role option.
    pub can_login_db_console: bool,
    /// Stored password hash, absent for passwordless users.
    pub hashed_password: Option<PasswordHash>,
    /// The VALID UNTIL role option.
    pub valid_until: Option<Timestamp>,
}

impl AuthInfo {
    /// AuthInfo for a username with no `system.users` row.
    pub fn unknown_user() -> Self {
        Self::default()
    }

    /// AuthInfo for an existing user allowed to log in everywhere.
    pub fn login_user(hashed_password: Option<PasswordHash>) -> Self {
        Self {
            user_exists: true,
            can_login_sql: true,
            can_login_db_console: true,
            hashed_password,
            valid_until: None,
        }
    }

    pub fn with_valid_until(mut self, valid_until: Timestamp) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    /// Returns true if VALID UNTIL is set and lies before `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.valid_until.map(|until| until < now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_unknown_user_cannot_login() {
        let info = AuthInfo::unknown_user();
        assert!(!info.user_exists);
        assert!(!info.can_login_sql);
        assert!(info.hashed_password.is_none());
    }

    #[test]
    fn test_valid_until_expiry() {
        let now = Utc::now();
        let info = AuthInfo::login_user(None).with_valid_until(now - Duration::seconds(1));
        assert!(info.is_expired_at(now));

        let info = AuthInfo::login_user(None).with_valid_until(now + Duration::hours(1));
        assert!(!info.is_expired_at(now));

        assert!(!AuthInfo::login_user(None).is_expired_at(now));
    }
}
