//! Bounded memory accounting for cached entries.
//!
//! A [`MemoryMonitor`] owns a hard byte ceiling. Components draw on it through
//! a [`BoundAccount`], which remembers how much it has reserved so the whole
//! reservation can be handed back in one step when its contents are dropped.

use sessioninit_core::MemoryError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A shared byte budget.
#[derive(Debug)]
pub struct MemoryMonitor {
    name: String,
    limit: u64,
    used: AtomicU64,
}

impl MemoryMonitor {
    /// Create a monitor with a hard `limit` in bytes.
    pub fn new(name: impl Into<String>, limit: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            limit,
            used: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes currently reserved by all accounts.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Open a new, empty account against this monitor.
    pub fn make_bound_account(self: &Arc<Self>) -> BoundAccount {
        BoundAccount {
            monitor: Arc::clone(self),
            used: 0,
        }
    }

    fn reserve(&self, bytes: u64) -> Result<(), MemoryError> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|next| *next <= self.limit)
            })
            .map(|_| ())
            .map_err(|used| MemoryError::BudgetExceeded {
                requested: bytes,
                used,
                limit: self.limit,
            })
    }

    fn release(&self, bytes: u64) {
        // Accounts never release more than they reserved.
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

/// One component's reservation against a [`MemoryMonitor`].
///
/// Not internally synchronized: the owner mutates it under the same lock that
/// guards the data it accounts for.
#[derive(Debug)]
pub struct BoundAccount {
    monitor: Arc<MemoryMonitor>,
    used: u64,
}

impl BoundAccount {
    /// Reserve `bytes` more. On failure nothing is reserved.
    pub fn grow(&mut self, bytes: u64) -> Result<(), MemoryError> {
        if bytes == 0 {
            return Ok(());
        }
        self.monitor.reserve(bytes)?;
        self.used += bytes;
        Ok(())
    }

    /// Release everything this account holds.
    pub fn empty(&mut self) {
        self.monitor.release(self.used);
        self.used = 0;
    }

    /// Bytes held by this account.
    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }
}

impl Drop for BoundAccount {
    fn drop(&mut self) {
        self.empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_grow_within_budget() {
        let monitor = MemoryMonitor::new("test", 100);
        let mut account = monitor.make_bound_account();
        assert!(account.grow(60).is_ok());
        assert!(account.grow(40).is_ok());
        assert_eq!(account.used(), 100);
        assert_eq!(monitor.used(), 100);
    }

    #[test]
    fn test_grow_past_budget_reserves_nothing() {
        let monitor = MemoryMonitor::new("test", 100);
        let mut account = monitor.make_bound_account();
        account.grow(90).expect("fits");

        let err = account.grow(11).expect_err("must not fit");
        assert_eq!(
            err,
            MemoryError::BudgetExceeded {
                requested: 11,
                used: 90,
                limit: 100
            }
        );
        assert_eq!(account.used(), 90);
        assert_eq!(monitor.used(), 90);
    }

    #[test]
    fn test_zero_budget_rejects_everything_but_zero() {
        let monitor = MemoryMonitor::new("test", 0);
        let mut account = monitor.make_bound_account();
        assert!(account.grow(0).is_ok());
        assert!(account.grow(1).is_err());
    }

    #[test]
    fn test_empty_and_drop_release_to_monitor() {
        let monitor = MemoryMonitor::new("test", 1000);
        let mut a = monitor.make_bound_account();
        let mut b = monitor.make_bound_account();
        a.grow(300).expect("fits");
        b.grow(200).expect("fits");
        assert_eq!(monitor.used(), 500);

        a.empty();
        assert_eq!(a.used(), 0);
        assert_eq!(monitor.used(), 200);

        drop(b);
        assert_eq!(monitor.used(), 0);
    }

    proptest! {
        /// Property: no sequence of grows and empties pushes usage past the limit.
        #[test]
        fn prop_usage_never_exceeds_limit(
            limit in 0u64..4096,
            ops in proptest::collection::vec(prop_oneof![
                (1u64..1024).prop_map(Some),
                Just(None),
            ], 0..64),
        ) {
            let monitor = MemoryMonitor::new("prop", limit);
            let mut account = monitor.make_bound_account();
            for op in ops {
                match op {
                    Some(bytes) => { let _ = account.grow(bytes); }
                    None => account.empty(),
                }
                prop_assert!(monitor.used() <= limit);
                prop_assert_eq!(monitor.used(), account.used());
            }
        }
    }
}
