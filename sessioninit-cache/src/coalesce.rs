//! Request coalescing for cache misses.
//!
//! At most one load per key is in flight. The first caller for a key spawns
//! the load on its own task and registers a watch channel; later callers for
//! the same key subscribe to that channel instead of starting another load.
//! When the load settles its registry entry is removed and the outcome is
//! broadcast to every subscriber.
//!
//! The spawned task is detached from every caller. A caller that is
//! cancelled stops waiting, but the load keeps running for the others; only
//! the [`Stopper`] aborts it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sessioninit_core::{SessionInitError, SessionInitResult};
use tokio::sync::watch;
use tracing::trace;

use crate::context::{quiesced, RequestContext, Stopper};

type Outcome<T> = Option<SessionInitResult<T>>;
type Registry<T> = Arc<Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>>;

fn lock_registry<T>(
    registry: &Registry<T>,
) -> MutexGuard<'_, HashMap<String, watch::Receiver<Outcome<T>>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the registry entry when the load task finishes, including by panic.
struct InFlightGuard<T> {
    registry: Registry<T>,
    key: String,
}

impl<T> Drop for InFlightGuard<T> {
    fn drop(&mut self) {
        lock_registry(&self.registry).remove(&self.key);
    }
}

/// Deduplicates concurrent loads that share a key.
pub struct RequestCoalescer<T> {
    in_flight: Registry<T>,
    stopper: Stopper,
    loads_started: AtomicU64,
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(stopper: Stopper) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            stopper,
            loads_started: AtomicU64::new(0),
        }
    }

    /// Load the value for `key`, running `load` only if no load for `key` is
    /// already in flight.
    ///
    /// `key` must identify everything the result depends on, including table
    /// versions, so a load is never shared across a version boundary.
    pub async fn load<F, Fut>(
        &self,
        ctx: &RequestContext,
        key: String,
        load: F,
    ) -> SessionInitResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SessionInitResult<T>> + Send + 'static,
    {
        let mut rx = self.join_or_start(&key, load);
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(SessionInitError::Cancelled),
            settled = rx.wait_for(Option::is_some) => {
                settled.ok().and_then(|settled| (*settled).clone())
            }
        };
        outcome.unwrap_or(Err(SessionInitError::LoadAborted { key }))
    }

    fn join_or_start<F, Fut>(&self, key: &str, load: F) -> watch::Receiver<Outcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SessionInitResult<T>> + Send + 'static,
    {
        let mut in_flight = lock_registry(&self.in_flight);
        if let Some(rx) = in_flight.get(key) {
            trace!(key, "Joining in-flight load");
            return rx.clone();
        }

        let fut = load();
        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.to_string(), rx.clone());
        self.loads_started.fetch_add(1, Ordering::Relaxed);

        let guard = InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            key: key.to_string(),
        };
        let shutdown = self.stopper.subscribe();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                res = fut => res,
                _ = quiesced(shutdown) => Err(SessionInitError::Quiesced),
            };
            drop(guard);
            tx.send_replace(Some(outcome));
        });
        rx
    }

    /// Number of loads actually started.
    pub fn loads_started(&self) -> u64 {
        self.loads_started.load(Ordering::Relaxed)
    }

    /// Number of keys with a load currently in flight.
    pub fn in_flight(&self) -> usize {
        lock_registry(&self.in_flight).len()
    }
}
