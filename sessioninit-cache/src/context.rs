//! Cancellation signals: per-request contexts and process-wide quiescence.

use sessioninit_core::{SessionInitError, SessionInitResult};
use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Process-wide shutdown signal.
///
/// Cloning a `Stopper` shares the same signal. Once quiesced it stays
/// quiesced.
#[derive(Debug, Clone)]
pub struct Stopper {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopper {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Begin shutdown. In-flight shared loads abort with `Quiesced`.
    pub fn quiesce(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_quiescing(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once `shutdown` reports quiescence. Never resolves if the
/// [`Stopper`] is gone without having quiesced.
pub(crate) async fn quiesced(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stopped| *stopped).await.is_err() {
        pending::<()>().await;
    }
}

/// Handle used to cancel a [`RequestContext`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// One caller's cancellation scope.
///
/// Cancelling a context (explicitly or by deadline) only releases the caller
/// holding it. Shared loads it joined keep running for everyone else.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context paired with a handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancel: Some(rx),
                deadline: None,
            },
            CancelHandle { tx },
        )
    }

    /// A copy of this context that is also cancelled after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        let signalled = self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false);
        let expired = self.deadline.map(|d| Instant::now() >= d).unwrap_or(false);
        signalled || expired
    }

    /// Resolves when this context is cancelled.
    pub async fn cancelled(&self) {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        let signal = async {
            match &self.cancel {
                Some(rx) => {
                    let mut rx = rx.clone();
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            _ = deadline => {}
            _ = signal => {}
        }
    }

    /// Drive `fut` unless this context is cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> SessionInitResult<T>
    where
        F: Future<Output = SessionInitResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SessionInitError::Cancelled),
            res = fut => res,
        }
    }
}
