//! Cooperative cancellation shared by every public resolution operation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::errors::{DexecError, DexecResult};

/// A cloneable cancellation signal.
///
/// Clones observe the same state; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every pending [`CancelToken::cancelled`] future.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fail fast with [`DexecError::OperationCancelled`] once cancelled.
    pub fn check(&self) -> DexecResult<()> {
        if self.is_cancelled() {
            Err(DexecError::OperationCancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` to completion unless the token fires first.
    pub async fn run<T, F>(&self, fut: F) -> DexecResult<T>
    where
        F: Future<Output = DexecResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DexecError::OperationCancelled),
            res = fut => res,
        }
    }
}
