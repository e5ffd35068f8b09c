//! Cancellation signal for callers waiting on a gate.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Something that must be woken when a token is cancelled.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

/// A clonable cancellation signal.
///
/// All clones share one flag. Cancelling wakes every thread blocked in
/// [`AdmissionGate::acquire_cancellable`](super::AdmissionGate::acquire_cancellable)
/// and every future in
/// [`AdmissionGate::acquire_async`](super::AdmissionGate::acquire_async)
/// that was handed this token. Cancellation is permanent.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    watchers: Mutex<Vec<(u64, Weak<dyn Wake>)>>,
    next_id: AtomicU64,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake everything waiting on it.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.notify.notify_waiters();

        // Wake outside the watcher lock; waking takes the gate's state lock.
        let watchers: Vec<Arc<dyn Wake>> = self
            .inner
            .watchers
            .lock()
            .iter()
            .filter_map(|(_, watcher)| watcher.upgrade())
            .collect();
        for watcher in watchers {
            watcher.wake();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Complete once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Register a watcher for the lifetime of the returned guard.
    ///
    /// A watcher registered after the token was cancelled is never woken;
    /// callers must check [`is_cancelled`](Self::is_cancelled) after registering.
    pub(crate) fn register(&self, watcher: Weak<dyn Wake>) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.watchers.lock().push((id, watcher));
        Registration { token: self, id }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes a watcher from its token when dropped.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token
            .inner
            .watchers
            .lock()
            .retain(|(id, _)| *id != self.id);
    }
}
