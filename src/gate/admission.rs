//! Blocking fixed-window admission gate.

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::cancel::{CancelToken, Wake};
use super::window::{TimeUnit, WindowState};
use crate::error::GateError;

/// Bounds how many callers are admitted per fixed time window.
///
/// Callers invoke one of the `acquire` methods immediately before each unit of
/// rate-limited work. At most `capacity` callers are admitted per window;
/// callers beyond that wait until a later window opens.
///
/// Windows roll over lazily. A new window opens only when some caller
/// (arriving or already waiting) observes that the current one has ended, so
/// after an idle period the next caller is admitted at once into a fresh,
/// fully replenished window. There is no background timer.
///
/// Waiting callers are admitted in arrival order. A caller that arrives while
/// others wait is admitted directly only if permits remain after every waiter
/// has been served.
///
/// The gate is a handle: clones share the same window state.
#[derive(Clone)]
pub struct AdmissionGate {
    shared: Arc<Shared>,
}

struct Shared {
    /// Window bookkeeping; the only shared mutable state
    state: Mutex<WindowState>,
    /// Wakes blocked threads
    condvar: Condvar,
    /// Wakes pending async waiters
    notify: Notify,
    window: Duration,
    capacity: u32,
}

impl Shared {
    /// Wake every waiter so it re-checks its eligibility.
    fn wake_all(&self) {
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }
}

impl Wake for Shared {
    fn wake(&self) {
        // Taking the lock orders the wakeup after any in-progress flag check.
        let _state = self.state.lock();
        self.wake_all();
    }
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` callers per `window`.
    pub fn new(window: Duration, capacity: u32) -> Result<Self, GateError> {
        if window.is_zero() {
            return Err(GateError::InvalidConfiguration(
                "window duration must be positive".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(GateError::InvalidConfiguration(
                "capacity must be positive".to_string(),
            ));
        }
        let now = Instant::now();
        if now.checked_add(window).is_none() {
            return Err(GateError::InvalidConfiguration(format!(
                "window duration {:?} is too large",
                window
            )));
        }

        debug!(window = ?window, capacity = capacity, "Creating admission gate");

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(WindowState::new(window, capacity, now)),
                condvar: Condvar::new(),
                notify: Notify::new(),
                window,
                capacity,
            }),
        })
    }

    /// Create a gate admitting at most `capacity` callers per one `unit` of time.
    pub fn per_unit(unit: TimeUnit, capacity: u32) -> Result<Self, GateError> {
        Self::new(unit.duration(), capacity)
    }

    /// Maximum admissions per window.
    pub fn capacity(&self) -> u32 {
        self.shared.capacity
    }

    /// Length of each window.
    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// Snapshot of the permits a caller could take right now.
    pub fn remaining(&self) -> u32 {
        self.shared.state.lock().remaining_at(Instant::now())
    }

    /// Number of callers currently waiting for a permit.
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting()
    }

    /// Take a permit if one is available without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.shared.state.lock();
        self.refresh(&mut state, Instant::now());
        let admitted = state.try_take();
        if admitted {
            trace!("Admitted without waiting");
        }
        admitted
    }

    /// Block the calling thread until a permit is granted.
    pub fn acquire(&self) -> Result<(), GateError> {
        self.acquire_blocking(None, None)
    }

    /// Block until a permit is granted or `timeout` elapses.
    ///
    /// Expiry fails with [`GateError::Cancelled`] and consumes no permit. A
    /// timeout too large to represent as a deadline waits without one.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), GateError> {
        self.acquire_blocking(Instant::now().checked_add(timeout), None)
    }

    /// Block until a permit is granted or `deadline` passes.
    ///
    /// A deadline already in the past still admits the caller if a permit is
    /// free; it only bounds waiting.
    pub fn acquire_until(&self, deadline: Instant) -> Result<(), GateError> {
        self.acquire_blocking(Some(deadline), None)
    }

    /// Block until a permit is granted or `token` is cancelled.
    ///
    /// A token that is already cancelled fails immediately, even if a permit
    /// is available.
    pub fn acquire_cancellable(&self, token: &CancelToken) -> Result<(), GateError> {
        self.acquire_blocking(None, Some(token))
    }

    /// Wait asynchronously until a permit is granted or `token` is cancelled.
    ///
    /// Dropping the returned future before it completes withdraws the caller
    /// from the queue without consuming a permit.
    pub async fn acquire_async(&self, token: &CancelToken) -> Result<(), GateError> {
        let mut waiter = QueuedWaiter {
            shared: &self.shared,
            ticket: None,
        };

        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let window_end = {
                let mut state = self.shared.state.lock();

                if token.is_cancelled() {
                    if let Some(ticket) = waiter.ticket.take() {
                        self.withdraw(&mut state, ticket);
                    }
                    return Err(GateError::Cancelled);
                }

                self.refresh(&mut state, Instant::now());

                let ticket = waiter.ticket;
                match ticket {
                    None if state.try_take() => {
                        trace!("Admitted without waiting");
                        return Ok(());
                    }
                    None => {
                        waiter.ticket = Some(state.enqueue());
                        debug!(waiting = state.waiting(), "Gate exhausted, waiting for a permit");
                    }
                    Some(ticket) if state.try_take_queued(ticket) => {
                        waiter.ticket = None;
                        trace!(ticket = ticket, "Admitted after waiting");
                        return Ok(());
                    }
                    Some(_) => {}
                }

                state.window_end()
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(window_end)) => {}
                _ = token.cancelled() => {}
            }
        }
    }

    fn acquire_blocking(
        &self,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<(), GateError> {
        let watcher: Weak<dyn Wake> = Arc::downgrade(&self.shared) as Weak<dyn Wake>;
        // Declared before the state guard so it is dropped after the lock is released.
        let _registration = token.map(|token| token.register(watcher));
        let is_cancelled = || token.is_some_and(CancelToken::is_cancelled);

        let mut state = self.shared.state.lock();
        if is_cancelled() {
            return Err(GateError::Cancelled);
        }

        self.refresh(&mut state, Instant::now());
        if state.try_take() {
            trace!("Admitted without waiting");
            return Ok(());
        }

        let ticket = state.enqueue();
        debug!(waiting = state.waiting(), "Gate exhausted, waiting for a permit");

        loop {
            let now = Instant::now();
            if is_cancelled() || deadline.is_some_and(|deadline| now >= deadline) {
                self.withdraw(&mut state, ticket);
                return Err(GateError::Cancelled);
            }

            self.refresh(&mut state, now);
            if state.try_take_queued(ticket) {
                trace!(ticket = ticket, "Admitted after waiting");
                return Ok(());
            }

            let wake_at = match deadline {
                Some(deadline) => deadline.min(state.window_end()),
                None => state.window_end(),
            };
            self.shared.condvar.wait_until(&mut state, wake_at);
        }
    }

    /// Roll the window over if it has lapsed, waking waiters on reset.
    fn refresh(&self, state: &mut WindowState, now: Instant) {
        if state.refresh(now) {
            debug!(
                capacity = self.shared.capacity,
                waiting = state.waiting(),
                "Window lapsed, permits replenished"
            );
            if state.waiting() > 0 {
                self.shared.wake_all();
            }
        }
    }

    /// Remove a waiter without consuming a permit.
    fn withdraw(&self, state: &mut WindowState, ticket: u64) {
        if state.dequeue(ticket) {
            debug!(ticket = ticket, "Admission wait cancelled");
            // Waiters behind this one moved forward and may now be eligible.
            self.shared.wake_all();
        }
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("window", &self.shared.window)
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Withdraws an async waiter from the queue if its future is dropped mid-wait.
struct QueuedWaiter<'a> {
    shared: &'a Arc<Shared>,
    ticket: Option<u64>,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let mut state = self.shared.state.lock();
            if state.dequeue(ticket) {
                debug!(ticket = ticket, "Admission wait abandoned");
                self.shared.wake_all();
            }
        }
    }
}
