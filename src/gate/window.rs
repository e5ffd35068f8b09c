//! Fixed-window permit bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Time unit used to express a window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// Window and permit state of a gate.
///
/// Not synchronized on its own; the gate keeps it behind a single mutex so
/// that window detection, replenishment and permit consumption are serialized.
///
/// Queued waiters are identified by tickets and are offered permits in
/// arrival order: the waiter at queue position `p` may take a permit only
/// while `p < remaining`.
#[derive(Debug)]
pub(crate) struct WindowState {
    /// Length of every window
    window: Duration,
    /// Permits granted per window
    capacity: u32,
    /// When the current window's permits lapse
    window_end: Instant,
    /// Unused permits in the current window
    remaining: u32,
    /// Tickets of waiting callers, oldest first
    queue: VecDeque<u64>,
    /// Next ticket to hand out
    next_ticket: u64,
}

impl WindowState {
    /// Create state whose first window opens on the first refresh at or after `now`.
    pub(crate) fn new(window: Duration, capacity: u32, now: Instant) -> Self {
        Self {
            window,
            capacity,
            window_end: now,
            remaining: capacity,
            queue: VecDeque::new(),
            next_ticket: 0,
        }
    }

    /// Open a fresh window if the current one has lapsed.
    ///
    /// The reset is a full replenishment: `remaining` is set to `capacity`
    /// regardless of what was left over. Returns `true` if a reset happened.
    pub(crate) fn refresh(&mut self, now: Instant) -> bool {
        if now < self.window_end {
            return false;
        }

        self.window_end = window_end_after(now, self.window);
        self.remaining = self.capacity;
        true
    }

    /// Take a permit on behalf of a caller that is not queued.
    ///
    /// Succeeds only if there are permits left over after every queued waiter
    /// has been served.
    pub(crate) fn try_take(&mut self) -> bool {
        if self.remaining as usize > self.queue.len() {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Add a waiter to the back of the queue and return its ticket.
    pub(crate) fn enqueue(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.queue.push_back(ticket);
        ticket
    }

    /// Take a permit on behalf of a queued waiter.
    ///
    /// On success the ticket leaves the queue.
    pub(crate) fn try_take_queued(&mut self, ticket: u64) -> bool {
        let Some(position) = self.queue.iter().position(|&t| t == ticket) else {
            return false;
        };

        if position < self.remaining as usize {
            self.queue.remove(position);
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Remove a waiter without granting it a permit.
    pub(crate) fn dequeue(&mut self, ticket: u64) -> bool {
        match self.queue.iter().position(|&t| t == ticket) {
            Some(position) => {
                self.queue.remove(position);
                true
            }
            None => false,
        }
    }

    pub(crate) fn window_end(&self) -> Instant {
        self.window_end
    }

    /// Permits available at `now`, counting a lapsed window as fully replenished.
    pub(crate) fn remaining_at(&self, now: Instant) -> u32 {
        if now >= self.window_end {
            self.capacity
        } else {
            self.remaining
        }
    }

    pub(crate) fn waiting(&self) -> usize {
        self.queue.len()
    }
}

/// End of a window opened at `now`, clamped to the latest representable instant.
pub(crate) fn window_end_after(now: Instant, window: Duration) -> Instant {
    if let Some(end) = now.checked_add(window) {
        return end;
    }

    let mut step = window;
    loop {
        step /= 2;
        if let Some(end) = now.checked_add(step) {
            return end;
        }
    }
}
