//! Timing and contention tests for the admission gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crpt_api::error::GateError;
use crpt_api::gate::{AdmissionGate, CancelToken};

/// Slack allowed for work that should not block.
const PROMPT: Duration = Duration::from_millis(100);

#[test]
fn test_burst_then_wait_then_fresh_window() {
    let window = Duration::from_millis(400);
    let gate = AdmissionGate::new(window, 5).unwrap();

    let t0 = Instant::now();
    for _ in 0..5 {
        gate.acquire().unwrap();
    }
    assert!(t0.elapsed() < PROMPT);

    // The 6th caller waits for the window to lapse and opens the next one.
    gate.acquire().unwrap();
    let reopened = Instant::now();
    assert!(reopened - t0 >= window);

    // It consumed one of the five fresh permits; four remain.
    for _ in 0..4 {
        gate.acquire().unwrap();
    }
    assert!(reopened.elapsed() < PROMPT);

    assert_eq!(
        gate.acquire_timeout(Duration::from_millis(50)),
        Err(GateError::Cancelled)
    );
}

#[test]
fn test_at_most_capacity_per_window_under_contention() {
    const CAPACITY: usize = 3;
    const CALLERS: usize = CAPACITY * 4;
    let window = Duration::from_millis(150);

    let gate = AdmissionGate::new(window, CAPACITY as u32).unwrap();
    let t0 = Instant::now();

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let gate = gate.clone();
            thread::spawn(move || {
                gate.acquire().unwrap();
                Instant::now()
            })
        })
        .collect();
    let mut grants: Vec<Instant> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    grants.sort();

    // Window k opens no earlier than t0 + k * window, so anything recorded
    // before t0 + (k + 1) * window was granted in windows 0..=k.
    for k in 0..4u32 {
        let cutoff = t0 + window * (k + 1);
        let granted = grants.iter().filter(|&&g| g < cutoff).count();
        assert!(
            granted <= CAPACITY * (k as usize + 1),
            "{} grants before the end of window {}",
            granted,
            k
        );
    }

    // Four full windows are needed, so the last grant is at least three windows in.
    assert_eq!(grants.len(), CALLERS);
    assert!(grants[CALLERS - 1] - t0 >= window * 3);
    assert_eq!(gate.waiting(), 0);
}

#[test]
fn test_boundary_race_resets_once() {
    const CAPACITY: u32 = 4;
    const THREADS: usize = 32;
    let window = Duration::from_millis(300);

    let gate = AdmissionGate::new(window, CAPACITY).unwrap();
    for _ in 0..CAPACITY {
        gate.acquire().unwrap();
    }
    let boundary = Instant::now() + window + Duration::from_millis(10);

    let barrier = Arc::new(Barrier::new(THREADS));
    let admitted = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let gate = gate.clone();
            let barrier = barrier.clone();
            let admitted = admitted.clone();
            thread::spawn(move || {
                thread::sleep(boundary.saturating_duration_since(Instant::now()));
                barrier.wait();
                if gate.try_acquire() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(admitted.load(Ordering::SeqCst), CAPACITY as usize);
}

#[test]
fn test_acquire_until_expires_without_consuming() {
    let window = Duration::from_millis(300);
    let gate = AdmissionGate::new(window, 2).unwrap();
    gate.acquire().unwrap();
    gate.acquire().unwrap();

    let deadline = Instant::now() + Duration::from_millis(50);
    assert_eq!(gate.acquire_until(deadline), Err(GateError::Cancelled));
    assert_eq!(gate.waiting(), 0);
    assert_eq!(gate.remaining(), 0);

    // The next window still holds its full capacity.
    gate.acquire_until(Instant::now() + window * 2).unwrap();
    assert_eq!(gate.remaining(), 1);
}

#[test]
fn test_idle_gap_grants_fresh_window() {
    let window = Duration::from_millis(100);
    let gate = AdmissionGate::new(window, 3).unwrap();
    for _ in 0..3 {
        gate.acquire().unwrap();
    }

    thread::sleep(window * 3);
    assert_eq!(gate.remaining(), 3);

    let start = Instant::now();
    for _ in 0..3 {
        gate.acquire().unwrap();
    }
    assert!(start.elapsed() < PROMPT);
}

#[test]
fn test_cancelled_waiter_does_not_hold_back_others() {
    let window = Duration::from_millis(200);
    let gate = AdmissionGate::new(window, 1).unwrap();
    let start = Instant::now();
    gate.acquire().unwrap();

    let token = CancelToken::new();
    let cancelled = {
        let gate = gate.clone();
        let token = token.clone();
        thread::spawn(move || gate.acquire_cancellable(&token))
    };
    while gate.waiting() < 1 {
        thread::sleep(Duration::from_millis(1));
    }

    let patient = {
        let gate = gate.clone();
        thread::spawn(move || gate.acquire())
    };
    while gate.waiting() < 2 {
        thread::sleep(Duration::from_millis(1));
    }

    token.cancel();
    assert_eq!(cancelled.join().unwrap(), Err(GateError::Cancelled));

    // The head of the queue left; the second waiter takes the next window's permit.
    patient.join().unwrap().unwrap();
    assert!(start.elapsed() >= window);
    assert!(start.elapsed() < window * 2);
    assert_eq!(gate.remaining(), 0);
}

#[test]
fn test_every_waiter_is_eventually_admitted() {
    const WAITERS: usize = 6;
    let window = Duration::from_millis(50);
    let gate = AdmissionGate::new(window, 1).unwrap();

    let handles: Vec<_> = (0..WAITERS)
        .map(|_| {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire_timeout(Duration::from_secs(5)))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(()));
    }
    assert_eq!(gate.waiting(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_threads_and_tasks_share_one_limit() {
    let window = Duration::from_millis(200);
    let gate = AdmissionGate::new(window, 2).unwrap();
    let token = CancelToken::new();

    gate.acquire_async(&token).await.unwrap();
    {
        let gate = gate.clone();
        tokio::task::spawn_blocking(move || gate.acquire())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(gate.remaining(), 0);

    let start = Instant::now();
    let blocked = {
        let gate = gate.clone();
        tokio::task::spawn_blocking(move || gate.acquire())
    };
    gate.acquire_async(&token).await.unwrap();
    blocked.await.unwrap().unwrap();

    // Both waiters fit in the second window.
    assert!(start.elapsed() < window + PROMPT);
    assert_eq!(gate.remaining(), 0);
}
