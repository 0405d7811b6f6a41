// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Concurrency tests for the point service.
//!
//! These run many threads against one [`PointService`] and check that no
//! update is lost, that per-user sections never block other users, and that
//! contended workloads always finish. Section waiters park on condition
//! variables, so a stuck section shows up as a workload that never completes
//! rather than as a lock cycle.

use crossbeam::channel::{self, Receiver, Sender};
use point_wallet::{
    BalanceStore, InMemoryBalanceStore, InMemoryHistoryStore, KeyedLock, MAX_POINT_LIMIT,
    MIN_POINT_LIMIT, PointError, PointLimits, PointService, UserBalance, UserId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

// === Watchdog ===

const WORKLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `workload` on its own thread and panics if it has not finished
/// within `timeout`.
fn run_with_watchdog<F>(timeout: Duration, workload: F)
where
    F: FnOnce() + Send + 'static,
{
    let (done_tx, done_rx) = channel::bounded(1);
    let handle = thread::spawn(move || {
        workload();
        let _ = done_tx.send(());
    });

    match done_rx.recv_timeout(timeout) {
        Ok(()) => handle.join().expect("Thread panicked"),
        Err(channel::RecvTimeoutError::Disconnected) => {
            // Workload panicked before signalling.
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
        Err(channel::RecvTimeoutError::Timeout) => {
            panic!("workload did not finish within {timeout:?}; sections are stuck")
        }
    }
}

/// Balance must equal the sum of the user's history and lie within limits.
fn assert_consistent<B, H>(service: &PointService<B, H>, user: UserId)
where
    B: BalanceStore,
    H: point_wallet::HistoryStore,
{
    let balance = service.balance(user).point;
    let replayed: i64 = service.history(user).iter().map(|r| r.delta()).sum();
    assert_eq!(balance, replayed, "balance diverged from history for {user}");
    assert!((MIN_POINT_LIMIT..=MAX_POINT_LIMIT).contains(&balance));
}

// === Tests ===

/// Ten concurrent charges for each of two users lose no update.
#[test]
fn concurrent_charges_for_two_users() {
    let service = PointService::new();

    thread::scope(|scope| {
        for _ in 0..10 {
            scope.spawn(|| service.charge(UserId(1), 100).unwrap());
            scope.spawn(|| service.charge(UserId(2), 100).unwrap());
        }
    });

    for user in [UserId(1), UserId(2)] {
        assert_eq!(service.balance(user).point, 1_000);
        assert_eq!(service.history(user).len(), 10);
        assert_consistent(&service, user);
    }
}

/// Each user issues a chain of requests, waiting for each before the next.
#[test]
fn chained_requests_observe_previous_results() {
    let service = Arc::new(PointService::new());

    let chains: [(i64, &'static [(bool, i64)]); 2] = [
        (1, &[(true, 700), (false, 300), (false, 400), (true, 500), (false, 200)]),
        (2, &[(true, 500), (false, 300), (false, 200), (true, 600), (false, 400)]),
    ];

    let handles: Vec<_> = chains
        .iter()
        .map(|&(user, steps)| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for &(is_charge, amount) in steps {
                    let result = if is_charge {
                        service.charge(UserId(user), amount)
                    } else {
                        service.use_points(UserId(user), amount)
                    };
                    result.expect("chained request failed");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(service.balance(UserId(1)).point, 300);
    assert_eq!(service.balance(UserId(2)).point, 200);
    assert_eq!(service.history(UserId(1)).len(), 5);
    assert_eq!(service.history(UserId(2)).len(), 5);
}

/// Competing uses cannot overdraw: exactly as many succeed as the balance covers.
#[test]
fn competing_uses_never_overdraw() {
    let service = PointService::new();
    service.charge(UserId(1), 1_000).unwrap();
    let succeeded = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..20 {
            scope.spawn(|| match service.use_points(UserId(1), 100) {
                Ok(_) => succeeded.fetch_add(1, Ordering::SeqCst),
                Err(PointError::InsufficientBalance) => rejected.fetch_add(1, Ordering::SeqCst),
                Err(e) => panic!("unexpected error: {e}"),
            });
        }
    });

    assert_eq!(succeeded.load(Ordering::SeqCst), 10);
    assert_eq!(rejected.load(Ordering::SeqCst), 10);
    assert_eq!(service.balance(UserId(1)).point, 0);
    assert_eq!(service.history(UserId(1)).len(), 11);
}

/// Competing charges cannot push past the ceiling.
#[test]
fn competing_charges_never_exceed_ceiling() {
    let service = PointService::with_limits(PointLimits::with_max(1_000));

    thread::scope(|scope| {
        for _ in 0..30 {
            scope.spawn(|| {
                let _ = service.charge(UserId(1), 70);
            });
        }
    });

    // 14 * 70 = 980; a 15th charge would reach 1050.
    assert_eq!(service.balance(UserId(1)).point, 980);
    assert_eq!(service.history(UserId(1)).len(), 14);
}

/// High contention on a single user with many threads.
#[test]
fn no_deadlock_high_contention_single_user() {
    let service = Arc::new(PointService::new());

    const NUM_THREADS: usize = 50;
    const OPS_PER_THREAD: usize = 100;

    let workload_service = Arc::clone(&service);
    run_with_watchdog(WORKLOAD_TIMEOUT, move || {
        let mut handles = Vec::with_capacity(NUM_THREADS);

        for _ in 0..NUM_THREADS {
            let service = workload_service.clone();

            let handle = thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    if i % 3 == 0 {
                        let _ = service.charge(UserId(1), 10);
                    } else if i % 3 == 1 {
                        let _ = service.use_points(UserId(1), 3);
                    } else {
                        // Read operations
                        let _ = service.balance(UserId(1));
                        let _ = service.history(UserId(1));
                    }
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    });

    assert_consistent(&service, UserId(1));
}

/// Operations across many users.
#[test]
fn no_deadlock_cross_user_operations() {
    let service = Arc::new(PointService::new());

    const NUM_THREADS: usize = 20;
    const NUM_USERS: i64 = 10;
    const OPS_PER_THREAD: usize = 50;

    let workload_service = Arc::clone(&service);
    run_with_watchdog(WORKLOAD_TIMEOUT, move || {
        let mut handles = Vec::with_capacity(NUM_THREADS);

        for thread_id in 0..NUM_THREADS {
            let service = workload_service.clone();

            let handle = thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    // Each thread cycles through users
                    let user = ((thread_id + i) as i64 % NUM_USERS) + 1;

                    if i % 2 == 0 {
                        let _ = service.charge(UserId(user), 5);
                    } else {
                        let _ = service.use_points(UserId(user), 1);
                    }

                    // Also read a different user
                    let other = ((thread_id + i + 1) as i64 % NUM_USERS) + 1;
                    let _ = service.balance(UserId(other));
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    });

    for user in 1..=NUM_USERS {
        assert_consistent(&service, UserId(user));
    }
    assert_eq!(service.sections(), NUM_USERS as usize);
}

/// Two threads taking two keys in opposite order is a lock cycle the
/// watchdog must report instead of hanging.
#[test]
#[should_panic(expected = "did not finish")]
fn watchdog_reports_crossed_sections() {
    let locks = Arc::new(KeyedLock::new());

    let workload_locks = Arc::clone(&locks);
    run_with_watchdog(Duration::from_millis(500), move || {
        let crossed: Vec<_> = [(3u64, 4u64), (4, 3)]
            .into_iter()
            .map(|(first, second)| {
                let locks = Arc::clone(&workload_locks);
                thread::spawn(move || {
                    let _first = locks.lock(first);
                    // Both threads hold their first key before either asks for the second.
                    while locks.queued(&second) == 0 {
                        thread::yield_now();
                    }
                    let _second = locks.lock(second);
                })
            })
            .collect();
        for handle in crossed {
            let _ = handle.join();
        }
    });
}

/// A single section held by the test itself is reported as stuck, and the
/// workload completes once the section is released during unwinding.
#[test]
#[should_panic(expected = "did not finish")]
fn watchdog_reports_held_section() {
    let locks = Arc::new(KeyedLock::new());
    let _held = locks.lock(1u64);

    let workload_locks = Arc::clone(&locks);
    run_with_watchdog(Duration::from_millis(200), move || {
        workload_locks.with_lock(1u64, || ());
    });
}

// === Cross-user independence ===

/// Balance store that parks the first read of one user until released.
struct GatedBalanceStore {
    inner: InMemoryBalanceStore,
    gated: UserId,
    armed: AtomicBool,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl BalanceStore for GatedBalanceStore {
    fn select(&self, user_id: UserId) -> UserBalance {
        if user_id == self.gated && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
        }
        self.inner.select(user_id)
    }

    fn upsert(&self, user_id: UserId, point: i64, update_millis: i64) -> UserBalance {
        self.inner.upsert(user_id, point, update_millis)
    }
}

/// A user stalled inside its section does not hold up another user.
#[test]
fn stalled_user_does_not_block_others() {
    let (entered_tx, entered_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded(1);
    let store = GatedBalanceStore {
        inner: InMemoryBalanceStore::new(),
        gated: UserId(1),
        armed: AtomicBool::new(true),
        entered: entered_tx,
        release: release_rx,
    };
    let service = Arc::new(PointService::with_stores(
        store,
        InMemoryHistoryStore::new(),
        PointLimits::default(),
    ));

    let stalled = {
        let service = Arc::clone(&service);
        thread::spawn(move || service.charge(UserId(1), 100))
    };
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("user 1 never entered its section");

    let (done_tx, done_rx) = channel::bounded(1);
    let other = {
        let service = Arc::clone(&service);
        thread::spawn(move || done_tx.send(service.charge(UserId(2), 100)).unwrap())
    };
    let result = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("user 2 blocked behind user 1");
    assert_eq!(result.unwrap().point, 100);
    assert_eq!(service.history(UserId(1)).len(), 0);

    release_tx.send(()).unwrap();
    assert_eq!(stalled.join().unwrap().unwrap().point, 100);
    other.join().unwrap();
    assert_eq!(service.history(UserId(1)).len(), 1);
}
