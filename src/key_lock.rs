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


//! Per-key mutual exclusion.
//!
//! [`KeyedLock`] hands out one critical section per key. Sections are created
//! lazily on first use and kept for the lifetime of the lock map, so memory
//! grows with the number of distinct keys seen.
//!
//! Each section is a ticket lock: a caller draws a ticket on arrival and is
//! admitted once every earlier ticket has been served. Waiters on the same key
//! are therefore admitted strictly first-come-first-served, and callers on
//! different keys never touch each other's section.
//!
//! # Example
//!
//! ```
//! use point_wallet::KeyedLock;
//!
//! let locks = KeyedLock::new();
//! let total = locks.with_lock(1u64, || 40 + 2);
//! assert_eq!(total, 42);
//! assert_eq!(locks.len(), 1);
//! ```

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Tickets {
    /// Next ticket to hand out.
    next: u64,
    /// Ticket currently allowed into the section.
    serving: u64,
    /// Parked waiters in ticket order, each with its own wakeup.
    waiters: VecDeque<(u64, Arc<Condvar>)>,
}

/// FIFO lock with no payload.
///
/// A release wakes only the next ticket holder.
#[derive(Debug, Default)]
struct TicketLock {
    tickets: Mutex<Tickets>,
}

impl TicketLock {
    fn acquire(&self) {
        let mut tickets = self.tickets.lock();
        let ticket = tickets.next;
        tickets.next += 1;
        if tickets.serving == ticket {
            return;
        }

        let turn = Arc::new(Condvar::new());
        tickets.waiters.push_back((ticket, Arc::clone(&turn)));
        while tickets.serving != ticket {
            turn.wait(&mut tickets);
        }
    }

    fn release(&self) {
        let mut tickets = self.tickets.lock();
        debug_assert!(tickets.serving < tickets.next, "release without holder");
        tickets.serving += 1;

        let serving = tickets.serving;
        let next_waiter = match tickets.waiters.front() {
            Some((ticket, _)) if *ticket == serving => tickets.waiters.pop_front(),
            _ => None,
        };
        drop(tickets);

        if let Some((_, turn)) = next_waiter {
            turn.notify_one();
        }
    }

    /// Holder plus waiters.
    fn queued(&self) -> usize {
        let tickets = self.tickets.lock();
        (tickets.next - tickets.serving) as usize
    }
}

/// Map from key to its critical section.
pub struct KeyedLock<K> {
    sections: DashMap<K, Arc<TicketLock>>,
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            sections: DashMap::new(),
        }
    }

    /// Blocks until the section for `key` is free, then holds it until the
    /// returned guard is dropped.
    pub fn lock(&self, key: K) -> KeyGuard {
        let section = self.section(key);
        section.acquire();
        KeyGuard { section }
    }

    /// Runs `critical_section` while holding the section for `key`.
    ///
    /// The section is released on every exit path, including unwinding.
    pub fn with_lock<R, F>(&self, key: K, critical_section: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.lock(key);
        critical_section()
    }

    /// Number of sections created so far.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Callers holding or waiting for `key`. Zero for unseen keys.
    pub fn queued(&self, key: &K) -> usize {
        self.sections
            .get(key)
            .map(|section| section.queued())
            .unwrap_or(0)
    }

    fn section(&self, key: K) -> Arc<TicketLock> {
        if let Some(section) = self.sections.get(&key) {
            return Arc::clone(section.value());
        }
        // The shard guard is dropped before the caller blocks on the section.
        Arc::clone(self.sections.entry(key).or_default().value())
    }
}

impl<K> Default for KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> fmt::Debug for KeyedLock<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLock")
            .field("sections", &self.sections.len())
            .finish()
    }
}

/// Proof of holding a key's section. Releases it on drop.
#[must_use = "the section is released as soon as the guard is dropped"]
pub struct KeyGuard {
    section: Arc<TicketLock>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.section.release();
    }
}

impl fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard").finish_non_exhaustive()
    }
}
