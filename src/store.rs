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


//! Balance and history storage.
//!
//! The service only talks to the [`BalanceStore`] and [`HistoryStore`] traits.
//! The in-memory implementations keep everything in [`DashMap`]s; nothing
//! survives a restart.

use crate::base::{HistoryId, UserId};
use crate::history::{TransactionRecord, TransactionType};
use crate::point::UserBalance;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-read / point-write access to current balances.
pub trait BalanceStore: Send + Sync {
    /// Current balance of `user_id`, or [`UserBalance::empty`] if unknown.
    fn select(&self, user_id: UserId) -> UserBalance;

    /// Stores `point` as the balance of `user_id` and returns the stored value.
    fn upsert(&self, user_id: UserId, point: i64, update_millis: i64) -> UserBalance;
}

/// Append-only, per-user ordered history.
pub trait HistoryStore: Send + Sync {
    /// Appends a record and returns it with its assigned id.
    fn insert(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        time_millis: i64,
    ) -> TransactionRecord;

    /// All records of `user_id` in insertion order.
    fn select_by_user(&self, user_id: UserId) -> Vec<TransactionRecord>;
}

impl<T: BalanceStore + ?Sized> BalanceStore for Arc<T> {
    fn select(&self, user_id: UserId) -> UserBalance {
        (**self).select(user_id)
    }

    fn upsert(&self, user_id: UserId, point: i64, update_millis: i64) -> UserBalance {
        (**self).upsert(user_id, point, update_millis)
    }
}

impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    fn insert(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        time_millis: i64,
    ) -> TransactionRecord {
        (**self).insert(user_id, amount, kind, time_millis)
    }

    fn select_by_user(&self, user_id: UserId) -> Vec<TransactionRecord> {
        (**self).select_by_user(user_id)
    }
}

/// Balances indexed by user.
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    balances: DashMap<UserId, UserBalance>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored balance, ordered by user id.
    pub fn snapshot(&self) -> Vec<UserBalance> {
        let mut balances: Vec<UserBalance> = self.balances.iter().map(|r| *r.value()).collect();
        balances.sort_by_key(|balance| balance.id);
        balances
    }

    /// Number of users with a stored balance.
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn select(&self, user_id: UserId) -> UserBalance {
        self.balances
            .get(&user_id)
            .map(|r| *r.value())
            .unwrap_or_else(|| UserBalance::empty(user_id))
    }

    fn upsert(&self, user_id: UserId, point: i64, update_millis: i64) -> UserBalance {
        let balance = UserBalance {
            id: user_id,
            point,
            update_millis,
        };
        self.balances.insert(user_id, balance);
        balance
    }
}

/// Per-user history vectors with a store-wide id sequence.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    /// Records of each user, in insertion order.
    records: DashMap<UserId, Vec<TransactionRecord>>,

    /// Next id to hand out. Starts at 1.
    next_id: AtomicU64,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Total number of records across all users.
    pub fn len(&self) -> usize {
        self.records.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn insert(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        time_millis: i64,
    ) -> TransactionRecord {
        // Id is drawn while the user's shard is held so ids follow vector order.
        let mut records = self.records.entry(user_id).or_default();
        let record = TransactionRecord {
            id: HistoryId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            user_id,
            amount,
            kind,
            time_millis,
        };
        records.push(record.clone());
        record
    }

    fn select_by_user(&self, user_id: UserId) -> Vec<TransactionRecord> {
        self.records
            .get(&user_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }
}
