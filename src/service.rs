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


//! Point wallet service.
//!
//! [`PointService`] is the entry point for the four wallet operations:
//! balance lookup, history lookup, charge and use.
//!
//! # Consistency
//!
//! Charge and use run inside the user's critical section (see
//! [`KeyedLock`]): read the balance, validate, append the history record,
//! store the new balance. A rejected request leaves both stores untouched.
//! Requests for different users never share a section.
//!
//! Reads do not take the section. A reader may see a balance that an
//! in-flight writer is about to replace.

use crate::PointError;
use crate::base::UserId;
use crate::history::{TransactionRecord, TransactionType};
use crate::key_lock::KeyedLock;
use crate::point::{PointLimits, UserBalance};
use crate::store::{BalanceStore, HistoryStore, InMemoryBalanceStore, InMemoryHistoryStore};
use tracing::{debug, warn};

/// Serializes charge/use per user on top of a balance and a history store.
///
/// # Invariants
///
/// - Every committed balance lies within the service's [`PointLimits`].
/// - Exactly one history record exists per committed charge or use.
/// - A user's `update_millis` never goes backwards.
pub struct PointService<B = InMemoryBalanceStore, H = InMemoryHistoryStore> {
    balances: B,
    histories: H,
    /// One section per user seen by a write.
    locks: KeyedLock<UserId>,
    limits: PointLimits,
}

impl PointService {
    /// In-memory service with the default limits.
    pub fn new() -> Self {
        Self::with_limits(PointLimits::default())
    }

    /// In-memory service with custom limits.
    pub fn with_limits(limits: PointLimits) -> Self {
        Self::with_stores(
            InMemoryBalanceStore::new(),
            InMemoryHistoryStore::new(),
            limits,
        )
    }
}

impl Default for PointService {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, H> PointService<B, H>
where
    B: BalanceStore,
    H: HistoryStore,
{
    pub fn with_stores(balances: B, histories: H, limits: PointLimits) -> Self {
        Self {
            balances,
            histories,
            locks: KeyedLock::new(),
            limits,
        }
    }

    /// Current balance, or a zero balance for a user who never transacted.
    pub fn balance(&self, user_id: UserId) -> UserBalance {
        self.balances.select(user_id)
    }

    /// Committed charges and uses of `user_id`, oldest first.
    pub fn history(&self, user_id: UserId) -> Vec<TransactionRecord> {
        self.histories.select_by_user(user_id)
    }

    /// Credits `amount` points to `user_id`.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidAmount`] - `amount` is negative.
    /// - [`PointError::LimitExceeded`] - the balance would exceed the ceiling.
    pub fn charge(&self, user_id: UserId, amount: i64) -> Result<UserBalance, PointError> {
        self.apply(user_id, TransactionType::Charge, amount)
    }

    /// Debits `amount` points from `user_id`.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidAmount`] - `amount` is negative.
    /// - [`PointError::InsufficientBalance`] - the balance would drop below the floor.
    pub fn use_points(&self, user_id: UserId, amount: i64) -> Result<UserBalance, PointError> {
        self.apply(user_id, TransactionType::Use, amount)
    }

    /// Applies a charge or use of `amount` to `user_id`.
    ///
    /// Blocks until every earlier request for the same user has finished.
    pub fn apply(
        &self,
        user_id: UserId,
        kind: TransactionType,
        amount: i64,
    ) -> Result<UserBalance, PointError> {
        self.locks.with_lock(user_id, || {
            let current = self.balances.select(user_id);
            let now = now_millis().max(current.update_millis);

            let next = match kind {
                TransactionType::Charge => current.charged(amount, &self.limits, now),
                TransactionType::Use => current.used(amount, &self.limits, now),
            };
            let next = match next {
                Ok(next) => next,
                Err(err) => {
                    warn!(user = %user_id, amount, %kind, point = current.point, error = %err, "point request rejected");
                    return Err(err);
                }
            };

            let record = self.histories.insert(user_id, amount, kind, now);
            let stored = self.balances.upsert(user_id, next.point, next.update_millis);
            debug!(user = %user_id, amount, %kind, history_id = %record.id, point = stored.point, "point request committed");
            Ok(stored)
        })
    }

    pub fn limits(&self) -> PointLimits {
        self.limits
    }

    pub fn balances(&self) -> &B {
        &self.balances
    }

    pub fn histories(&self) -> &H {
        &self.histories
    }

    /// Number of per-user sections created so far.
    pub fn sections(&self) -> usize {
        self.locks.len()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
