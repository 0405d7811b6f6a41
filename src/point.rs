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


//! Point balance rules.
//!
//! Charge and use are pure functions over the current point value: they
//! validate the request against [`PointLimits`] and return the new value
//! without touching any store.
//!
//! # Example
//!
//! ```
//! use point_wallet::{PointError, PointLimits, UserBalance, UserId};
//!
//! let limits = PointLimits::default();
//! let balance = UserBalance::empty(UserId(1));
//! let balance = balance.charged(300, &limits, 0).unwrap();
//! assert_eq!(balance.point, 300);
//! assert_eq!(balance.used(500, &limits, 0), Err(PointError::InsufficientBalance));
//! ```

use crate::PointError;
use crate::base::UserId;
use serde::{Deserialize, Serialize};

/// Largest balance a wallet may hold after a charge.
pub const MAX_POINT_LIMIT: i64 = 10_000;

/// Smallest balance a wallet may hold after a use.
pub const MIN_POINT_LIMIT: i64 = 0;

/// Floor and ceiling enforced on every committed balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointLimits {
    pub min: i64,
    pub max: i64,
}

impl PointLimits {
    pub const fn new(min: i64, max: i64) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    /// Default floor with a custom ceiling.
    pub const fn with_max(max: i64) -> Self {
        Self::new(MIN_POINT_LIMIT, max)
    }

    /// Returns `true` if `point` lies within `[min, max]`.
    pub fn contains(&self, point: i64) -> bool {
        (self.min..=self.max).contains(&point)
    }

    /// Computes the balance after crediting `amount`.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidAmount`] if `amount` is negative.
    /// - [`PointError::LimitExceeded`] if the result would exceed `max`.
    pub fn charge(&self, current: i64, amount: i64) -> Result<i64, PointError> {
        if amount < 0 {
            return Err(PointError::InvalidAmount);
        }
        let next = current
            .checked_add(amount)
            .ok_or(PointError::LimitExceeded)?;
        if next > self.max {
            return Err(PointError::LimitExceeded);
        }
        Ok(next)
    }

    /// Computes the balance after debiting `amount`.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidAmount`] if `amount` is negative.
    /// - [`PointError::InsufficientBalance`] if the result would drop below `min`.
    pub fn use_points(&self, current: i64, amount: i64) -> Result<i64, PointError> {
        if amount < 0 {
            return Err(PointError::InvalidAmount);
        }
        let next = current
            .checked_sub(amount)
            .ok_or(PointError::InsufficientBalance)?;
        if next < self.min {
            return Err(PointError::InsufficientBalance);
        }
        Ok(next)
    }
}

impl Default for PointLimits {
    fn default() -> Self {
        Self::new(MIN_POINT_LIMIT, MAX_POINT_LIMIT)
    }
}

/// [`PointLimits::charge`] with the default limits.
pub fn charge(current: i64, amount: i64) -> Result<i64, PointError> {
    PointLimits::default().charge(current, amount)
}

/// [`PointLimits::use_points`] with the default limits.
pub fn use_points(current: i64, amount: i64) -> Result<i64, PointError> {
    PointLimits::default().use_points(current, amount)
}

/// Current point balance of a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub id: UserId,
    pub point: i64,
    pub update_millis: i64,
}

impl UserBalance {
    /// Balance of a user who has never transacted.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            point: 0,
            update_millis: 0,
        }
    }

    /// Returns a new balance credited by `amount`, stamped with `now_millis`.
    pub fn charged(
        &self,
        amount: i64,
        limits: &PointLimits,
        now_millis: i64,
    ) -> Result<UserBalance, PointError> {
        let point = limits.charge(self.point, amount)?;
        debug_assert!(point <= limits.max, "Invariant violated: point {} above ceiling", point);
        Ok(self.with_point(point, now_millis))
    }

    /// Returns a new balance debited by `amount`, stamped with `now_millis`.
    pub fn used(
        &self,
        amount: i64,
        limits: &PointLimits,
        now_millis: i64,
    ) -> Result<UserBalance, PointError> {
        let point = limits.use_points(self.point, amount)?;
        debug_assert!(limits.contains(point), "Invariant violated: point {} outside limits", point);
        Ok(self.with_point(point, now_millis))
    }

    fn with_point(&self, point: i64, now_millis: i64) -> UserBalance {
        UserBalance {
            id: self.id,
            point,
            update_millis: now_millis,
        }
    }
}
