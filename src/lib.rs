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


//! # Point Wallet
//!
//! This library keeps a per-user point balance with charge (credit) and use
//! (debit) operations. Every committed operation is validated against a floor
//! and a ceiling and recorded as an immutable history entry.
//!
//! ## Core Components
//!
//! - [`PointService`]: Orchestrates charge, use, balance and history lookups
//! - [`KeyedLock`]: Per-user critical sections with first-come-first-served admission
//! - [`PointLimits`]: Pure charge/use rules enforcing `MIN_POINT_LIMIT..=MAX_POINT_LIMIT`
//! - [`BalanceStore`] / [`HistoryStore`]: Storage seams with in-memory implementations
//! - [`PointError`]: Validation failures
//!
//! ## Example
//!
//! ```
//! use point_wallet::{PointError, PointService, TransactionType, UserId};
//!
//! let service = PointService::new();
//!
//! service.charge(UserId(1), 200).unwrap();
//! let balance = service.use_points(UserId(1), 50).unwrap();
//! assert_eq!(balance.point, 150);
//!
//! assert_eq!(service.use_points(UserId(1), 500), Err(PointError::InsufficientBalance));
//!
//! let history = service.history(UserId(1));
//! assert_eq!(history.len(), 2);
//! assert_eq!(history[0].kind, TransactionType::Charge);
//! ```
//!
//! ## Thread Safety
//!
//! Charge and use for the same user are applied one at a time in arrival
//! order, while requests for different users proceed in parallel.

mod base;
pub mod error;
mod history;
pub mod http;
mod key_lock;
pub mod point;
mod service;
pub mod store;

pub use base::{HistoryId, UserId};
pub use error::PointError;
pub use history::{TransactionRecord, TransactionType, UnknownTransactionType};
pub use key_lock::{KeyGuard, KeyedLock};
pub use point::{MAX_POINT_LIMIT, MIN_POINT_LIMIT, PointLimits, UserBalance};
pub use service::PointService;
pub use store::{BalanceStore, HistoryStore, InMemoryBalanceStore, InMemoryHistoryStore};
