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


//! Error types for point operations.

use thiserror::Error;

/// Validation failures raised by charge and use.
///
/// All variants are caller input errors. None of them is ever partially
/// applied and none of them is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointError {
    /// Requested magnitude is negative
    #[error("invalid amount (must not be negative)")]
    InvalidAmount,

    /// Charge would push the balance above the ceiling
    #[error("point limit exceeded")]
    LimitExceeded,

    /// Use would push the balance below the floor
    #[error("insufficient point balance")]
    InsufficientBalance,
}

impl PointError {
    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            PointError::InvalidAmount => "INVALID_AMOUNT",
            PointError::LimitExceeded => "LIMIT_EXCEEDED",
            PointError::InsufficientBalance => "INSUFFICIENT_BALANCE",
        }
    }
}
