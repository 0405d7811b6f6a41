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


//! Point history records.
//!
//! One [`TransactionRecord`] is written for every committed charge or use and
//! never changes afterwards.

use crate::base::{HistoryId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Charge,
    Use,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charge => f.write_str("CHARGE"),
            Self::Use => f.write_str("USE"),
        }
    }
}

/// Error returned when parsing an unknown transaction type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "charge" => Ok(Self::Charge),
            "use" => Ok(Self::Use),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

/// Audit entry for one committed charge or use.
///
/// `amount` is the requested magnitude; the direction is carried by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: HistoryId,
    pub user_id: UserId,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub time_millis: i64,
}

impl TransactionRecord {
    /// Signed effect on the balance.
    pub fn delta(&self) -> i64 {
        match self.kind {
            TransactionType::Charge => self.amount,
            TransactionType::Use => -self.amount,
        }
    }
}
