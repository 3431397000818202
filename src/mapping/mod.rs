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

//! Account mapping: from a free-form transaction to a ranked debit/credit pair.
//!
//! - [`TransactionAnalyzer`] classifies the transaction into a category and
//!   derives the account type each role should have.
//! - [`MappingEngine`] ranks the chart's accounts for each role using
//!   pattern matches, learned history and amount ranges.
//! - [`roles`] decides whether an account may take the side it was given.
//! - [`oracle`] wraps an optional external suggestion service.

pub mod analyzer;
pub mod engine;
pub mod history;
pub mod oracle;
pub mod roles;

use crate::account::{Account, AccountSubtype, AccountType};
use crate::base::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use analyzer::{TransactionAnalysis, TransactionAnalyzer, TransactionCategory};
pub use engine::MappingEngine;
pub use history::{AmountRange, HistoryState, MappingHistory};
pub use oracle::{OracleMapper, OracleSuggestion, SuggestionOracle};
pub use roles::{RoleCheck, RoleException, check_role};

/// Upper bound of every confidence score.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Clamps a score into `[0, MAX_CONFIDENCE]`. NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_CONFIDENCE)
}

/// Canonical lookup key for a description: lower-cased, stripped of anything
/// but ASCII letters, digits and whitespace, whitespace collapsed.
pub fn normalize_description(description: &str) -> String {
    description
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The account type (and optionally subtype) wanted for one side of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleTarget {
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub subtype: Option<AccountSubtype>,
}

impl RoleTarget {
    pub fn new(account_type: AccountType, subtype: AccountSubtype) -> Self {
        Self {
            account_type,
            subtype: Some(subtype),
        }
    }

    pub fn of_type(account_type: AccountType) -> Self {
        Self {
            account_type,
            subtype: None,
        }
    }
}

impl fmt::Display for RoleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subtype {
            Some(subtype) => write!(f, "{} - {}", self.account_type, subtype),
            None => write!(f, "{}", self.account_type),
        }
    }
}

/// One candidate account with its scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAccount {
    pub account: Account,
    /// Bounded correctness estimate in `[0, 0.95]`.
    pub confidence: f64,
    /// Ordering weight. Unbounded sum of matched priority rules.
    pub priority: f64,
    pub reasons: Vec<String>,
}

/// Where a mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Heuristic,
    Oracle,
}

/// A proposed posting for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionMapping {
    pub transaction_id: TransactionId,
    pub category: Option<String>,
    pub debit: RankedAccount,
    pub credit: RankedAccount,
    /// Every candidate for the debit role, best first.
    pub debit_candidates: Vec<RankedAccount>,
    /// Every candidate for the credit role, best first.
    pub credit_candidates: Vec<RankedAccount>,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub source: MappingSource,
    /// Whether the debit account may be debited in this transaction.
    pub debit_role: RoleCheck,
    /// Whether the credit account may be credited in this transaction.
    pub credit_role: RoleCheck,
}

impl TransactionMapping {
    /// Both accounts take a side they may take for this transaction.
    pub fn roles_supported(&self) -> bool {
        self.debit_role.is_supported() && self.credit_role.is_supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_canonical() {
        assert_eq!(
            normalize_description("  Cash receipt from CUSTOMER, $100!  "),
            "cash receipt from customer 100"
        );
        assert_eq!(normalize_description("a\t\tb\nc"), "a b c");
        assert_eq!(normalize_description("Café—rent"), "cafrent");
        assert_eq!(normalize_description("!!!"), "");
    }

    #[test]
    fn clamp_handles_extremes() {
        assert_eq!(clamp_confidence(-1.0), 0.0);
        assert_eq!(clamp_confidence(3.0), MAX_CONFIDENCE);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.4), 0.4);
    }

    #[test]
    fn role_target_display() {
        assert_eq!(
            RoleTarget::new(AccountType::Asset, AccountSubtype::CurrentAsset).to_string(),
            "asset - current-asset"
        );
        assert_eq!(RoleTarget::of_type(AccountType::Equity).to_string(), "equity");
    }
}
