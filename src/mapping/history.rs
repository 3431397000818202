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

//! Learned mapping history: per-description account usage and per-account
//! observed amount ranges.
//!
//! The only mutable state of the mapping engine. All of it lives behind one
//! [`RwLock`]; ranking takes read locks, confirmed mappings take the write lock.

use crate::account::{Account, AccountType};
use crate::base::AccountId;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed `[min, max]` of confirmed amounts. Only ever widens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountRange {
    pub fn new(amount: Decimal) -> Self {
        Self {
            min: amount,
            max: amount,
        }
    }

    pub fn widen(&mut self, amount: Decimal) {
        self.min = self.min.min(amount);
        self.max = self.max.max(amount);
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        self.min <= amount && amount <= self.max
    }
}

/// How often an account was confirmed for a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUsage {
    pub account_id: AccountId,
    pub frequency: u64,
}

/// Serializable snapshot of the history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    /// Normalized description to usages, most frequent first.
    pub usage: BTreeMap<String, Vec<AccountUsage>>,
    /// Account type, then account code, to observed amount range.
    pub ranges: BTreeMap<AccountType, BTreeMap<String, AmountRange>>,
}

#[derive(Debug, Default)]
pub struct MappingHistory {
    state: RwLock<HistoryState>,
}

impl MappingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a confirmed mapping of `account` for a normalized description.
    pub fn record(&self, normalized: &str, account: &Account, amount: Option<Decimal>) {
        let mut state = self.state.write();

        if let Some(amount) = amount {
            state
                .ranges
                .entry(account.account_type)
                .or_default()
                .entry(account.code.clone())
                .and_modify(|range| range.widen(amount))
                .or_insert_with(|| AmountRange::new(amount));
        }

        let usages = state.usage.entry(normalized.to_string()).or_default();
        match usages.iter_mut().find(|u| u.account_id == account.id) {
            Some(usage) => usage.frequency += 1,
            None => usages.push(AccountUsage {
                account_id: account.id.clone(),
                frequency: 1,
            }),
        }
        // Stable: equal frequencies keep first-seen order.
        usages.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    }

    /// Withdraws one confirmation of `account_id` for a normalized description.
    /// Observed amount ranges are kept.
    pub fn forget(&self, normalized: &str, account_id: &AccountId) {
        let mut state = self.state.write();
        let Some(usages) = state.usage.get_mut(normalized) else {
            return;
        };
        if let Some(usage) = usages.iter_mut().find(|u| &u.account_id == account_id) {
            usage.frequency = usage.frequency.saturating_sub(1);
        }
        usages.retain(|u| u.frequency > 0);
        usages.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        if usages.is_empty() {
            state.usage.remove(normalized);
        }
    }

    /// Usages for a normalized description, most frequent first.
    pub fn usage_for(&self, normalized: &str) -> Vec<AccountUsage> {
        self.state
            .read()
            .usage
            .get(normalized)
            .cloned()
            .unwrap_or_default()
    }

    pub fn frequency(&self, normalized: &str, account_id: &AccountId) -> u64 {
        self.state
            .read()
            .usage
            .get(normalized)
            .and_then(|usages| usages.iter().find(|u| &u.account_id == account_id))
            .map_or(0, |u| u.frequency)
    }

    /// Fraction of a description's confirmed mappings that chose `account_id`.
    pub fn share(&self, normalized: &str, account_id: &AccountId) -> f64 {
        let state = self.state.read();
        let Some(usages) = state.usage.get(normalized) else {
            return 0.0;
        };
        let total: u64 = usages.iter().map(|u| u.frequency).sum();
        if total == 0 {
            return 0.0;
        }
        let hits = usages
            .iter()
            .find(|u| &u.account_id == account_id)
            .map_or(0, |u| u.frequency);
        hits as f64 / total as f64
    }

    pub fn range_for(&self, account_type: AccountType, code: &str) -> Option<AmountRange> {
        self.state
            .read()
            .ranges
            .get(&account_type)
            .and_then(|codes| codes.get(code))
            .copied()
    }

    pub fn export(&self) -> HistoryState {
        self.state.read().clone()
    }

    pub fn restore(&self, state: HistoryState) {
        *self.state.write() = state;
    }

    pub fn reset(&self) {
        *self.state.write() = HistoryState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountSubtype;
    use rust_decimal_macros::dec;

    fn rent() -> Account {
        Account::new("rent", "6100", "Rent", AccountType::Expense, AccountSubtype::OperatingExpense)
    }

    fn utilities() -> Account {
        Account::new(
            "util",
            "6200",
            "Utilities",
            AccountType::Expense,
            AccountSubtype::OperatingExpense,
        )
    }

    #[test]
    fn ranges_only_widen() {
        let history = MappingHistory::new();
        history.record("office rent", &rent(), Some(dec!(1000)));
        history.record("office rent", &rent(), Some(dec!(800)));
        history.record("office rent", &rent(), Some(dec!(900)));
        history.record("office rent", &rent(), None);
        assert_eq!(
            history.range_for(AccountType::Expense, "6100"),
            Some(AmountRange {
                min: dec!(800),
                max: dec!(1000)
            })
        );
        assert_eq!(history.range_for(AccountType::Asset, "6100"), None);
    }

    #[test]
    fn usage_sorted_by_frequency() {
        let history = MappingHistory::new();
        history.record("march bill", &utilities(), None);
        history.record("march bill", &rent(), None);
        history.record("march bill", &rent(), None);
        let usage = history.usage_for("march bill");
        assert_eq!(usage[0].account_id, AccountId::new("rent"));
        assert_eq!(usage[0].frequency, 2);
        assert_eq!(history.frequency("march bill", &AccountId::new("util")), 1);
        assert!((history.share("march bill", &AccountId::new("rent")) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(history.share("unknown", &AccountId::new("rent")), 0.0);
    }

    #[test]
    fn forget_withdraws_one_confirmation() {
        let history = MappingHistory::new();
        history.record("march bill", &rent(), Some(dec!(900)));
        history.record("march bill", &rent(), Some(dec!(1100)));
        history.record("march bill", &utilities(), None);

        history.forget("march bill", &AccountId::new("rent"));
        assert_eq!(history.frequency("march bill", &AccountId::new("rent")), 1);
        history.forget("march bill", &AccountId::new("rent"));
        let usage = history.usage_for("march bill");
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].account_id, AccountId::new("util"));

        history.forget("march bill", &AccountId::new("util"));
        history.forget("unknown", &AccountId::new("util"));
        assert!(history.export().usage.is_empty());
        assert_eq!(
            history.range_for(AccountType::Expense, "6100"),
            Some(AmountRange {
                min: dec!(900),
                max: dec!(1100)
            })
        );
    }

    #[test]
    fn export_restore_reset() {
        let history = MappingHistory::new();
        history.record("office rent", &rent(), Some(dec!(1000)));
        let snapshot = history.export();
        history.reset();
        assert!(history.usage_for("office rent").is_empty());
        history.restore(snapshot.clone());
        assert_eq!(history.export(), snapshot);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: HistoryState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
