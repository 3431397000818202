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

//! Account ranking.
//!
//! Candidates for a role are ordered by `priority` (descending), then by
//! `confidence` (descending), then by account code.
//!
//! | Priority rule                         | Weight |
//! |---------------------------------------|--------|
//! | Description matches an account pattern| 0.30   |
//! | Account used before for this description | 0.20 |
//! | Amount inside the observed range      | 0.15   |
//! | Default account for its type          | 0.10   |
//!
//! Confidence is the classification confidence (when the account's type is the
//! one the role wants), plus up to 0.2 for the account's share of past
//! mappings of the same description, plus 0.15 when the account code appears
//! as a token in the description. It is clamped to `[0, 0.95]`.

use crate::account::Account;
use crate::account_index::AccountIndex;
use crate::diagnostics::{EventLog, Stage};
use crate::error::EngineError;
use crate::mapping::history::{HistoryState, MappingHistory};
use crate::base::Side;
use crate::mapping::roles::{self, check_role};
use crate::mapping::{
    MappingSource, RankedAccount, RoleTarget, TransactionAnalysis, TransactionAnalyzer,
    TransactionMapping, clamp_confidence, normalize_description,
};
use crate::transaction::{Posting, Transaction};
use parking_lot::RwLock;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;

pub const PATTERN_MATCH_WEIGHT: f64 = 0.3;
pub const HISTORICAL_USAGE_WEIGHT: f64 = 0.2;
pub const AMOUNT_RANGE_WEIGHT: f64 = 0.15;
pub const DEFAULT_ACCOUNT_WEIGHT: f64 = 0.1;

/// Maximum confidence contributed by historical accuracy.
pub const HISTORY_CONFIDENCE_WEIGHT: f64 = 0.2;
/// Confidence bonus when the account code appears in the description.
pub const CODE_TOKEN_BONUS: f64 = 0.15;

/// Default number of accounts returned by [`MappingEngine::historical_suggestions`].
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Ranks chart-of-accounts entries for each side of a transaction.
///
/// # Thread Safety
///
/// The account index is an immutable snapshot swapped atomically on
/// [`initialize`](Self::initialize); the learned history sits behind its own lock.
#[derive(Debug)]
pub struct MappingEngine {
    index: RwLock<Option<Arc<AccountIndex>>>,
    analyzer: TransactionAnalyzer,
    history: MappingHistory,
    suggestion_limit: usize,
    log: EventLog,
}

impl MappingEngine {
    pub fn new(analyzer: TransactionAnalyzer, log: EventLog) -> Self {
        Self {
            index: RwLock::new(None),
            analyzer,
            history: MappingHistory::new(),
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            log,
        }
    }

    pub fn with_suggestion_limit(mut self, limit: usize) -> Self {
        self.suggestion_limit = limit;
        self
    }

    /// Replaces the account index with one built from `accounts`.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoAccountsProvided`] for an empty chart; the previous
    /// index, if any, is kept.
    pub fn initialize(&self, accounts: Vec<Account>) -> Result<(), EngineError> {
        let index = AccountIndex::build(accounts).inspect_err(|e| {
            self.log
                .error(Stage::Mapping, format!("initialization failed: {e}"), None, None);
        })?;
        let count = index.len();
        *self.index.write() = Some(Arc::new(index));
        self.log.info(
            Stage::Mapping,
            format!("mapping engine initialized with {count} accounts"),
            None,
            None,
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.index.read().is_some()
    }

    /// The current account index.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotInitialized`] before the first successful `initialize`.
    pub fn index(&self) -> Result<Arc<AccountIndex>, EngineError> {
        self.index.read().clone().ok_or(EngineError::NotInitialized)
    }

    pub fn analyzer(&self) -> &TransactionAnalyzer {
        &self.analyzer
    }

    /// Ranks the active accounts eligible for `target`, best first.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotInitialized`] before initialization.
    /// - [`EngineError::NoMatchingAccounts`] when no active account fits.
    pub fn rank_accounts(
        &self,
        transaction: &Transaction,
        target: RoleTarget,
        analysis: &TransactionAnalysis,
    ) -> Result<Vec<RankedAccount>, EngineError> {
        let index = self.index()?;
        self.rank_in(&index, transaction, target, analysis)
    }

    fn rank_in(
        &self,
        index: &AccountIndex,
        transaction: &Transaction,
        target: RoleTarget,
        analysis: &TransactionAnalysis,
    ) -> Result<Vec<RankedAccount>, EngineError> {
        let candidates = index.candidates(target.account_type, target.subtype);
        if candidates.is_empty() {
            return Err(EngineError::NoMatchingAccounts {
                account_type: target.account_type,
                subtype: target.subtype,
            });
        }

        let normalized = analysis.normalized_description.as_str();
        let mut ranked: Vec<RankedAccount> = candidates
            .into_iter()
            .map(|account| self.score(index, account, transaction, normalized, target, analysis))
            .collect();
        ranked.sort_by(ranking_order);
        Ok(ranked)
    }

    fn score(
        &self,
        index: &AccountIndex,
        account: &Account,
        transaction: &Transaction,
        normalized: &str,
        target: RoleTarget,
        analysis: &TransactionAnalysis,
    ) -> RankedAccount {
        let mut priority = 0.0;
        let mut reasons = Vec::new();

        if index
            .patterns(&account.id)
            .iter()
            .any(|p| !p.is_empty() && normalized.contains(p.as_str()))
        {
            priority += PATTERN_MATCH_WEIGHT;
            reasons.push("Description matches account pattern".to_string());
        }

        let frequency = self.history.frequency(normalized, &account.id);
        if frequency > 0 {
            priority += HISTORICAL_USAGE_WEIGHT;
            reasons.push(format!("Used {frequency} times for this description"));
        }

        let in_range = transaction.amount.is_some_and(|amount| {
            self.history
                .range_for(account.account_type, &account.code)
                .is_some_and(|range| range.contains(amount))
        });
        if in_range {
            priority += AMOUNT_RANGE_WEIGHT;
            reasons.push("Amount within historical range".to_string());
        }

        if account.is_default {
            priority += DEFAULT_ACCOUNT_WEIGHT;
            reasons.push(format!("Default {} account", account.account_type));
        }

        let base = if account.account_type == target.account_type {
            analysis.total_confidence()
        } else {
            0.0
        };
        let history = self.history.share(normalized, &account.id) * HISTORY_CONFIDENCE_WEIGHT;
        let code = if index.code_appears_in(&account.id, &transaction.description) {
            reasons.push(format!("Account code {} appears in description", account.code));
            CODE_TOKEN_BONUS
        } else {
            0.0
        };

        RankedAccount {
            account: account.clone(),
            confidence: clamp_confidence(base + history + code),
            priority,
            reasons,
        }
    }

    /// Classifies `transaction` and ranks both sides.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotInitialized`] or [`EngineError::NoMatchingAccounts`].
    pub fn map_transaction(&self, transaction: &Transaction) -> Result<TransactionMapping, EngineError> {
        let tx_id = transaction.id.as_str();
        let index = self.index()?;
        let analysis = self.analyzer.analyze(transaction);

        let ranked = self
            .rank_in(&index, transaction, analysis.debit, &analysis)
            .and_then(|debit| {
                self.rank_in(&index, transaction, analysis.credit, &analysis)
                    .map(|credit| (debit, credit))
            });
        let (debit_candidates, credit_candidates) = match ranked {
            Ok(pair) => pair,
            Err(e) => {
                self.log.error(
                    Stage::Mapping,
                    format!("mapping failed: {e}"),
                    Some(tx_id),
                    None,
                );
                return Err(e);
            }
        };

        let (Some(debit), Some(first_credit)) = (debit_candidates.first(), credit_candidates.first())
        else {
            return Err(EngineError::NoMatchingAccounts {
                account_type: analysis.debit.account_type,
                subtype: analysis.debit.subtype,
            });
        };
        // Never propose the same account on both sides when there is an alternative.
        let credit = credit_candidates
            .iter()
            .find(|c| c.account.id != debit.account.id)
            .unwrap_or(first_credit);

        let debit_role = check_role(&debit.account, Side::Debit, &transaction.description);
        let credit_role = check_role(&credit.account, Side::Credit, &transaction.description);

        let mut reasoning = analysis.debit_reasoning.clone();
        reasoning.extend(analysis.credit_reasoning.iter().cloned());
        reasoning.extend(roles::describe(&debit.account, Side::Debit, debit_role));
        reasoning.extend(roles::describe(&credit.account, Side::Credit, credit_role));
        let mapping = TransactionMapping {
            transaction_id: transaction.id.clone(),
            category: analysis.category.clone(),
            debit: debit.clone(),
            credit: credit.clone(),
            confidence: debit.confidence.min(credit.confidence),
            reasoning,
            source: MappingSource::Heuristic,
            debit_candidates: debit_candidates.clone(),
            credit_candidates: credit_candidates.clone(),
            debit_role,
            credit_role,
        };

        if !mapping.roles_supported() {
            self.log.warning(
                Stage::Mapping,
                "posting side unusual for account type",
                Some(tx_id),
                Some(json!({
                    "debit_role": mapping.debit_role,
                    "credit_role": mapping.credit_role,
                })),
            );
        }

        self.log.info(
            Stage::Mapping,
            "transaction mapped",
            Some(tx_id),
            Some(json!({
                "category": mapping.category,
                "debit": mapping.debit.account.code,
                "credit": mapping.credit.account.code,
                "confidence": mapping.confidence,
            })),
        );
        Ok(mapping)
    }

    /// Learns from a mapping the caller accepted.
    pub fn confirm_mapping(&self, transaction: &Transaction, debit: &Account, credit: &Account) {
        let normalized = normalize_description(&transaction.description);
        self.history.record(&normalized, debit, transaction.amount);
        self.history.record(&normalized, credit, transaction.amount);
        self.log.debug(
            Stage::Mapping,
            "mapping confirmed",
            Some(transaction.id.as_str()),
            Some(json!({ "debit": debit.code, "credit": credit.code })),
        );
    }

    /// Swaps a previously confirmed posting for a new one.
    pub fn replace_mapping(
        &self,
        transaction: &Transaction,
        previous: &Posting,
        debit: &Account,
        credit: &Account,
    ) {
        let normalized = normalize_description(&transaction.description);
        self.history.forget(&normalized, &previous.debit);
        self.history.forget(&normalized, &previous.credit);
        self.history.record(&normalized, debit, transaction.amount);
        self.history.record(&normalized, credit, transaction.amount);
        self.log.debug(
            Stage::Mapping,
            "mapping replaced",
            Some(transaction.id.as_str()),
            Some(json!({
                "previous_debit": previous.debit.as_str(),
                "previous_credit": previous.credit.as_str(),
                "debit": debit.code,
                "credit": credit.code,
            })),
        );
    }

    /// Accounts previously confirmed for this description, most frequent first.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotInitialized`] before initialization.
    pub fn historical_suggestions(&self, description: &str) -> Result<Vec<Account>, EngineError> {
        let index = self.index()?;
        Ok(self
            .history
            .usage_for(&normalize_description(description))
            .iter()
            .filter_map(|usage| index.get(&usage.account_id))
            .filter(|account| account.is_active)
            .take(self.suggestion_limit)
            .cloned()
            .collect())
    }

    pub fn export_state(&self) -> HistoryState {
        self.history.export()
    }

    pub fn restore_state(&self, state: HistoryState) {
        self.history.restore(state);
    }

    pub fn reset_state(&self) {
        self.history.reset();
    }
}

/// Orders two ranked accounts the way [`MappingEngine`] does.
pub fn ranking_order(a: &RankedAccount, b: &RankedAccount) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.account.code.cmp(&b.account.code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountSubtype, AccountType};
    use crate::mapping::MAX_CONFIDENCE;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn chart() -> Vec<Account> {
        vec![
            Account::new("cash", "1100", "Cash", AccountType::Asset, AccountSubtype::CurrentAsset),
            Account::new("bank", "1000", "Bank", AccountType::Asset, AccountSubtype::CurrentAsset),
            Account::new("sales", "4100", "Sales Revenue", AccountType::Revenue, AccountSubtype::OperatingRevenue),
            Account::new("rent", "6100", "Rent", AccountType::Expense, AccountSubtype::OperatingExpense),
            Account::new("util", "6200", "Utilities", AccountType::Expense, AccountSubtype::OperatingExpense)
                .default_for_type(),
            Account::new("ap", "2100", "Accounts Payable", AccountType::Liability, AccountSubtype::CurrentLiability),
        ]
    }

    fn tx(description: &str, amount: Decimal) -> Transaction {
        Transaction::new(
            "tx-1",
            description,
            amount,
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        )
    }

    fn engine() -> MappingEngine {
        let engine = MappingEngine::new(TransactionAnalyzer::new(), EventLog::disabled());
        engine.initialize(chart()).unwrap();
        engine
    }

    #[test]
    fn uninitialized_and_empty() {
        let engine = MappingEngine::new(TransactionAnalyzer::new(), EventLog::disabled());
        assert_eq!(
            engine.map_transaction(&tx("rent", dec!(1))).unwrap_err(),
            EngineError::NotInitialized
        );
        assert_eq!(engine.initialize(Vec::new()), Err(EngineError::NoAccountsProvided));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn customer_receipt_ranks_cash_and_sales() {
        let mapping = engine()
            .map_transaction(&tx("Cash receipt from customer, $100", dec!(100)))
            .unwrap();
        assert_eq!(mapping.debit.account.code, "1100");
        assert_eq!(mapping.credit.account.code, "4100");
        assert!(mapping.debit.priority >= PATTERN_MATCH_WEIGHT);
    }

    #[test]
    fn default_flag_breaks_ties() {
        let engine = engine();
        let t = tx("Vendor bill", dec!(40));
        let analysis = engine.analyzer().analyze(&t);
        let ranked = engine.rank_accounts(&t, analysis.debit, &analysis).unwrap();
        assert_eq!(ranked[0].account.code, "6200");
        assert_eq!(ranked[1].account.code, "6100");
    }

    #[test]
    fn history_and_ranges_promote_accounts() {
        let engine = engine();
        let t = tx("Vendor bill", dec!(40));
        let rent = chart().into_iter().find(|a| a.code == "6100").unwrap();
        let ap = chart().into_iter().find(|a| a.code == "2100").unwrap();
        engine.confirm_mapping(&t, &rent, &ap);

        let analysis = engine.analyzer().analyze(&t);
        let ranked = engine.rank_accounts(&t, analysis.debit, &analysis).unwrap();
        assert_eq!(ranked[0].account.code, "6100");
        let expected = HISTORICAL_USAGE_WEIGHT + AMOUNT_RANGE_WEIGHT;
        assert!((ranked[0].priority - expected).abs() < 1e-9);
        assert_eq!(
            engine.historical_suggestions("vendor   BILL!").unwrap()[0].code,
            "6100"
        );
    }

    #[test]
    fn missing_role_accounts_fail() {
        let engine = MappingEngine::new(TransactionAnalyzer::new(), EventLog::disabled());
        engine
            .initialize(vec![Account::new(
                "cash",
                "1100",
                "Cash",
                AccountType::Asset,
                AccountSubtype::CurrentAsset,
            )])
            .unwrap();
        assert_eq!(
            engine.map_transaction(&tx("Misc", dec!(5))).unwrap_err(),
            EngineError::NoMatchingAccounts {
                account_type: AccountType::Expense,
                subtype: Some(AccountSubtype::OperatingExpense),
            }
        );
    }

    #[test]
    fn code_token_bonus_is_bounded() {
        let engine = engine();
        let t = tx("monthly payroll 6100 6200 2100 1100", dec!(10));
        let mapping = engine.map_transaction(&t).unwrap();
        for ranked in mapping.debit_candidates.iter().chain(&mapping.credit_candidates) {
            assert!(ranked.confidence <= MAX_CONFIDENCE);
            assert!(ranked.confidence >= 0.0);
        }
    }

    #[test]
    fn ranking_is_deterministic() {
        let engine = engine();
        let t = tx("Office rent for April", dec!(1200));
        assert_eq!(engine.map_transaction(&t).unwrap(), engine.map_transaction(&t).unwrap());
    }
}
