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

//! Posting engine.
//!
//! The [`Engine`] is the surface the approval workflow talks to. It owns the
//! [`MappingEngine`], the [`ValidationService`] and, optionally, an
//! [`OracleMapper`], and wires them to one [`EventLog`].
//!
//! # Approval
//!
//! | Validation outcome          | [`approve`](Engine::approve) | [`approve_with_override`](Engine::approve_with_override) |
//! |-----------------------------|------------------------------|----------------------------------------------------------|
//! | valid, no warnings          | approved                     | approved                                                 |
//! | valid, warnings outstanding | `ApprovalBlocked`            | approved, reason and approver logged                     |
//! | invalid                     | `ApprovalBlocked`            | `ApprovalBlocked`                                        |
//!
//! Errors can only be waived per rule through [`Engine::add_override`].
//!
//! # Thread Safety
//!
//! Every method takes `&self`. Mapping, validation and approval may run in
//! parallel for different transactions.

use crate::account::Account;
use crate::base::RuleId;
use crate::config::EngineConfig;
use crate::diagnostics::{EventLog, Stage};
use crate::error::EngineError;
use crate::mapping::{
    MappingEngine, OracleMapper, SuggestionOracle, TransactionAnalyzer, TransactionMapping,
};
use crate::transaction::{Posting, Transaction, TransactionStatus};
use crate::validation::rules::default_registry;
use crate::validation::{RuleRegistry, ValidationOverride, ValidationResult, ValidationService};
use serde_json::json;
use std::sync::Arc;

/// Human sign-off on a posting whose validation left warnings outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOverride {
    pub reason: String,
    pub approver: String,
}

impl ApprovalOverride {
    pub fn new(reason: &str, approver: &str) -> Self {
        Self {
            reason: reason.to_string(),
            approver: approver.to_string(),
        }
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.reason.trim().is_empty() {
            return Err(EngineError::InvalidOverride("reason is required".to_string()));
        }
        if self.approver.trim().is_empty() {
            return Err(EngineError::InvalidOverride("approver is required".to_string()));
        }
        Ok(())
    }
}

pub struct Engine {
    mapping: MappingEngine,
    validation: ValidationService,
    oracle: Option<OracleMapper>,
    config: EngineConfig,
    log: EventLog,
}

impl Engine {
    /// Engine with the default configuration and the built-in rule set.
    ///
    /// # Errors
    ///
    /// Registration errors of the built-in rules.
    pub fn new(log: EventLog) -> Result<Self, EngineError> {
        Self::from_config(EngineConfig::default(), log)
    }

    /// Engine with the built-in rule set and `config`.
    ///
    /// # Errors
    ///
    /// Registration errors of the built-in rules.
    pub fn from_config(config: EngineConfig, log: EventLog) -> Result<Self, EngineError> {
        Self::with_registry(config, default_registry()?, log)
    }

    /// Engine over a caller-built rule registry.
    ///
    /// # Errors
    ///
    /// [`EngineError::CircularDependency`] when the registry's graph has a cycle.
    pub fn with_registry(
        config: EngineConfig,
        registry: RuleRegistry,
        log: EventLog,
    ) -> Result<Self, EngineError> {
        let validation = ValidationService::new(registry, log.clone())?;
        let analyzer = TransactionAnalyzer::with_categories(config.mapping.categories.clone());
        let mapping = MappingEngine::new(analyzer, log.clone())
            .with_suggestion_limit(config.mapping.history_suggestion_limit);
        Ok(Self {
            mapping,
            validation,
            oracle: None,
            config,
            log,
        })
    }

    /// Attaches a suggestion oracle, used when `oracle.enabled` is set.
    pub fn with_oracle(mut self, oracle: Arc<dyn SuggestionOracle>) -> Self {
        self.oracle = Some(OracleMapper::new(oracle, self.config.oracle, self.log.clone()));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mapping(&self) -> &MappingEngine {
        &self.mapping
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    /// Loads a chart of accounts.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoAccountsProvided`] for an empty chart.
    pub fn initialize(&self, accounts: Vec<Account>) -> Result<(), EngineError> {
        self.mapping.initialize(accounts)
    }

    /// Ranks accounts for both sides using the local heuristic.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotInitialized`] or [`EngineError::NoMatchingAccounts`].
    pub fn map_transaction(&self, transaction: &Transaction) -> Result<TransactionMapping, EngineError> {
        self.mapping.map_transaction(transaction)
    }

    /// Maps through the oracle when one is attached and enabled, otherwise
    /// like [`map_transaction`](Self::map_transaction).
    ///
    /// # Errors
    ///
    /// Only heuristic errors. Oracle failures fall back to the heuristic.
    pub async fn suggest_mapping(
        &self,
        transaction: &Transaction,
    ) -> Result<TransactionMapping, EngineError> {
        match &self.oracle {
            Some(oracle) => oracle.map(&self.mapping, transaction).await,
            None => self.mapping.map_transaction(transaction),
        }
    }

    /// Maps a batch with the oracle's throttling. Each item fails independently.
    pub async fn suggest_mappings(
        &self,
        transactions: &[Transaction],
    ) -> Vec<Result<TransactionMapping, EngineError>> {
        match &self.oracle {
            Some(oracle) => oracle.map_batch(&self.mapping, transactions).await,
            None => transactions
                .iter()
                .map(|tx| self.mapping.map_transaction(tx))
                .collect(),
        }
    }

    pub fn validate(
        &self,
        transaction: &Transaction,
        debit: Option<&Account>,
        credit: Option<&Account>,
    ) -> ValidationResult {
        self.validation.validate(transaction, debit, credit)
    }

    /// # Errors
    ///
    /// See [`ValidationService::add_override`].
    pub fn add_override(&self, override_: ValidationOverride) -> Result<(), EngineError> {
        self.validation.add_override(override_)
    }

    pub fn remove_override(&self, rule_id: &RuleId) -> bool {
        self.validation.remove_override(rule_id)
    }

    pub fn clear_expired_overrides(&self) -> usize {
        self.validation.clear_expired_overrides()
    }

    /// Records an accepted posting in the mapping history.
    pub fn confirm_mapping(&self, transaction: &Transaction, debit: &Account, credit: &Account) {
        self.mapping.confirm_mapping(transaction, debit, credit);
    }

    /// Validates the posting and approves it when it is valid with no warnings.
    ///
    /// On success the transaction is `Approved` and the posting is learned.
    /// A posting that fails validation moves the transaction to `Error`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ApprovalBlocked`] on errors or outstanding warnings.
    /// - [`EngineError::InvalidStatusTransition`] for an already approved transaction.
    pub fn approve(
        &self,
        transaction: &mut Transaction,
        debit: &Account,
        credit: &Account,
    ) -> Result<ValidationResult, EngineError> {
        self.ensure_not_approved(transaction)?;
        let result = self.validate_for_approval(transaction, debit, credit)?;

        if result.has_warnings() {
            let message = format!(
                "{} warning(s) require an approval override",
                result.warnings.len()
            );
            self.log.warning(
                Stage::Approval,
                message.clone(),
                Some(transaction.id.as_str()),
                Some(json!({ "warnings": warning_codes(&result) })),
            );
            return Err(EngineError::ApprovalBlocked(message));
        }

        self.mark_approved(transaction)?;
        self.mapping.confirm_mapping(transaction, debit, credit);
        transaction.posting = Some(Posting::new(debit, credit));
        self.log.info(
            Stage::Approval,
            "transaction approved",
            Some(transaction.id.as_str()),
            Some(json!({ "debit": debit.code, "credit": credit.code })),
        );
        Ok(result)
    }

    /// Approves a valid posting despite outstanding warnings.
    ///
    /// Also re-approves an already approved transaction, recording the new
    /// sign-off. The posting is learned once per transaction: re-approving
    /// the same pair leaves the mapping history untouched, and a different
    /// pair replaces the one learned before.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidOverride`] for a blank reason or approver.
    /// - [`EngineError::ApprovalBlocked`] when validation reports errors.
    pub fn approve_with_override(
        &self,
        transaction: &mut Transaction,
        debit: &Account,
        credit: &Account,
        approval: ApprovalOverride,
    ) -> Result<ValidationResult, EngineError> {
        approval.check()?;
        let result = self.validate_for_approval(transaction, debit, credit)?;

        let posting = Posting::new(debit, credit);
        match (transaction.status, transaction.posting.clone()) {
            (TransactionStatus::Approved, Some(previous)) if previous == posting => {}
            (TransactionStatus::Approved, Some(previous)) => {
                self.mapping.replace_mapping(transaction, &previous, debit, credit);
            }
            (TransactionStatus::Approved, None) => {
                self.mapping.confirm_mapping(transaction, debit, credit);
            }
            _ => {
                self.mark_approved(transaction)?;
                self.mapping.confirm_mapping(transaction, debit, credit);
            }
        }
        transaction.posting = Some(posting);
        self.log.info(
            Stage::Approval,
            "transaction approved with override",
            Some(transaction.id.as_str()),
            Some(json!({
                "debit": debit.code,
                "credit": credit.code,
                "reason": approval.reason,
                "approved_by": approval.approver,
                "warnings": warning_codes(&result),
            })),
        );
        Ok(result)
    }

    fn ensure_not_approved(&self, transaction: &Transaction) -> Result<(), EngineError> {
        if transaction.status == TransactionStatus::Approved {
            return Err(EngineError::InvalidStatusTransition {
                from: TransactionStatus::Approved,
                to: TransactionStatus::Approved,
            });
        }
        Ok(())
    }

    fn validate_for_approval(
        &self,
        transaction: &mut Transaction,
        debit: &Account,
        credit: &Account,
    ) -> Result<ValidationResult, EngineError> {
        let result = self.validation.validate(transaction, Some(debit), Some(credit));
        if result.is_valid {
            return Ok(result);
        }

        if transaction.status.can_transition(TransactionStatus::Error) {
            transaction.status = TransactionStatus::Error;
        }
        let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        let message = format!("validation failed: {}", codes.join(", "));
        self.log.error(
            Stage::Approval,
            message.clone(),
            Some(transaction.id.as_str()),
            Some(json!({ "errors": codes })),
        );
        Err(EngineError::ApprovalBlocked(message))
    }

    fn mark_approved(&self, transaction: &mut Transaction) -> Result<(), EngineError> {
        if transaction.status != TransactionStatus::Mapped {
            transaction.transition(TransactionStatus::Mapped)?;
        }
        transaction.transition(TransactionStatus::Approved)
    }
}

fn warning_codes(result: &ValidationResult) -> Vec<&str> {
    result.warnings.iter().map(|w| w.code.as_str()).collect()
}
