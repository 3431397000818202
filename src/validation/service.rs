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

//! Validation service.
//!
//! Runs the registry's rules level by level against one posting and aggregates
//! the outcome.
//!
//! # Run semantics
//!
//! - Levels run in [`ValidationLevel::ALL`] order, rules by registry priority.
//! - A rule whose dependencies are not met (invalid and not overridden) is
//!   skipped and leaves no trace in the result.
//! - The first rule in a level that fails without a live override stops that
//!   level and every later level.
//! - A rule returning `Err` or panicking is recorded as one `VALIDATION_ERROR`
//!   issue.
//!
//! # Thread Safety
//!
//! `validate` takes `&self` and may run concurrently for different
//! transactions. Overrides sit behind a lock, the result cache is a [`DashMap`].

use crate::account::Account;
use crate::base::{RuleId, TransactionId};
use crate::diagnostics::{EventLog, Stage};
use crate::error::{EngineError, RuleFault};
use crate::transaction::Transaction;
use crate::validation::rules::default_registry;
use crate::validation::{
    OverrideStore, RuleRegistry, ValidationContext, ValidationLevel, ValidationOverride,
    ValidationResult, ValidationRule,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Issue code recorded when a rule faults.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

#[derive(Debug)]
pub struct ValidationService {
    registry: RuleRegistry,
    overrides: OverrideStore,
    /// Last aggregate result per transaction.
    results: DashMap<TransactionId, ValidationResult>,
    log: EventLog,
}

/// Per-run memo of rule evaluations. `None` marks a rule skipped for unmet
/// dependencies.
type Evaluations = HashMap<RuleId, Option<ValidationResult>>;

impl ValidationService {
    /// Wraps `registry` after checking its dependency graph.
    ///
    /// # Errors
    ///
    /// [`EngineError::CircularDependency`] when the graph has a cycle.
    pub fn new(registry: RuleRegistry, log: EventLog) -> Result<Self, EngineError> {
        registry.validate_dependency_graph()?;
        Ok(Self {
            registry,
            overrides: OverrideStore::new(),
            results: DashMap::new(),
            log,
        })
    }

    /// Service over the built-in rule set.
    pub fn with_default_rules(log: EventLog) -> Result<Self, EngineError> {
        Self::new(default_registry()?, log)
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Validates a posting against the current clock.
    pub fn validate(
        &self,
        transaction: &Transaction,
        debit: Option<&Account>,
        credit: Option<&Account>,
    ) -> ValidationResult {
        self.validate_at(transaction, debit, credit, Utc::now())
    }

    /// Validates a posting, judging override expiry against `now`.
    pub fn validate_at(
        &self,
        transaction: &Transaction,
        debit: Option<&Account>,
        credit: Option<&Account>,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let tx_id = transaction.id.as_str();
        let ctx = ValidationContext::new(transaction, debit, credit)
            .with_overrides(self.overrides.active(now))
            .at(now);

        self.log.debug(
            Stage::Validation,
            "starting validation",
            Some(tx_id),
            Some(json!({
                "debit_account": debit.map(|a| a.id.as_str()),
                "credit_account": credit.map(|a| a.id.as_str()),
            })),
        );

        let mut evaluations = Evaluations::new();
        let mut aggregate = ValidationResult::new(ValidationLevel::Structural);

        'levels: for level in ValidationLevel::ALL {
            let rules = self.registry.rules_for_level(level);
            if rules.is_empty() {
                continue;
            }
            aggregate.level = level;

            for rule in rules {
                let id = rule.id();
                let Some(result) = self.evaluate(&rule, &ctx, &mut evaluations) else {
                    self.log.debug(
                        Stage::Validation,
                        format!("skipping {id}: dependencies not met"),
                        Some(tx_id),
                        None,
                    );
                    continue;
                };

                let passes = result.passes(now);
                aggregate.errors.extend(result.errors);
                aggregate.warnings.extend(result.warnings);
                aggregate.overrides.extend(result.overrides);
                if !passes {
                    aggregate.is_valid = false;
                    self.log.warning(
                        Stage::Validation,
                        format!("rule {id} failed, stopping at level {level}"),
                        Some(tx_id),
                        None,
                    );
                    break 'levels;
                }
            }
        }

        self.record_outcome(tx_id, &aggregate);
        self.results
            .insert(transaction.id.clone(), aggregate.clone());
        aggregate
    }

    /// Evaluates `rule` once per run, dependencies first.
    fn evaluate(
        &self,
        rule: &Arc<dyn ValidationRule>,
        ctx: &ValidationContext<'_>,
        evaluations: &mut Evaluations,
    ) -> Option<ValidationResult> {
        let id = rule.id();
        if let Some(done) = evaluations.get(&id) {
            return done.clone();
        }

        let dependencies_met = rule.dependencies().iter().all(|dep| {
            self.registry
                .get(dep)
                .and_then(|dep_rule| self.evaluate(&dep_rule, ctx, evaluations))
                .is_some_and(|result| result.passes(ctx.now))
        });

        let outcome = dependencies_met.then(|| self.run_rule(rule.as_ref(), ctx));
        evaluations.insert(id, outcome.clone());
        outcome
    }

    fn run_rule(&self, rule: &dyn ValidationRule, ctx: &ValidationContext<'_>) -> ValidationResult {
        let id = rule.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.validate(ctx)))
            .unwrap_or_else(|payload| Err(RuleFault::new(panic_message(payload.as_ref()))));
        let mut result = match outcome {
            Ok(result) => result,
            Err(fault) => {
                self.log.error(
                    Stage::Validation,
                    format!("rule {id} faulted: {fault}"),
                    Some(ctx.transaction.id.as_str()),
                    None,
                );
                let mut result = ValidationResult::new(rule.level());
                result.add_error(VALIDATION_ERROR, fault.to_string(), &[]);
                result
            }
        };
        if rule.can_override() && !result.is_valid {
            result.overrides = ctx.overrides_for(&id);
        }
        result
    }

    fn record_outcome(&self, tx_id: &str, result: &ValidationResult) {
        let details = json!({
            "is_valid": result.is_valid,
            "level": result.level,
            "errors": result.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>(),
            "warnings": result.warnings.iter().map(|w| w.code.as_str()).collect::<Vec<_>>(),
        });
        if !result.is_valid {
            self.log
                .error(Stage::Validation, "validation failed", Some(tx_id), Some(details));
        } else if !result.warnings.is_empty() || !result.errors.is_empty() {
            self.log.warning(
                Stage::Validation,
                "validation passed with findings",
                Some(tx_id),
                Some(details),
            );
        } else {
            self.log
                .info(Stage::Validation, "validation passed", Some(tx_id), Some(details));
        }
    }

    /// Grants an override.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownRule`] for an unregistered rule id.
    /// - [`EngineError::RuleNotOverridable`] for rules that refuse overrides.
    /// - [`EngineError::InvalidOverride`] for a blank reason or approver.
    pub fn add_override(&self, override_: ValidationOverride) -> Result<(), EngineError> {
        let rule = self
            .registry
            .get(&override_.rule_id)
            .ok_or_else(|| EngineError::UnknownRule(override_.rule_id.clone()))?;
        if !rule.can_override() {
            self.log.warning(
                Stage::Override,
                format!("rejected override for non-overridable rule {}", override_.rule_id),
                None,
                None,
            );
            return Err(EngineError::RuleNotOverridable(override_.rule_id));
        }
        override_.check()?;

        self.log.info(
            Stage::Override,
            format!("override granted for rule {}", override_.rule_id),
            None,
            Some(json!({
                "reason": override_.reason,
                "approved_by": override_.approved_by,
                "expires_at": override_.expires_at,
            })),
        );
        self.overrides.insert(override_);
        Ok(())
    }

    /// Revokes the override for `rule_id`. Returns whether one existed.
    pub fn remove_override(&self, rule_id: &RuleId) -> bool {
        let removed = self.overrides.remove(rule_id);
        if removed {
            self.log.info(
                Stage::Override,
                format!("override removed for rule {rule_id}"),
                None,
                None,
            );
        }
        removed
    }

    /// Drops overrides that have expired. Returns how many were dropped.
    pub fn clear_expired_overrides(&self) -> usize {
        let cleared = self.overrides.clear_expired(Utc::now());
        if cleared > 0 {
            self.log.info(
                Stage::Override,
                format!("cleared {cleared} expired overrides"),
                None,
                None,
            );
        }
        cleared
    }

    pub fn active_overrides(&self) -> Vec<ValidationOverride> {
        self.overrides.active(Utc::now())
    }

    /// Last aggregate result computed for `transaction_id`.
    pub fn cached_result(&self, transaction_id: &TransactionId) -> Option<ValidationResult> {
        self.results.get(transaction_id).map(|r| r.clone())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("rule panicked: {detail}")
}
