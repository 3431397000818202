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

//! Layered validation of a proposed posting.
//!
//! Rules are grouped into [`ValidationLevel`]s which run in order:
//! Structural → Accounting → Business → Historical. An unoverridden error in
//! one level stops that level and every level after it.
//!
//! # Components
//!
//! - [`RuleRegistry`]: rules indexed by level with declared dependency edges.
//! - [`OverrideStore`]: time-bound human overrides keyed by rule id.
//! - [`ValidationService`]: runs the levels and aggregates a [`ValidationResult`].

pub mod overrides;
pub mod registry;
pub mod rules;
pub mod service;

use crate::account::Account;
use crate::base::RuleId;
use crate::error::RuleFault;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use overrides::{OverrideStore, ValidationOverride};
pub use registry::RuleRegistry;
pub use service::ValidationService;

/// Ordered validation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Structural,
    Accounting,
    Business,
    Historical,
}

impl ValidationLevel {
    /// Every level, in execution order.
    pub const ALL: [ValidationLevel; 4] = [
        ValidationLevel::Structural,
        ValidationLevel::Accounting,
        ValidationLevel::Business,
        ValidationLevel::Historical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationLevel::Structural => "structural",
            ValidationLevel::Accounting => "accounting",
            ValidationLevel::Business => "business",
            ValidationLevel::Historical => "historical",
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Machine-readable code, e.g. `DEBIT_ACCOUNT_MISSING`.
    pub code: String,
    pub message: String,
    pub level: ValidationLevel,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_fields: Vec<String>,
}

impl ValidationIssue {
    pub fn error(code: &str, message: impl Into<String>, level: ValidationLevel) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            level,
            severity: Severity::Error,
            affected_fields: Vec::new(),
        }
    }

    pub fn warning(code: &str, message: impl Into<String>, level: ValidationLevel) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            level,
            severity: Severity::Warning,
            affected_fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.affected_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// Outcome of one rule, or the aggregate of a whole validation run.
///
/// Overrides never remove errors. A single rule's result that carries a live
/// override stays `is_valid == false` but no longer blocks; the aggregate is
/// valid iff every rule result it collected passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ValidationOverride>,
    pub level: ValidationLevel,
}

impl ValidationResult {
    /// An empty, valid result at `level`.
    pub fn new(level: ValidationLevel) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            overrides: Vec::new(),
            level,
        }
    }

    pub fn add_error(&mut self, code: &str, message: impl Into<String>, fields: &[&str]) {
        self.errors
            .push(ValidationIssue::error(code, message, self.level).with_fields(fields));
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, code: &str, message: impl Into<String>, fields: &[&str]) {
        self.warnings
            .push(ValidationIssue::warning(code, message, self.level).with_fields(fields));
    }

    /// True iff at least one attached override is unexpired at `now`.
    pub fn has_valid_override(&self, now: DateTime<Utc>) -> bool {
        self.overrides.iter().any(|o| o.is_active_at(now))
    }

    /// Valid on its own, or covered by a live override.
    pub fn passes(&self, now: DateTime<Utc>) -> bool {
        self.is_valid || self.has_valid_override(now)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Everything a rule may look at. Built once per validation run.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub transaction: &'a Transaction,
    pub debit: Option<&'a Account>,
    pub credit: Option<&'a Account>,
    /// Overrides active when the run started.
    pub overrides: Vec<ValidationOverride>,
    /// Clock reading used for every expiry check in the run.
    pub now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        transaction: &'a Transaction,
        debit: Option<&'a Account>,
        credit: Option<&'a Account>,
    ) -> Self {
        Self {
            transaction,
            debit,
            credit,
            overrides: Vec::new(),
            now: Utc::now(),
        }
    }

    pub fn with_overrides(mut self, overrides: Vec<ValidationOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Live overrides for `rule`.
    pub fn overrides_for(&self, rule: &RuleId) -> Vec<ValidationOverride> {
        self.overrides
            .iter()
            .filter(|o| &o.rule_id == rule && o.is_active_at(self.now))
            .cloned()
            .collect()
    }
}

/// A single accounting-correctness check.
///
/// Implementations are stateless. Returning `Err` reports an unexpected fault,
/// which the service records as one `VALIDATION_ERROR` issue.
pub trait ValidationRule: Send + Sync {
    fn id(&self) -> RuleId;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn level(&self) -> ValidationLevel;

    /// Higher runs first within a level.
    fn priority(&self) -> u32;

    /// Rules that must pass (or be overridden) before this one applies.
    fn dependencies(&self) -> Vec<RuleId> {
        Vec::new()
    }

    fn can_override(&self) -> bool;

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault>;
}
