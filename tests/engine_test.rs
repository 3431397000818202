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

//! Engine public API integration tests.

use chrono::{Duration, NaiveDate, Utc};
use posting_engine::diagnostics::Stage;
use posting_engine::validation::rules::{self, default_registry};
use posting_engine::validation::service::VALIDATION_ERROR;
use posting_engine::validation::{Severity, ValidationContext, ValidationLevel};
use posting_engine::{
    Account, AccountId, AccountSubtype, AccountType, ApprovalOverride, Engine, EngineConfig,
    EngineError, EventLog, MemorySink, Posting, RuleFault, RuleId, Transaction,
    TransactionStatus, ValidationOverride, ValidationResult, ValidationRule,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn cash() -> Account {
    Account::new("cash", "1100", "Cash", AccountType::Asset, AccountSubtype::CurrentAsset)
}

fn sales() -> Account {
    Account::new(
        "sales",
        "4100",
        "Sales Revenue",
        AccountType::Revenue,
        AccountSubtype::OperatingRevenue,
    )
}

fn rent() -> Account {
    Account::new("rent", "6100", "Rent", AccountType::Expense, AccountSubtype::OperatingExpense)
}

fn make_tx(description: &str, amount: Decimal) -> Transaction {
    Transaction::new(
        "tx-1",
        description,
        amount,
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
    )
}

fn engine() -> (Engine, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let engine = Engine::new(EventLog::new(sink.clone())).unwrap();
    engine.initialize(vec![cash(), sales(), rent()]).unwrap();
    (engine, sink)
}

fn error_codes(result: &ValidationResult) -> Vec<&str> {
    result.errors.iter().map(|e| e.code.as_str()).collect()
}

#[test]
fn missing_debit_reports_one_error() {
    let (engine, _) = engine();
    let result = engine.validate(&make_tx("Cash sale", dec!(10)), None, Some(&sales()));
    assert!(!result.is_valid);
    assert_eq!(error_codes(&result), vec!["DEBIT_ACCOUNT_MISSING"]);
    assert!(result.warnings.is_empty());
}

#[test]
fn missing_credit_reports_one_error() {
    let (engine, _) = engine();
    // Short description would warn if structure checks ran.
    let result = engine.validate(&make_tx("x", dec!(10)), Some(&cash()), None);
    assert!(!result.is_valid);
    assert_eq!(error_codes(&result), vec!["CREDIT_ACCOUNT_MISSING"]);
    assert!(result.warnings.is_empty());
}

#[test]
fn account_existence_cannot_be_overridden() {
    let (engine, _) = engine();
    assert_eq!(
        engine.add_override(ValidationOverride::new(
            rules::ACCOUNT_EXISTENCE,
            "import glitch",
            "controller"
        )),
        Err(EngineError::RuleNotOverridable(RuleId::from(rules::ACCOUNT_EXISTENCE)))
    );
    let result = engine.validate(&make_tx("Cash sale", dec!(10)), None, Some(&sales()));
    assert!(!result.is_valid);
    assert!(engine.validation().active_overrides().is_empty());
}

#[test]
fn unknown_rule_and_blank_overrides_are_rejected() {
    let (engine, _) = engine();
    assert_eq!(
        engine.add_override(ValidationOverride::new("no-such-rule", "reason", "cfo")),
        Err(EngineError::UnknownRule(RuleId::from("no-such-rule")))
    );
    assert!(matches!(
        engine.add_override(ValidationOverride::new(rules::SIGN_CONVENTION, "", "cfo")),
        Err(EngineError::InvalidOverride(_))
    ));
    assert!(matches!(
        engine.add_override(ValidationOverride::new(rules::SIGN_CONVENTION, "reason", "  ")),
        Err(EngineError::InvalidOverride(_))
    ));
}

#[test]
fn live_override_unblocks_but_keeps_errors() {
    let (engine, _) = engine();
    let tx = make_tx("Rent paid from sales", dec!(500));

    let blocked = engine.validate(&tx, Some(&rent()), Some(&sales()));
    assert!(!blocked.is_valid);
    assert_eq!(error_codes(&blocked), vec!["INVALID_ACCOUNT_COMBINATION"]);

    engine
        .add_override(
            ValidationOverride::new(rules::ACCOUNT_TYPE_COMPATIBILITY, "reclass", "controller")
                .expiring_at(Utc::now() + Duration::hours(1)),
        )
        .unwrap();
    let result = engine.validate(&tx, Some(&rent()), Some(&sales()));
    assert!(result.is_valid);
    assert_eq!(error_codes(&result), vec!["INVALID_ACCOUNT_COMBINATION"]);
    assert_eq!(result.overrides.len(), 1);
    assert_eq!(result.overrides[0].approved_by, "controller");

    assert!(engine.remove_override(&RuleId::from(rules::ACCOUNT_TYPE_COMPATIBILITY)));
    assert!(!engine.remove_override(&RuleId::from(rules::ACCOUNT_TYPE_COMPATIBILITY)));
    assert!(!engine.validate(&tx, Some(&rent()), Some(&sales())).is_valid);
}

#[test]
fn expired_override_has_no_effect() {
    let (engine, _) = engine();
    let tx = make_tx("Rent paid from sales", dec!(500));
    let without = engine.validate(&tx, Some(&rent()), Some(&sales()));

    engine
        .add_override(
            ValidationOverride::new(rules::ACCOUNT_TYPE_COMPATIBILITY, "reclass", "controller")
                .expiring_at(Utc::now() - Duration::seconds(1)),
        )
        .unwrap();
    let with_expired = engine.validate(&tx, Some(&rent()), Some(&sales()));
    assert_eq!(with_expired, without);

    assert_eq!(engine.clear_expired_overrides(), 1);
    assert_eq!(engine.clear_expired_overrides(), 0);
}

#[test]
fn cash_receipt_maps_and_validates_cleanly() {
    let (engine, sink) = engine();
    let tx = make_tx("Cash receipt from customer, $100", dec!(100));

    let mapping = engine.map_transaction(&tx).unwrap();
    assert_eq!(mapping.debit.account.code, "1100");
    assert_eq!(mapping.credit.account.code, "4100");
    assert!(mapping.confidence >= 0.0 && mapping.confidence <= 0.95);

    let result = engine.validate(&tx, Some(&mapping.debit.account), Some(&mapping.credit.account));
    assert!(result.is_valid);
    assert!(result.errors.is_empty());
    assert!(result.warnings.is_empty());

    assert!(!sink.for_stage(Stage::Mapping).is_empty());
    assert!(!sink.for_stage(Stage::Validation).is_empty());
    assert!(!sink.for_transaction("tx-1").is_empty());
}

#[test]
fn identical_accounts_fail_accounting_validation() {
    let (engine, _) = engine();
    let result = engine.validate(&make_tx("Cash shuffle", dec!(20)), Some(&cash()), Some(&cash()));
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert_eq!(error.code, "SAME_ACCOUNT");
    assert_eq!(error.message, "Debit and credit accounts cannot be the same");
    assert_eq!(error.level, ValidationLevel::Accounting);
    assert_eq!(error.severity, Severity::Error);
}

#[test]
fn structural_failure_stops_later_levels() {
    let (engine, _) = engine();
    let mut tx = make_tx("Rent paid from sales", dec!(500));
    tx.amount = Some(dec!(-5));
    let result = engine.validate(&tx, Some(&rent()), Some(&sales()));
    assert!(!result.is_valid);
    assert!(result.errors.iter().all(|e| e.level == ValidationLevel::Structural));
    assert!(!error_codes(&result).contains(&"INVALID_ACCOUNT_COMBINATION"));
}

#[test]
fn results_are_cached_per_transaction() {
    let (engine, _) = engine();
    let tx = make_tx("Cash receipt from customer", dec!(100));
    let result = engine.validate(&tx, Some(&cash()), Some(&sales()));
    assert_eq!(engine.validation().cached_result(&tx.id), Some(result));
}

/// A business rule whose implementation breaks.
struct Faulty;

impl ValidationRule for Faulty {
    fn id(&self) -> RuleId {
        RuleId::from("credit-limit")
    }

    fn name(&self) -> &str {
        "Credit Limit"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Business
    }

    fn priority(&self) -> u32 {
        50
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![RuleId::from(rules::CONTRA_ACCOUNT)]
    }

    fn can_override(&self) -> bool {
        true
    }

    fn validate(&self, _ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        Err(RuleFault::new("limits service returned garbage"))
    }
}

#[test]
fn rule_fault_becomes_single_error() {
    let mut registry = default_registry().unwrap();
    registry.register(Faulty).unwrap();
    let engine = Engine::with_registry(EngineConfig::default(), registry, EventLog::disabled()).unwrap();

    let result = engine.validate(
        &make_tx("Cash receipt from customer", dec!(100)),
        Some(&cash()),
        Some(&sales()),
    );
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, VALIDATION_ERROR);
    assert_eq!(result.errors[0].level, ValidationLevel::Business);
    assert!(result.errors[0].message.contains("limits service returned garbage"));
}

#[test]
fn mapping_before_initialization_fails() {
    let engine = Engine::new(EventLog::disabled()).unwrap();
    assert_eq!(
        engine.map_transaction(&make_tx("Office rent", dec!(100))).unwrap_err(),
        EngineError::NotInitialized
    );
    assert_eq!(engine.initialize(Vec::new()), Err(EngineError::NoAccountsProvided));
}

#[test]
fn approval_summary_counts_entries() {
    let (engine, sink) = engine();
    let mut tx = make_tx("Cash receipt from customer", dec!(100));
    engine.approve(&mut tx, &cash(), &sales()).unwrap();

    let summary = sink.summary();
    assert_eq!(summary.total, sink.len());
    assert_eq!(summary.errors, 0);
    assert!(sink
        .for_stage(Stage::Approval)
        .iter()
        .any(|e| e.message == "transaction approved"));
}

fn learned(engine: &Engine, description: &str) -> Vec<(String, u64)> {
    let key = posting_engine::mapping::normalize_description(description);
    engine
        .mapping()
        .export_state()
        .usage
        .get(&key)
        .map(|usages| {
            usages
                .iter()
                .map(|u| (u.account_id.to_string(), u.frequency))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn reapproving_same_posting_learns_nothing_new() {
    let (engine, _) = engine();
    let mut tx = make_tx("Cash receipt from customer", dec!(100));
    engine.approve(&mut tx, &cash(), &sales()).unwrap();
    let before = engine.mapping().export_state();

    for approver in ["controller", "auditor"] {
        engine
            .approve_with_override(&mut tx, &cash(), &sales(), ApprovalOverride::new("re-signed", approver))
            .unwrap();
    }

    assert_eq!(engine.mapping().export_state(), before);
    assert_eq!(
        learned(&engine, "Cash receipt from customer"),
        vec![("cash".to_string(), 1), ("sales".to_string(), 1)]
    );
    assert_eq!(tx.status, TransactionStatus::Approved);
    assert_eq!(tx.posting, Some(Posting::new(&cash(), &sales())));
}

#[test]
fn reapproving_different_posting_replaces_learned_pair() {
    let bank = Account::new("bank", "1000", "Bank", AccountType::Asset, AccountSubtype::CurrentAsset);
    let engine = Engine::new(EventLog::disabled()).unwrap();
    engine
        .initialize(vec![bank.clone(), cash(), sales(), rent()])
        .unwrap();
    let mut tx = make_tx("Cash receipt from customer", dec!(100));
    engine.approve(&mut tx, &cash(), &sales()).unwrap();

    engine
        .approve_with_override(&mut tx, &bank, &sales(), ApprovalOverride::new("deposited at bank", "controller"))
        .unwrap();

    assert_eq!(
        learned(&engine, "Cash receipt from customer"),
        vec![("bank".to_string(), 1), ("sales".to_string(), 1)]
    );
    assert_eq!(
        tx.posting.as_ref().map(|p| p.debit.clone()),
        Some(AccountId::new("bank"))
    );
}
