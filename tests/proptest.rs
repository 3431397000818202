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

//! Property-based tests for the posting engine.
//!
//! These tests verify invariants that should hold for any chart of accounts,
//! transaction description, rule graph or sequence of confirmed mappings.

use chrono::NaiveDate;
use posting_engine::mapping::{MAX_CONFIDENCE, MappingHistory, normalize_description};
use posting_engine::validation::{ValidationContext, ValidationLevel};
use posting_engine::{
    Account, AccountSubtype, AccountType, Engine, EngineError, EventLog, RuleFault, RuleId,
    RuleRegistry, Transaction, ValidationResult, ValidationRule,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 100000.00).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Free text mixing category keywords, account codes and noise.
fn arb_description() -> impl Strategy<Value = String> {
    let word = prop_oneof![
        Just("payroll".to_string()),
        Just("rent".to_string()),
        Just("customer".to_string()),
        Just("computer".to_string()),
        Just("loan".to_string()),
        Just("monthly".to_string()),
        Just("refund".to_string()),
        Just("1100".to_string()),
        Just("6100".to_string()),
        Just("61000".to_string()),
        Just("1000.100".to_string()),
        "[a-zA-Z0-9$,.!-]{1,12}",
    ];
    prop::collection::vec(word, 0..8).prop_map(|words| words.join(" "))
}

fn chart() -> Vec<Account> {
    use AccountSubtype::*;
    use AccountType::*;
    vec![
        Account::new("bank", "1000", "Bank", Asset, CurrentAsset),
        Account::new("bank-op", "1000.100", "Operating", Asset, CurrentAsset),
        Account::new("cash", "1100", "Cash", Asset, CurrentAsset).default_for_type(),
        Account::new("equip", "1500", "Equipment", Asset, NonCurrentAsset),
        Account::new("ap", "2100", "Accounts Payable", Liability, CurrentLiability),
        Account::new("sales", "4100", "Sales Revenue", Revenue, OperatingRevenue),
        Account::new("rent", "6100", "Rent", Expense, OperatingExpense),
        Account::new("wages", "6300", "Wages", Expense, OperatingExpense),
    ]
}

fn make_tx(description: &str, amount: Decimal) -> Transaction {
    Transaction::new(
        "tx-prop",
        description,
        amount,
        NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
    )
}

fn engine() -> Engine {
    let engine = Engine::new(EventLog::disabled()).unwrap();
    engine.initialize(chart()).unwrap();
    engine
}

// =============================================================================
// Mapping Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every confidence the engine reports stays within [0, 0.95].
    #[test]
    fn confidence_is_bounded(
        description in arb_description(),
        amount in arb_amount(),
        confirmations in 0usize..4,
    ) {
        let engine = engine();
        let tx = make_tx(&description, amount);
        for _ in 0..confirmations {
            engine.confirm_mapping(&tx, &chart()[6], &chart()[4]);
        }

        let mapping = engine.map_transaction(&tx).unwrap();
        prop_assert!((0.0..=MAX_CONFIDENCE).contains(&mapping.confidence));
        for ranked in mapping.debit_candidates.iter().chain(&mapping.credit_candidates) {
            prop_assert!((0.0..=MAX_CONFIDENCE).contains(&ranked.confidence));
            prop_assert!(ranked.priority >= 0.0);
        }
        let analysis = engine.mapping().analyzer().analyze(&tx);
        prop_assert!((0.0..=MAX_CONFIDENCE).contains(&analysis.total_confidence()));
    }

    /// Ranking twice without a history update yields the same ordered output.
    #[test]
    fn ranking_is_deterministic(
        description in arb_description(),
        amount in arb_amount(),
    ) {
        let engine = engine();
        let tx = make_tx(&description, amount);
        let first = engine.map_transaction(&tx).unwrap();
        let second = engine.map_transaction(&tx).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Candidates come out sorted by priority, then confidence, descending.
    #[test]
    fn candidates_are_ordered(
        description in arb_description(),
        amount in arb_amount(),
    ) {
        let mapping = engine().map_transaction(&make_tx(&description, amount)).unwrap();
        for pair in mapping.debit_candidates.windows(2) {
            prop_assert!(
                pair[0].priority > pair[1].priority
                    || (pair[0].priority == pair[1].priority
                        && pair[0].confidence >= pair[1].confidence)
            );
        }
    }

    /// Normalization is idempotent and only keeps lower-case alphanumerics and single spaces.
    #[test]
    fn normalization_is_idempotent(text in "\\PC{0,40}") {
        let once = normalize_description(&text);
        prop_assert_eq!(normalize_description(&once), once.clone());
        prop_assert!(!once.contains("  "));
        prop_assert!(once.chars().all(|c| c == ' ' || c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    /// Observed amount ranges only ever widen and always cover every confirmed amount.
    #[test]
    fn ranges_only_widen(amounts in prop::collection::vec(arb_amount(), 1..20)) {
        let history = MappingHistory::new();
        let rent = &chart()[6];
        let mut previous: Option<(Decimal, Decimal)> = None;

        for amount in &amounts {
            history.record("office rent", rent, Some(*amount));
            let range = history.range_for(AccountType::Expense, "6100").unwrap();
            if let Some((min, max)) = previous {
                prop_assert!(range.min <= min);
                prop_assert!(range.max >= max);
            }
            previous = Some((range.min, range.max));
        }

        let range = history.range_for(AccountType::Expense, "6100").unwrap();
        prop_assert_eq!(range.min, *amounts.iter().min().unwrap());
        prop_assert_eq!(range.max, *amounts.iter().max().unwrap());
        prop_assert_eq!(history.frequency("office rent", &rent.id), amounts.len() as u64);
    }
}

// =============================================================================
// Validation Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A posting missing one account reports exactly that one error and nothing else.
    #[test]
    fn missing_account_is_the_only_error(
        description in arb_description(),
        amount in arb_amount(),
        missing_debit in any::<bool>(),
    ) {
        let engine = engine();
        let tx = make_tx(&description, amount);
        let accounts = chart();
        let result = if missing_debit {
            engine.validate(&tx, None, Some(&accounts[5]))
        } else {
            engine.validate(&tx, Some(&accounts[2]), None)
        };
        let expected = if missing_debit { "DEBIT_ACCOUNT_MISSING" } else { "CREDIT_ACCOUNT_MISSING" };

        prop_assert!(!result.is_valid);
        prop_assert_eq!(result.errors.len(), 1);
        prop_assert_eq!(result.errors[0].code.as_str(), expected);
        prop_assert!(result.warnings.is_empty());
    }

    /// Positive two-decimal amounts between distinct compatible accounts never error.
    #[test]
    fn receipts_validate(amount in arb_amount(), description in "[a-z]{3,20}") {
        let engine = engine();
        let accounts = chart();
        let result = engine.validate(&make_tx(&description, amount), Some(&accounts[2]), Some(&accounts[5]));
        prop_assert!(result.is_valid);
        prop_assert!(result.errors.is_empty());
    }
}

// =============================================================================
// Rule Graph Properties
// =============================================================================

struct Node {
    id: String,
    deps: Vec<RuleId>,
}

impl ValidationRule for Node {
    fn id(&self) -> RuleId {
        RuleId::from(self.id.as_str())
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Business
    }

    fn priority(&self) -> u32 {
        1
    }

    fn dependencies(&self) -> Vec<RuleId> {
        self.deps.clone()
    }

    fn can_override(&self) -> bool {
        false
    }

    fn validate(&self, _ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        Ok(ValidationResult::new(ValidationLevel::Business))
    }
}

/// Adjacency lists over `n` nodes, edges pointing anywhere.
fn arb_graph() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..8).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::btree_set(0..n, 0..3), n)
            .prop_map(|sets| sets.into_iter().map(|s| s.into_iter().collect()).collect())
    })
}

/// Kahn's algorithm.
fn is_acyclic(graph: &[Vec<usize>]) -> bool {
    let n = graph.len();
    let mut indegree = vec![0usize; n];
    for deps in graph {
        for &d in deps {
            indegree[d] += 1;
        }
    }
    let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut seen = 0;
    while let Some(node) = ready.pop() {
        seen += 1;
        for &d in &graph[node] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.push(d);
            }
        }
    }
    seen == n
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Graph validation succeeds iff the dependency relation is acyclic.
    #[test]
    fn cycle_detection_matches_reference(graph in arb_graph()) {
        let rules: Vec<Arc<dyn ValidationRule>> = graph
            .iter()
            .enumerate()
            .map(|(i, deps)| {
                Arc::new(Node {
                    id: format!("r{i}"),
                    deps: deps.iter().map(|d| RuleId::from(format!("r{d}").as_str())).collect(),
                }) as Arc<dyn ValidationRule>
            })
            .collect();

        let mut registry = RuleRegistry::new();
        registry.register_all(rules).unwrap();
        let outcome = registry.validate_dependency_graph();

        if is_acyclic(&graph) {
            prop_assert_eq!(outcome, Ok(()));
        } else {
            prop_assert!(matches!(outcome, Err(EngineError::CircularDependency(_))));
        }
    }
}
