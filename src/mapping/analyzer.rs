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

//! Transaction classification.
//!
//! Scores each category by keyword hits in the normalized description, plus a
//! flat bonus when the amount reaches the category's capitalization threshold.
//! The highest score wins; on a tie the first-declared category is kept.

use crate::account::{AccountSubtype, AccountType};
use crate::mapping::{RoleTarget, clamp_confidence, normalize_description};
use crate::transaction::Transaction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Amount at which a purchase is treated as a fixed asset.
pub const CAPITALIZATION_THRESHOLD: Decimal = dec!(1000);
/// Amount above which a payroll entry looks unusual.
pub const HIGH_VALUE_THRESHOLD: Decimal = dec!(5000);

/// Confidence of the fallback classification.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

const KEYWORD_CONFIDENCE_STEP: f64 = 0.05;
const KEYWORD_CONFIDENCE_CAP: f64 = 0.2;
const AMOUNT_CONFIDENCE: f64 = 0.1;
const THRESHOLD_SCORE_BONUS: f64 = 0.5;

const STOP_WORDS: [&str; 4] = ["the", "and", "for", "with"];
const RECURRING_WORDS: [&str; 4] = ["monthly", "weekly", "annual", "recurring"];
const CORRECTION_WORDS: [&str; 3] = ["correction", "adjust", "reverse"];
const REFUND_WORDS: [&str; 3] = ["refund", "return", "credit"];
const ACQUISITION_WORDS: [&str; 3] = ["purchase", "acquire", "buy"];

/// Context signals detected in a description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Indicators {
    pub recurring: bool,
    pub correction: bool,
    pub refund: bool,
    pub capital_expense: bool,
}

impl Indicators {
    pub fn detect(normalized: &str, amount: Decimal) -> Self {
        let any = |words: &[&str]| words.iter().any(|w| normalized.contains(w));
        Self {
            recurring: any(&RECURRING_WORDS),
            correction: any(&CORRECTION_WORDS),
            refund: any(&REFUND_WORDS),
            capital_expense: any(&ACQUISITION_WORDS) && amount > CAPITALIZATION_THRESHOLD,
        }
    }
}

/// Predicate of a category's context rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Condition {
    AmountAbove { amount: Decimal },
    Recurring,
    Correction,
    Refund,
    CapitalExpense,
}

impl Condition {
    fn holds(&self, amount: Decimal, indicators: &Indicators) -> bool {
        match self {
            Condition::AmountAbove { amount: limit } => amount > *limit,
            Condition::Recurring => indicators.recurring,
            Condition::Correction => indicators.correction,
            Condition::Refund => indicators.refund,
            Condition::CapitalExpense => indicators.capital_expense,
        }
    }
}

/// Confidence adjustment applied when `condition` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRule {
    #[serde(flatten)]
    pub condition: Condition,
    pub adjustment: f64,
    #[serde(default)]
    pub reason: String,
}

impl ContextRule {
    pub fn new(condition: Condition, adjustment: f64, reason: &str) -> Self {
        Self {
            condition,
            adjustment,
            reason: reason.to_string(),
        }
    }
}

/// A known kind of transaction and the posting it implies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCategory {
    pub name: String,
    pub keywords: Vec<String>,
    pub debit: RoleTarget,
    pub credit: RoleTarget,
    /// Amount at or above which the debit side is capitalized.
    #[serde(default)]
    pub amount_threshold: Option<Decimal>,
    #[serde(default)]
    pub confidence_boost: f64,
    #[serde(default)]
    pub rules: Vec<ContextRule>,
}

impl TransactionCategory {
    fn new(name: &str, keywords: &[&str], debit: RoleTarget, credit: RoleTarget) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            debit,
            credit,
            amount_threshold: None,
            confidence_boost: 0.0,
            rules: Vec::new(),
        }
    }

    fn threshold(mut self, amount: Decimal) -> Self {
        self.amount_threshold = Some(amount);
        self
    }

    fn boost(mut self, boost: f64) -> Self {
        self.confidence_boost = boost;
        self
    }

    fn rule(mut self, rule: ContextRule) -> Self {
        self.rules.push(rule);
        self
    }

    fn reaches_threshold(&self, amount: Decimal) -> bool {
        self.amount_threshold.is_some_and(|t| amount.abs() >= t)
    }

    /// Keyword hits in the normalized description, plus the threshold bonus.
    pub fn match_score(&self, normalized: &str, amount: Decimal) -> f64 {
        let hits = self
            .keywords
            .iter()
            .filter(|k| normalized.contains(k.to_lowercase().as_str()))
            .count();
        let bonus = if self.reaches_threshold(amount) {
            THRESHOLD_SCORE_BONUS
        } else {
            0.0
        };
        hits as f64 + bonus
    }
}

/// The categories every analyzer starts with, in tie-break order.
pub fn builtin_categories() -> Vec<TransactionCategory> {
    use AccountSubtype::*;
    use AccountType::*;

    vec![
        TransactionCategory::new(
            "Employee Compensation",
            &["salary", "wage", "payroll", "bonus", "incentive payout", "commission"],
            RoleTarget::new(Expense, OperatingExpense),
            RoleTarget::new(Liability, CurrentLiability),
        )
        .boost(0.2)
        .rule(ContextRule::new(
            Condition::AmountAbove {
                amount: HIGH_VALUE_THRESHOLD,
            },
            -0.1,
            "Unusually high amount for employee payment",
        ))
        .rule(ContextRule::new(
            Condition::Recurring,
            0.2,
            "Recurring employee payment pattern",
        )),
        TransactionCategory::new(
            "Fixed Assets",
            &["furniture", "equipment", "vehicle", "machinery", "computer"],
            RoleTarget::new(Asset, NonCurrentAsset),
            RoleTarget::new(Liability, CurrentLiability),
        )
        .threshold(CAPITALIZATION_THRESHOLD)
        .rule(ContextRule::new(
            Condition::AmountAbove {
                amount: CAPITALIZATION_THRESHOLD,
            },
            0.2,
            "Amount exceeds capitalization threshold",
        ))
        .rule(ContextRule::new(
            Condition::CapitalExpense,
            0.3,
            "Clear capital expense indicators",
        )),
        TransactionCategory::new(
            "Financial Transactions",
            &["loan", "interest", "repayment", "credit card", "debt"],
            RoleTarget::new(Liability, CurrentLiability),
            RoleTarget::new(Asset, CurrentAsset),
        )
        .rule(ContextRule::new(
            Condition::Recurring,
            0.15,
            "Regular financial payment pattern",
        )),
        TransactionCategory::new(
            "Customer Receipts",
            &["receipt", "customer", "sale", "invoice", "revenue"],
            RoleTarget::new(Asset, CurrentAsset),
            RoleTarget::new(Revenue, OperatingRevenue),
        ),
        TransactionCategory::new(
            "Vendor Bills",
            &["bill", "vendor", "supplier", "utilities", "rent"],
            RoleTarget::new(Expense, OperatingExpense),
            RoleTarget::new(Liability, CurrentLiability),
        ),
    ]
}

/// Confidence components of a classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub keyword_match: f64,
    pub amount_match: f64,
    pub context_match: f64,
    pub total: f64,
}

/// Classification of one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionAnalysis {
    pub normalized_description: String,
    pub keywords: Vec<String>,
    pub indicators: Indicators,
    /// Matched category name, `None` for the fallback classification.
    pub category: Option<String>,
    pub debit: RoleTarget,
    pub credit: RoleTarget,
    pub confidence: ConfidenceBreakdown,
    pub debit_reasoning: Vec<String>,
    pub credit_reasoning: Vec<String>,
}

impl TransactionAnalysis {
    pub fn total_confidence(&self) -> f64 {
        self.confidence.total
    }
}

#[derive(Debug, Clone)]
pub struct TransactionAnalyzer {
    categories: Vec<TransactionCategory>,
}

impl Default for TransactionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionAnalyzer {
    pub fn new() -> Self {
        Self {
            categories: builtin_categories(),
        }
    }

    /// Built-in categories followed by `extra`, which therefore lose ties.
    pub fn with_categories(extra: Vec<TransactionCategory>) -> Self {
        let mut categories = builtin_categories();
        categories.extend(extra);
        Self { categories }
    }

    pub fn categories(&self) -> &[TransactionCategory] {
        &self.categories
    }

    pub fn analyze(&self, transaction: &Transaction) -> TransactionAnalysis {
        let normalized = normalize_description(&transaction.description);
        let amount = transaction.amount_or_zero();
        let keywords = extract_keywords(&normalized);
        let indicators = Indicators::detect(&normalized, amount);

        let Some(category) = self.best_category(&normalized, amount) else {
            return TransactionAnalysis {
                normalized_description: normalized,
                keywords,
                indicators,
                category: None,
                debit: RoleTarget::new(AccountType::Expense, AccountSubtype::OperatingExpense),
                credit: RoleTarget::new(AccountType::Liability, AccountSubtype::CurrentLiability),
                confidence: ConfidenceBreakdown {
                    total: FALLBACK_CONFIDENCE,
                    ..Default::default()
                },
                debit_reasoning: vec![
                    "No specific category match found".to_string(),
                    "Using default expense classification".to_string(),
                ],
                credit_reasoning: vec![
                    "Default liability account for unmatched transaction".to_string(),
                ],
            };
        };

        let confidence = confidence_scores(category, &keywords, amount, &indicators);
        let debit = if category.reaches_threshold(amount) {
            RoleTarget::new(AccountType::Asset, AccountSubtype::NonCurrentAsset)
        } else {
            category.debit
        };

        let mut context = Vec::new();
        if indicators.recurring {
            context.push("Recurring transaction pattern detected".to_string());
        }
        if indicators.capital_expense {
            context.push("Capital expense indicators detected".to_string());
        }
        let mut debit_reasoning = vec![format!("Debit account type: {debit}")];
        debit_reasoning.extend(context.iter().cloned());
        let mut credit_reasoning = vec![format!("Credit account type: {}", category.credit)];
        credit_reasoning.extend(context);

        TransactionAnalysis {
            normalized_description: normalized,
            keywords,
            indicators,
            category: Some(category.name.clone()),
            debit,
            credit: category.credit,
            confidence,
            debit_reasoning,
            credit_reasoning,
        }
    }

    fn best_category(&self, normalized: &str, amount: Decimal) -> Option<&TransactionCategory> {
        let mut best = None;
        let mut best_score = 0.0;
        for category in &self.categories {
            let score = category.match_score(normalized, amount);
            if score > best_score {
                best_score = score;
                best = Some(category);
            }
        }
        best
    }
}

/// Words longer than two characters, minus stop words.
pub fn extract_keywords(normalized: &str) -> Vec<String> {
    normalized
        .split(' ')
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn confidence_scores(
    category: &TransactionCategory,
    keywords: &[String],
    amount: Decimal,
    indicators: &Indicators,
) -> ConfidenceBreakdown {
    let matches = keywords
        .iter()
        .filter(|k| category.keywords.contains(k))
        .count();
    let keyword_match = (matches as f64 * KEYWORD_CONFIDENCE_STEP).min(KEYWORD_CONFIDENCE_CAP);
    let amount_match = if category.reaches_threshold(amount) {
        AMOUNT_CONFIDENCE
    } else {
        0.0
    };
    let context_match = category
        .rules
        .iter()
        .filter(|r| r.condition.holds(amount, indicators))
        .map(|r| r.adjustment)
        .sum::<f64>();
    let total = clamp_confidence(
        keyword_match + amount_match + context_match + category.confidence_boost,
    );

    ConfidenceBreakdown {
        keyword_match,
        amount_match,
        context_match,
        total,
    }
}
