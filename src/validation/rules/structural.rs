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

//! Structural rules: the posting is well-formed. None of them can be overridden.

use super::{ACCOUNT_EXISTENCE, ACCOUNT_TYPE, TRANSACTION_STRUCTURE};
use crate::account::Account;
use crate::base::{RuleId, Side};
use crate::error::RuleFault;
use crate::validation::{ValidationContext, ValidationLevel, ValidationResult, ValidationRule};
use rust_decimal::Decimal;

/// Descriptions shorter than this draw a warning.
pub const MIN_DESCRIPTION_LEN: usize = 3;

/// Both sides of the posting reference an account.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountExistence;

impl ValidationRule for AccountExistence {
    fn id(&self) -> RuleId {
        RuleId::from(ACCOUNT_EXISTENCE)
    }

    fn name(&self) -> &str {
        "Account Existence"
    }

    fn description(&self) -> &str {
        "Both debit and credit accounts must exist"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Structural
    }

    fn priority(&self) -> u32 {
        100
    }

    fn can_override(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let mut result = ValidationResult::new(self.level());
        if ctx.debit.is_none() {
            result.add_error(
                "DEBIT_ACCOUNT_MISSING",
                "Debit account does not exist",
                &["debit_account"],
            );
        }
        if ctx.credit.is_none() {
            result.add_error(
                "CREDIT_ACCOUNT_MISSING",
                "Credit account does not exist",
                &["credit_account"],
            );
        }
        Ok(result)
    }
}

/// Required transaction fields are present and the amount is positive.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionStructure;

impl ValidationRule for TransactionStructure {
    fn id(&self) -> RuleId {
        RuleId::from(TRANSACTION_STRUCTURE)
    }

    fn name(&self) -> &str {
        "Transaction Structure"
    }

    fn description(&self) -> &str {
        "Transaction id, date and a positive amount are required"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Structural
    }

    fn priority(&self) -> u32 {
        95
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![RuleId::from(ACCOUNT_EXISTENCE)]
    }

    fn can_override(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let tx = ctx.transaction;
        let mut result = ValidationResult::new(self.level());

        if tx.id.is_empty() {
            result.add_error(
                "TRANSACTION_ID_MISSING",
                "Transaction ID is required",
                &["transaction.id"],
            );
        }
        if tx.date.is_none() {
            result.add_error(
                "TRANSACTION_DATE_MISSING",
                "Transaction date is required",
                &["transaction.date"],
            );
        }
        match tx.amount {
            None => result.add_error(
                "TRANSACTION_AMOUNT_MISSING",
                "Transaction amount is required",
                &["transaction.amount"],
            ),
            Some(amount) if amount <= Decimal::ZERO => result.add_error(
                "TRANSACTION_AMOUNT_NEGATIVE",
                "Transaction amount must be positive",
                &["transaction.amount"],
            ),
            Some(_) => {}
        }

        let description = tx.description.trim();
        if description.is_empty() {
            result.add_warning(
                "TRANSACTION_DESCRIPTION_MISSING",
                "Transaction description is recommended",
                &["transaction.description"],
            );
        } else if description.chars().count() < MIN_DESCRIPTION_LEN {
            result.add_warning(
                "TRANSACTION_DESCRIPTION_TOO_SHORT",
                "Transaction description should be more descriptive",
                &["transaction.description"],
            );
        }

        Ok(result)
    }
}

/// Each account is of a posting type and carries a subtype legal for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountTypeCheck;

impl AccountTypeCheck {
    fn check_account(result: &mut ValidationResult, account: &Account, side: Side) {
        let prefix = side.as_str().to_uppercase();
        let type_field = format!("{side}_account.type");
        let subtype_field = format!("{side}_account.subtype");

        if !account.account_type.is_posting() {
            result.add_error(
                &format!("{prefix}_INVALID_ACCOUNT_TYPE"),
                format!("Invalid account type: {}", account.account_type),
                &[type_field.as_str()],
            );
            return;
        }
        if !account.subtype_is_consistent() {
            result.add_error(
                &format!("{prefix}_INVALID_TYPE_SUBTYPE_COMBINATION"),
                format!(
                    "Invalid subtype {} for account type {}",
                    account.subtype, account.account_type
                ),
                &[type_field.as_str(), subtype_field.as_str()],
            );
        }
    }
}

impl ValidationRule for AccountTypeCheck {
    fn id(&self) -> RuleId {
        RuleId::from(ACCOUNT_TYPE)
    }

    fn name(&self) -> &str {
        "Account Type"
    }

    fn description(&self) -> &str {
        "Account types and subtypes must be valid and consistent"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Structural
    }

    fn priority(&self) -> u32 {
        90
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![RuleId::from(ACCOUNT_EXISTENCE)]
    }

    fn can_override(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let mut result = ValidationResult::new(self.level());
        if let Some(debit) = ctx.debit {
            Self::check_account(&mut result, debit, Side::Debit);
        }
        if let Some(credit) = ctx.credit {
            Self::check_account(&mut result, credit, Side::Credit);
        }
        Ok(result)
    }
}
