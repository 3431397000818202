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

//! Accounting rules: amount sanity, type pairing, normal balances and contra accounts.
//!
//! The helper predicates ([`check_combination`], [`contra_policy`], ...) are plain
//! functions so they can be exercised without building a validation context.

use super::{
    ACCOUNT_TYPE, ACCOUNT_TYPE_COMPATIBILITY, CONTRA_ACCOUNT, DEBIT_CREDIT_EQUALITY,
    SIGN_CONVENTION, TRANSACTION_STRUCTURE,
};
use crate::account::{Account, AccountSubtype, AccountType};
use crate::base::{RuleId, Side};
use crate::error::RuleFault;
use crate::validation::{ValidationContext, ValidationLevel, ValidationResult, ValidationRule};
use rust_decimal::Decimal;

/// Maximum number of fractional digits before a precision warning.
pub const MAX_AMOUNT_SCALE: u32 = 2;

const BOTH: &[Side] = &[Side::Debit, Side::Credit];
const DEBIT_ONLY: &[Side] = &[Side::Debit];
const CREDIT_ONLY: &[Side] = &[Side::Credit];

/// Allowed `(source, target, sides the source may take)` pairings.
///
/// A posting matches an entry directly when its debit account is the source,
/// or in reverse when its credit account is the source.
pub const COMBINATIONS: &[(AccountType, AccountType, &[Side])] = &[
    (AccountType::Asset, AccountType::Asset, BOTH),
    (AccountType::Asset, AccountType::Liability, BOTH),
    (AccountType::Asset, AccountType::Equity, BOTH),
    (AccountType::Asset, AccountType::Revenue, BOTH),
    (AccountType::Asset, AccountType::Expense, BOTH),
    (AccountType::Liability, AccountType::Liability, BOTH),
    (AccountType::Liability, AccountType::Equity, DEBIT_ONLY),
    (AccountType::Revenue, AccountType::Liability, CREDIT_ONLY),
    (AccountType::Expense, AccountType::Liability, DEBIT_ONLY),
    (AccountType::Equity, AccountType::Equity, BOTH),
    (AccountType::Revenue, AccountType::Equity, DEBIT_ONLY),
    (AccountType::Equity, AccountType::Expense, DEBIT_ONLY),
];

/// Why a type pairing was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationFault {
    /// No table entry in either direction.
    Unknown,
    /// Entry found directly, but the debit account may not be debited.
    Debit,
    /// Entry found in reverse, but the credit account may not be credited.
    Credit,
}

fn lookup(source: AccountType, target: AccountType) -> Option<&'static [Side]> {
    COMBINATIONS
        .iter()
        .find(|(s, t, _)| *s == source && *t == target)
        .map(|(_, _, sides)| *sides)
}

/// Checks a `(debit type, credit type)` pairing against [`COMBINATIONS`].
pub fn check_combination(debit: AccountType, credit: AccountType) -> Result<(), CombinationFault> {
    if let Some(sides) = lookup(debit, credit) {
        return if sides.contains(&Side::Debit) {
            Ok(())
        } else {
            Err(CombinationFault::Debit)
        };
    }
    if let Some(sides) = lookup(credit, debit) {
        return if sides.contains(&Side::Credit) {
            Ok(())
        } else {
            Err(CombinationFault::Credit)
        };
    }
    Err(CombinationFault::Unknown)
}

/// Subtypes a contra account may carry under its parent type, and the
/// contra account's own normal balance. `None` when the type has no contra form.
pub fn contra_policy(account_type: AccountType) -> Option<(&'static [AccountSubtype], Side)> {
    match account_type {
        AccountType::Asset => Some((
            &[
                AccountSubtype::AllowanceDoubtfulAccounts,
                AccountSubtype::AccumulatedDepreciation,
            ],
            Side::Credit,
        )),
        AccountType::Liability => Some((&[AccountSubtype::DiscountBondsPayable], Side::Debit)),
        AccountType::Revenue => Some((
            &[AccountSubtype::SalesReturns, AccountSubtype::SalesDiscounts],
            Side::Debit,
        )),
        AccountType::Expense => Some((
            &[AccountSubtype::PurchaseReturns, AccountSubtype::PurchaseDiscounts],
            Side::Credit,
        )),
        _ => None,
    }
}

fn both_accounts<'a>(
    ctx: &ValidationContext<'a>,
    result: &mut ValidationResult,
) -> Option<(&'a Account, &'a Account)> {
    match (ctx.debit, ctx.credit) {
        (Some(debit), Some(credit)) => Some((debit, credit)),
        _ => {
            result.add_error(
                "MISSING_ACCOUNTS",
                "Both debit and credit accounts are required",
                &["debit_account", "credit_account"],
            );
            None
        }
    }
}

/// Single-amount sanity: positive, at most two decimal places.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebitCreditEquality;

impl ValidationRule for DebitCreditEquality {
    fn id(&self) -> RuleId {
        RuleId::from(DEBIT_CREDIT_EQUALITY)
    }

    fn name(&self) -> &str {
        "Debit/Credit Equality"
    }

    fn description(&self) -> &str {
        "The posted amount must be positive and carry at most two decimal places"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Accounting
    }

    fn priority(&self) -> u32 {
        100
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![RuleId::from(TRANSACTION_STRUCTURE)]
    }

    fn can_override(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let mut result = ValidationResult::new(self.level());
        let Some(amount) = ctx.transaction.amount else {
            result.add_error(
                "INVALID_TRANSACTION_AMOUNT",
                "Transaction amount must be a valid number",
                &["transaction.amount"],
            );
            return Ok(result);
        };
        if amount <= Decimal::ZERO {
            result.add_error(
                "NEGATIVE_OR_ZERO_AMOUNT",
                "Transaction amount must be positive",
                &["transaction.amount"],
            );
        }
        if amount.normalize().scale() > MAX_AMOUNT_SCALE {
            result.add_warning(
                "AMOUNT_PRECISION_WARNING",
                "Transaction amount should have at most 2 decimal places",
                &["transaction.amount"],
            );
        }
        Ok(result)
    }
}

/// The pair of account types must appear in [`COMBINATIONS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountTypeCompatibility;

impl ValidationRule for AccountTypeCompatibility {
    fn id(&self) -> RuleId {
        RuleId::from(ACCOUNT_TYPE_COMPATIBILITY)
    }

    fn name(&self) -> &str {
        "Account Type Compatibility"
    }

    fn description(&self) -> &str {
        "Debit and credit account types must form an allowed combination"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Accounting
    }

    fn priority(&self) -> u32 {
        90
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![
            RuleId::from(ACCOUNT_TYPE),
            RuleId::from(DEBIT_CREDIT_EQUALITY),
        ]
    }

    fn can_override(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let mut result = ValidationResult::new(self.level());
        let Some((debit, credit)) = both_accounts(ctx, &mut result) else {
            return Ok(result);
        };

        if debit.id == credit.id {
            result.add_error(
                "SAME_ACCOUNT",
                "Debit and credit accounts cannot be the same",
                &["debit_account", "credit_account"],
            );
            return Ok(result);
        }

        let (debit_type, credit_type) = (debit.account_type, credit.account_type);
        match check_combination(debit_type, credit_type) {
            Ok(()) => {}
            Err(CombinationFault::Unknown) => result.add_error(
                "INVALID_ACCOUNT_COMBINATION",
                format!(
                    "Invalid combination of account types: {debit_type} (debit) and {credit_type} (credit)"
                ),
                &["debit_account.type", "credit_account.type"],
            ),
            Err(CombinationFault::Debit) => result.add_error(
                "INVALID_DEBIT_OPERATION",
                format!(
                    "Account type {debit_type} cannot be debited in combination with {credit_type}"
                ),
                &["debit_account.type"],
            ),
            Err(CombinationFault::Credit) => result.add_error(
                "INVALID_CREDIT_OPERATION",
                format!(
                    "Account type {credit_type} cannot be credited in combination with {debit_type}"
                ),
                &["credit_account.type"],
            ),
        }
        Ok(result)
    }
}

/// Warns when an account is touched on its non-normal side, or when both
/// sides share a type. Contra accounts are judged by their own normal balance.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignConvention;

impl ValidationRule for SignConvention {
    fn id(&self) -> RuleId {
        RuleId::from(SIGN_CONVENTION)
    }

    fn name(&self) -> &str {
        "Sign Convention"
    }

    fn description(&self) -> &str {
        "Accounts should be touched on their normal balance side"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Accounting
    }

    fn priority(&self) -> u32 {
        85
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![RuleId::from(ACCOUNT_TYPE_COMPATIBILITY)]
    }

    fn can_override(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let mut result = ValidationResult::new(self.level());
        let Some((debit, credit)) = both_accounts(ctx, &mut result) else {
            return Ok(result);
        };

        let normal = |account: &Account| {
            account.effective_normal_balance().ok_or_else(|| {
                RuleFault::new(format!("Invalid account type: {}", account.account_type))
            })
        };

        if normal(debit)? != Side::Debit {
            result.add_warning(
                "ABNORMAL_DEBIT",
                format!(
                    "Debiting account {} ({}) with normal credit balance",
                    debit.code, debit.account_type
                ),
                &["debit_account"],
            );
        }
        if normal(credit)? != Side::Credit {
            result.add_warning(
                "ABNORMAL_CREDIT",
                format!(
                    "Crediting account {} ({}) with normal debit balance",
                    credit.code, credit.account_type
                ),
                &["credit_account"],
            );
        }
        if debit.account_type == credit.account_type {
            result.add_warning(
                "SAME_TYPE_TRANSACTION",
                format!("Transaction between accounts of same type ({})", debit.account_type),
                &["debit_account.type", "credit_account.type"],
            );
        }
        Ok(result)
    }
}

/// Contra accounts carry an allowed subtype and move in their own direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContraAccount;

impl ContraAccount {
    fn check_account(result: &mut ValidationResult, account: &Account, side: Side) {
        let field = format!("{side}_account");
        let Some((subtypes, normal)) = contra_policy(account.account_type) else {
            result.add_error(
                "INVALID_CONTRA_ACCOUNT_TYPE",
                format!("Invalid contra account type: {}", account.account_type),
                &[field.as_str()],
            );
            return;
        };
        if !subtypes.contains(&account.subtype) {
            result.add_error(
                "INVALID_CONTRA_ACCOUNT_SUBTYPE",
                format!(
                    "Invalid contra account subtype: {} for type {}",
                    account.subtype, account.account_type
                ),
                &[field.as_str()],
            );
            return;
        }
        if side != normal {
            result.add_warning(
                "CONTRA_ACCOUNT_UNUSUAL_DIRECTION",
                format!(
                    "Unusual {side} entry for contra account {} (normal balance is {normal})",
                    account.code
                ),
                &[field.as_str()],
            );
        }
    }
}

impl ValidationRule for ContraAccount {
    fn id(&self) -> RuleId {
        RuleId::from(CONTRA_ACCOUNT)
    }

    fn name(&self) -> &str {
        "Contra Account"
    }

    fn description(&self) -> &str {
        "Contra accounts must use an allowed subtype and their own normal balance"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Accounting
    }

    fn priority(&self) -> u32 {
        80
    }

    fn dependencies(&self) -> Vec<RuleId> {
        vec![RuleId::from(SIGN_CONVENTION)]
    }

    fn can_override(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
        let mut result = ValidationResult::new(self.level());
        let Some((debit, credit)) = both_accounts(ctx, &mut result) else {
            return Ok(result);
        };

        if debit.is_contra {
            Self::check_account(&mut result, debit, Side::Debit);
        }
        if credit.is_contra {
            Self::check_account(&mut result, credit, Side::Credit);
        }
        if debit.is_contra && credit.is_contra {
            result.add_warning(
                "CONTRA_ACCOUNT_INTERACTION",
                "Transaction between two contra accounts",
                &["debit_account", "credit_account"],
            );
        }
        Ok(result)
    }
}
