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

//! Which side of a posting an account may take.
//!
//! An account normally takes the side of its normal balance. The opposite side
//! is accepted only for transactions recognised from their description:
//!
//! | Account type | Opposite side | Accepted for                          |
//! |--------------|---------------|---------------------------------------|
//! | asset        | credit        | sale, depreciation, adjustment, payment |
//! | liability    | debit         | payment, adjustment                   |
//! | revenue      | debit         | never                                 |
//! | expense      | credit        | never                                 |
//!
//! Equity may take either side. Contra accounts are judged against their
//! parent type with the side inverted.

use crate::account::{Account, AccountType};
use crate::base::Side;
use serde::Serialize;
use std::fmt;

/// A transaction kind that lets an account take its opposite side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleException {
    Sale,
    Depreciation,
    Adjustment,
    Payment,
}

impl RoleException {
    fn keywords(self) -> &'static [&'static str] {
        match self {
            RoleException::Sale => &["sale", "sold"],
            RoleException::Depreciation => &["depreciation"],
            RoleException::Adjustment => &["adjust"],
            RoleException::Payment => &["payment", "paid"],
        }
    }

    /// Whether a lower-cased description names this kind of transaction.
    pub fn applies_to(self, description: &str) -> bool {
        self.keywords().iter().any(|k| description.contains(k))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoleException::Sale => "sale",
            RoleException::Depreciation => "depreciation",
            RoleException::Adjustment => "adjustment",
            RoleException::Payment => "payment",
        }
    }
}

impl fmt::Display for RoleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one side of a proposed posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "exception", rename_all = "lowercase")]
pub enum RoleCheck {
    /// The account's normal side.
    Normal,
    /// The opposite side, accepted for this kind of transaction.
    Exception(RoleException),
    /// The opposite side with nothing in the transaction to justify it.
    Unsupported,
}

impl RoleCheck {
    pub fn is_supported(self) -> bool {
        self != RoleCheck::Unsupported
    }
}

fn exceptions_for(account_type: AccountType, side: Side) -> &'static [RoleException] {
    use RoleException::*;
    match (account_type, side) {
        (AccountType::Asset, Side::Credit) => &[Sale, Depreciation, Adjustment, Payment],
        (AccountType::Liability, Side::Debit) => &[Payment, Adjustment],
        _ => &[],
    }
}

/// Checks `account` taking `side` in a transaction described by `description`.
pub fn check_role(account: &Account, side: Side, description: &str) -> RoleCheck {
    if account.account_type == AccountType::Equity {
        return RoleCheck::Normal;
    }
    if account.effective_normal_balance() == Some(side) {
        return RoleCheck::Normal;
    }
    let type_side = if account.is_contra { side.opposite() } else { side };
    let text = description.to_lowercase();
    exceptions_for(account.account_type, type_side)
        .iter()
        .copied()
        .find(|exception| exception.applies_to(&text))
        .map_or(RoleCheck::Unsupported, RoleCheck::Exception)
}

/// Reasoning line for a non-normal side, if any.
pub fn describe(account: &Account, side: Side, check: RoleCheck) -> Option<String> {
    match check {
        RoleCheck::Normal => None,
        RoleCheck::Exception(exception) => Some(format!(
            "{} to {} account accepted for {exception}",
            side_title(side),
            account.account_type
        )),
        RoleCheck::Unsupported => Some(format!(
            "{} to {} account is unusual for this transaction",
            side_title(side),
            account.account_type
        )),
    }
}

fn side_title(side: Side) -> &'static str {
    match side {
        Side::Debit => "Debit",
        Side::Credit => "Credit",
    }
}
