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

//! Chart-of-accounts records.
//!
//! One [`Account`] shape serves both the mapping engine (default flag, code
//! hierarchy) and the validation rules (type, subtype, contra flag).
//!
//! # Example
//!
//! ```
//! use posting_engine::{Account, AccountSubtype, AccountType, Side};
//!
//! let cash = Account::new("cash", "1100", "Cash", AccountType::Asset, AccountSubtype::CurrentAsset);
//! assert_eq!(cash.normal_balance(), Some(Side::Debit));
//! assert!(cash.subtype_is_consistent());
//! ```

use crate::base::{AccountId, Side};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account classification.
///
/// The first five are the posting types; `Production`, `Memo` and `Off` are
/// carried by some charts but never take part in a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    #[serde(alias = "income")]
    Revenue,
    Expense,
    Production,
    Memo,
    Off,
}

impl AccountType {
    pub const POSTING: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    pub fn is_posting(self) -> bool {
        Self::POSTING.contains(&self)
    }

    /// Side on which this type ordinarily increases. `None` for non-posting types.
    pub fn normal_balance(self) -> Option<Side> {
        match self {
            AccountType::Asset | AccountType::Expense => Some(Side::Debit),
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                Some(Side::Credit)
            }
            AccountType::Production | AccountType::Memo | AccountType::Off => None,
        }
    }

    /// The closed subtype vocabulary for this type.
    pub fn valid_subtypes(self) -> &'static [AccountSubtype] {
        use AccountSubtype::*;
        match self {
            AccountType::Asset => &[
                CurrentAsset,
                NonCurrentAsset,
                AccumulatedDepreciation,
                AllowanceDoubtfulAccounts,
            ],
            AccountType::Liability => &[
                CurrentLiability,
                NonCurrentLiability,
                DiscountBondsPayable,
            ],
            AccountType::Equity => &[ContributedCapital, RetainedEarnings],
            AccountType::Revenue => &[OperatingRevenue, OtherRevenue, SalesReturns, SalesDiscounts],
            AccountType::Expense => &[
                OperatingExpense,
                OtherExpense,
                PurchaseReturns,
                PurchaseDiscounts,
            ],
            AccountType::Production | AccountType::Memo | AccountType::Off => {
                &[Header, Group, Detail]
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
            AccountType::Production => "production",
            AccountType::Memo => "memo",
            AccountType::Off => "off",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "equity" => Ok(AccountType::Equity),
            "revenue" | "income" => Ok(AccountType::Revenue),
            "expense" => Ok(AccountType::Expense),
            "production" => Ok(AccountType::Production),
            "memo" => Ok(AccountType::Memo),
            "off" => Ok(AccountType::Off),
            other => Err(format!("unknown account type: '{other}'")),
        }
    }
}

/// Account subtype. Which subtypes are legal depends on the [`AccountType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountSubtype {
    CurrentAsset,
    NonCurrentAsset,
    AccumulatedDepreciation,
    AllowanceDoubtfulAccounts,
    CurrentLiability,
    NonCurrentLiability,
    DiscountBondsPayable,
    ContributedCapital,
    RetainedEarnings,
    OperatingRevenue,
    OtherRevenue,
    SalesReturns,
    SalesDiscounts,
    OperatingExpense,
    OtherExpense,
    PurchaseReturns,
    PurchaseDiscounts,
    Header,
    Group,
    Detail,
}

impl AccountSubtype {
    const NAMES: [(AccountSubtype, &'static str); 20] = [
        (AccountSubtype::CurrentAsset, "current-asset"),
        (AccountSubtype::NonCurrentAsset, "non-current-asset"),
        (AccountSubtype::AccumulatedDepreciation, "accumulated-depreciation"),
        (AccountSubtype::AllowanceDoubtfulAccounts, "allowance-doubtful-accounts"),
        (AccountSubtype::CurrentLiability, "current-liability"),
        (AccountSubtype::NonCurrentLiability, "non-current-liability"),
        (AccountSubtype::DiscountBondsPayable, "discount-bonds-payable"),
        (AccountSubtype::ContributedCapital, "contributed-capital"),
        (AccountSubtype::RetainedEarnings, "retained-earnings"),
        (AccountSubtype::OperatingRevenue, "operating-revenue"),
        (AccountSubtype::OtherRevenue, "other-revenue"),
        (AccountSubtype::SalesReturns, "sales-returns"),
        (AccountSubtype::SalesDiscounts, "sales-discounts"),
        (AccountSubtype::OperatingExpense, "operating-expense"),
        (AccountSubtype::OtherExpense, "other-expense"),
        (AccountSubtype::PurchaseReturns, "purchase-returns"),
        (AccountSubtype::PurchaseDiscounts, "purchase-discounts"),
        (AccountSubtype::Header, "header"),
        (AccountSubtype::Group, "group"),
        (AccountSubtype::Detail, "detail"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(subtype, _)| *subtype == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for AccountSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountSubtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(subtype, _)| *subtype)
            .ok_or_else(|| format!("unknown account subtype: '{}'", s.trim()))
    }
}

fn default_active() -> bool {
    true
}

/// A chart-of-accounts entry. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique within a standard; `.` separates hierarchy levels ("1000.100").
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub subtype: AccountSubtype,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_contra: bool,
    /// Default account for its type, preferred by the ranking.
    #[serde(default)]
    pub is_default: bool,
}

impl Account {
    pub fn new(
        id: &str,
        code: &str,
        name: &str,
        account_type: AccountType,
        subtype: AccountSubtype,
    ) -> Self {
        Account {
            id: AccountId::new(id),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            subtype,
            is_active: true,
            is_contra: false,
            is_default: false,
        }
    }

    pub fn contra(mut self) -> Self {
        self.is_contra = true;
        self
    }

    pub fn default_for_type(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Normal balance of the account type, ignoring the contra flag.
    pub fn normal_balance(&self) -> Option<Side> {
        self.account_type.normal_balance()
    }

    /// Normal balance of this particular account: the inverse of its type's
    /// side when it is a contra account.
    pub fn effective_normal_balance(&self) -> Option<Side> {
        let side = self.account_type.normal_balance()?;
        Some(if self.is_contra { side.opposite() } else { side })
    }

    pub fn subtype_is_consistent(&self) -> bool {
        self.account_type.valid_subtypes().contains(&self.subtype)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}/{})", self.code, self.name, self.account_type, self.subtype)
    }
}
