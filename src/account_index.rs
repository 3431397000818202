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

//! Read-only index over a chart-of-accounts snapshot.
//!
//! Built once per (re)initialization and never mutated afterwards, so it is
//! shared across threads behind an `Arc` without locking.

use crate::account::{Account, AccountSubtype, AccountType};
use crate::base::AccountId;
use crate::error::EngineError;
use crate::mapping::normalize_description;
use regex::Regex;
use std::collections::HashMap;

/// Separator between hierarchy levels in an account code.
pub const CODE_SEPARATOR: char = '.';

#[derive(Debug, Clone)]
pub struct AccountIndex {
    accounts: Vec<Account>,
    by_id: HashMap<AccountId, usize>,
    /// Active accounts only, ordered by code.
    by_type: HashMap<AccountType, Vec<usize>>,
    /// Active accounts only, ordered by code.
    by_subtype: HashMap<AccountSubtype, Vec<usize>>,
    /// Active accounts only.
    by_code: HashMap<String, usize>,
    /// Parent code -> child positions ordered by code. Covers inactive accounts too.
    children: HashMap<String, Vec<usize>>,
    /// Normalized description patterns per account position.
    patterns: Vec<Vec<String>>,
    /// Matches the account code as a standalone numeric token.
    code_tokens: Vec<Option<Regex>>,
}

impl AccountIndex {
    /// Indexes `accounts`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoAccountsProvided`] when the snapshot is empty.
    /// - [`EngineError::DuplicateAccount`] when two accounts share an id.
    /// - [`EngineError::DuplicateAccountCode`] when two active accounts share a
    ///   code. An inactive account may reuse a code.
    pub fn build(accounts: Vec<Account>) -> Result<Self, EngineError> {
        if accounts.is_empty() {
            return Err(EngineError::NoAccountsProvided);
        }

        let mut by_id = HashMap::with_capacity(accounts.len());
        let mut by_type: HashMap<AccountType, Vec<usize>> = HashMap::new();
        let mut by_subtype: HashMap<AccountSubtype, Vec<usize>> = HashMap::new();
        let mut by_code = HashMap::new();
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();

        for (pos, account) in accounts.iter().enumerate() {
            if by_id.insert(account.id.clone(), pos).is_some() {
                return Err(EngineError::DuplicateAccount(account.id.clone()));
            }

            if let Some(parent) = parent_code(&account.code) {
                children.entry(parent.to_string()).or_default().push(pos);
            }

            if !account.is_active {
                continue;
            }
            by_type.entry(account.account_type).or_default().push(pos);
            by_subtype.entry(account.subtype).or_default().push(pos);
            if by_code.insert(account.code.clone(), pos).is_some() {
                return Err(EngineError::DuplicateAccountCode(account.code.clone()));
            }
        }

        let by_code_order = |list: &mut Vec<usize>| {
            list.sort_by(|a, b| accounts[*a].code.cmp(&accounts[*b].code));
        };
        by_type.values_mut().for_each(by_code_order);
        by_subtype.values_mut().for_each(by_code_order);
        children.values_mut().for_each(by_code_order);

        let patterns = accounts.iter().map(account_patterns).collect();
        let code_tokens = accounts
            .iter()
            .map(|a| code_token_regex(&a.code))
            .collect();

        Ok(Self {
            accounts,
            by_id,
            by_type,
            by_subtype,
            by_code,
            children,
            patterns,
            code_tokens,
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Every account in the snapshot, including inactive ones, in input order.
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn get(&self, id: &AccountId) -> Option<&Account> {
        self.by_id.get(id).map(|pos| &self.accounts[*pos])
    }

    /// Active account with this exact code.
    pub fn by_code(&self, code: &str) -> Option<&Account> {
        self.by_code.get(code).map(|pos| &self.accounts[*pos])
    }

    pub fn by_type(&self, account_type: AccountType) -> Vec<&Account> {
        self.resolve(self.by_type.get(&account_type))
    }

    pub fn by_subtype(&self, subtype: AccountSubtype) -> Vec<&Account> {
        self.resolve(self.by_subtype.get(&subtype))
    }

    /// Active candidates for a role: the subtype bucket when it is non-empty,
    /// otherwise every active account of the type.
    pub fn candidates(
        &self,
        account_type: AccountType,
        subtype: Option<AccountSubtype>,
    ) -> Vec<&Account> {
        let by_subtype = subtype
            .map(|s| {
                self.by_subtype(s)
                    .into_iter()
                    .filter(|a| a.account_type == account_type)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !by_subtype.is_empty() {
            return by_subtype;
        }
        self.by_type(account_type)
    }

    pub fn children_of(&self, code: &str) -> Vec<&Account> {
        self.resolve(self.children.get(code))
    }

    /// Description patterns generated for `account`, empty if it is not indexed.
    pub fn patterns(&self, id: &AccountId) -> &[String] {
        self.by_id
            .get(id)
            .map(|pos| self.patterns[*pos].as_slice())
            .unwrap_or(&[])
    }

    /// Whether the account's code appears in `text` with no digit on either side.
    pub fn code_appears_in(&self, id: &AccountId, text: &str) -> bool {
        self.by_id
            .get(id)
            .and_then(|pos| self.code_tokens[*pos].as_ref())
            .is_some_and(|re| re.is_match(text))
    }

    fn resolve(&self, positions: Option<&Vec<usize>>) -> Vec<&Account> {
        positions
            .map(|list| list.iter().map(|pos| &self.accounts[*pos]).collect())
            .unwrap_or_default()
    }
}

/// Parent code under the separator convention: "1000.100" -> "1000".
pub fn parent_code(code: &str) -> Option<&str> {
    match code.rfind(CODE_SEPARATOR) {
        Some(pos) if pos > 0 => Some(&code[..pos]),
        _ => None,
    }
}

/// Depth of a code in the hierarchy, 1 for top-level codes.
pub fn hierarchy_level(code: &str) -> usize {
    code.split(CODE_SEPARATOR).count()
}

fn code_token_regex(code: &str) -> Option<Regex> {
    if code.trim().is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?:^|\D){}(?:\D|$)", regex::escape(code.trim()))).ok()
}

fn type_patterns(account_type: AccountType) -> &'static [&'static str] {
    match account_type {
        AccountType::Asset => &["purchase", "buy", "acquire", "investment"],
        AccountType::Liability => &["loan", "borrow", "credit", "debt"],
        AccountType::Revenue => &["revenue", "income", "earn", "receive"],
        AccountType::Expense => &["expense", "cost", "pay", "spend"],
        AccountType::Equity => &["capital", "equity", "owner", "share"],
        AccountType::Production | AccountType::Memo | AccountType::Off => &[],
    }
}

fn subtype_patterns(subtype: AccountSubtype) -> &'static [&'static str] {
    match subtype {
        AccountSubtype::CurrentAsset => &["deposit", "receivable", "petty"],
        AccountSubtype::NonCurrentAsset => &["equipment", "furniture", "vehicle", "machinery"],
        AccountSubtype::CurrentLiability => &["bill", "payable", "vendor", "supplier", "payroll"],
        AccountSubtype::NonCurrentLiability => &["mortgage", "bond", "long term"],
        AccountSubtype::OperatingRevenue => &["sale", "sales", "service", "invoice"],
        AccountSubtype::OperatingExpense => &["rent", "utilities", "salary", "wage", "supplies"],
        AccountSubtype::AccumulatedDepreciation => &["depreciation"],
        _ => &[],
    }
}

fn account_patterns(account: &Account) -> Vec<String> {
    let mut patterns = vec![
        normalize_description(&account.name),
        normalize_description(&account.code),
    ];
    patterns.extend(type_patterns(account.account_type).iter().map(|p| p.to_string()));
    patterns.extend(subtype_patterns(account.subtype).iter().map(|p| p.to_string()));
    patterns.retain(|p| !p.is_empty());
    patterns
}
