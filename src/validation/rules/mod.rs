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

//! The built-in rule set.
//!
//! | Rule                         | Level      | Priority | Overridable |
//! |------------------------------|------------|----------|-------------|
//! | `account-existence`          | Structural | 100      | no          |
//! | `transaction-structure`      | Structural | 95       | no          |
//! | `account-type`               | Structural | 90       | no          |
//! | `debit-credit-equality`      | Accounting | 100      | no          |
//! | `account-type-compatibility` | Accounting | 90       | yes         |
//! | `sign-convention`            | Accounting | 85       | yes         |
//! | `contra-account`             | Accounting | 80       | yes         |

pub mod accounting;
pub mod structural;

use crate::error::EngineError;
use crate::validation::RuleRegistry;

pub use accounting::{AccountTypeCompatibility, ContraAccount, DebitCreditEquality, SignConvention};
pub use structural::{AccountExistence, AccountTypeCheck, TransactionStructure};

pub const ACCOUNT_EXISTENCE: &str = "account-existence";
pub const TRANSACTION_STRUCTURE: &str = "transaction-structure";
pub const ACCOUNT_TYPE: &str = "account-type";
pub const DEBIT_CREDIT_EQUALITY: &str = "debit-credit-equality";
pub const ACCOUNT_TYPE_COMPATIBILITY: &str = "account-type-compatibility";
pub const SIGN_CONVENTION: &str = "sign-convention";
pub const CONTRA_ACCOUNT: &str = "contra-account";

/// Registry holding every built-in rule, dependencies first, graph checked.
pub fn default_registry() -> Result<RuleRegistry, EngineError> {
    let mut registry = RuleRegistry::new();
    registry.register(AccountExistence)?;
    registry.register(TransactionStructure)?;
    registry.register(AccountTypeCheck)?;
    registry.register(DebitCreditEquality)?;
    registry.register(AccountTypeCompatibility)?;
    registry.register(SignConvention)?;
    registry.register(ContraAccount)?;
    registry.validate_dependency_graph()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationLevel;

    #[test]
    fn default_registry_orders_levels() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 7);
        let structural: Vec<_> = registry
            .rules_for_level(ValidationLevel::Structural)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(
            structural,
            vec![ACCOUNT_EXISTENCE, TRANSACTION_STRUCTURE, ACCOUNT_TYPE]
        );
        let accounting: Vec<_> = registry
            .rules_for_level(ValidationLevel::Accounting)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(
            accounting,
            vec![
                DEBIT_CREDIT_EQUALITY,
                ACCOUNT_TYPE_COMPATIBILITY,
                SIGN_CONVENTION,
                CONTRA_ACCOUNT
            ]
        );
    }
}
