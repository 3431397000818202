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

//! Error types for rule registration, overrides, mapping and the suggestion oracle.

use crate::account::{AccountSubtype, AccountType};
use crate::base::{AccountId, RuleId};
use crate::transaction::TransactionStatus;
use thiserror::Error;

/// Engine-state and request errors.
///
/// Registration errors (`DuplicateRule`, `UnknownDependency`,
/// `CircularDependency`) are configuration faults and abort startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A rule with the same id is already registered
    #[error("rule {0} is already registered")]
    DuplicateRule(RuleId),

    /// A declared dependency was not registered before its dependent
    #[error("rule {rule} depends on unregistered rule {dependency}")]
    UnknownDependency { rule: RuleId, dependency: RuleId },

    /// The dependency graph contains a cycle through this rule
    #[error("circular dependency detected involving rule {0}")]
    CircularDependency(RuleId),

    /// No rule with this id exists
    #[error("unknown rule {0}")]
    UnknownRule(RuleId),

    /// The rule declares itself non-overridable
    #[error("rule {0} cannot be overridden")]
    RuleNotOverridable(RuleId),

    /// Override is missing a reason or an approver
    #[error("invalid override: {0}")]
    InvalidOverride(String),

    /// Mapping requested before a chart of accounts was supplied
    #[error("mapping engine not initialized")]
    NotInitialized,

    /// Initialization with an empty chart of accounts
    #[error("no accounts provided for mapping")]
    NoAccountsProvided,

    /// Two accounts in the chart share an id
    #[error("account {0} appears more than once in the chart")]
    DuplicateAccount(AccountId),

    /// Two active accounts share a code
    #[error("account code {0} is used by more than one active account")]
    DuplicateAccountCode(String),

    /// No active account of the requested type/subtype
    #[error("no matching accounts found for type {account_type}{}", .subtype.map(|s| format!("/{s}")).unwrap_or_default())]
    NoMatchingAccounts {
        account_type: AccountType,
        subtype: Option<AccountSubtype>,
    },

    /// Oracle output failed strict validation
    #[error("invalid oracle response: {0}")]
    InvalidOracleResponse(String),

    /// Status change not allowed by the transaction state machine
    #[error("cannot move transaction from {from} to {to}")]
    InvalidStatusTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Approval blocked by outstanding errors or unacknowledged warnings
    #[error("approval blocked: {0}")]
    ApprovalBlocked(String),

    /// Configuration file could not be read or parsed
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures of the external suggestion oracle. Always recoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle could not be reached or refused the call
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured timeout
    #[error("oracle call timed out after {0} ms")]
    Timeout(u64),

    /// The oracle answered, but not with an acceptable suggestion
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::InvalidResponse(reason) => EngineError::InvalidOracleResponse(reason),
            other => EngineError::InvalidOracleResponse(other.to_string()),
        }
    }
}

/// An unexpected failure inside a rule. The validation service turns it into a
/// single `VALIDATION_ERROR` issue instead of aborting the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RuleFault(pub String);

impl RuleFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
