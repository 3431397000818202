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

//! # Posting Engine
//!
//! Classifies free-form financial transactions into double-entry postings (a
//! debit account and a credit account) and validates each proposed posting
//! against layered accounting rules before it may be approved.
//!
//! ## Core Components
//!
//! - [`Engine`]: Facade used by the approval workflow
//! - [`MappingEngine`]: Ranks chart-of-accounts entries for each side of a posting
//! - [`ValidationService`]: Runs the rule levels and aggregates a [`ValidationResult`]
//! - [`RuleRegistry`]: Rules indexed by level with an acyclic dependency graph
//! - [`EventLog`]: Structured audit stream behind an injected sink
//!
//! ## Example
//!
//! ```
//! use posting_engine::{Account, AccountSubtype, AccountType, Engine, EventLog, Transaction};
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new(EventLog::disabled()).unwrap();
//! engine
//!     .initialize(vec![
//!         Account::new("cash", "1100", "Cash", AccountType::Asset, AccountSubtype::CurrentAsset),
//!         Account::new("sales", "4100", "Sales Revenue", AccountType::Revenue, AccountSubtype::OperatingRevenue),
//!     ])
//!     .unwrap();
//!
//! let tx = Transaction::new(
//!     "tx-1",
//!     "Cash receipt from customer, $100",
//!     dec!(100.00),
//!     NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
//! );
//! let mapping = engine.map_transaction(&tx).unwrap();
//! assert_eq!(mapping.debit.account.code, "1100");
//! assert_eq!(mapping.credit.account.code, "4100");
//!
//! let result = engine.validate(&tx, Some(&mapping.debit.account), Some(&mapping.credit.account));
//! assert!(result.is_valid);
//! assert!(result.warnings.is_empty());
//! ```
//!
//! ## Thread Safety
//!
//! The account index and rule registry are immutable once built. Overrides and
//! the learned mapping history each sit behind a single lock, so mapping and
//! validation can run in parallel across transactions.

pub mod account;
pub mod account_index;
mod base;
pub mod config;
pub mod diagnostics;
mod engine;
pub mod error;
pub mod mapping;
mod transaction;
pub mod validation;

pub use account::{Account, AccountSubtype, AccountType};
pub use account_index::AccountIndex;
pub use base::{AccountId, RuleId, Side, TransactionId};
pub use config::EngineConfig;
pub use diagnostics::{EventLog, MemorySink};
pub use engine::{ApprovalOverride, Engine};
pub use error::{EngineError, OracleError, RuleFault};
pub use mapping::{MappingEngine, SuggestionOracle, TransactionMapping};
pub use transaction::{Posting, Transaction, TransactionStatus};
pub use validation::{
    RuleRegistry, ValidationOverride, ValidationResult, ValidationRule, ValidationService,
};
