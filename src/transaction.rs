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

//! Imported transactions.
//!
//! Transactions follow a state machine:
//! - [`Pending`] → [`Mapped`] (accounts assigned) → [`Approved`] (terminal)
//! - [`Pending`] or [`Mapped`] → [`Error`] (validation failed)
//! - [`Error`] → [`Pending`] or [`Mapped`] (re-mapped)
//!
//! [`Pending`]: TransactionStatus::Pending
//! [`Mapped`]: TransactionStatus::Mapped
//! [`Approved`]: TransactionStatus::Approved
//! [`Error`]: TransactionStatus::Error

use crate::account::Account;
use crate::base::{AccountId, TransactionId};
use crate::error::EngineError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Mapped,
    Approved,
    Error,
}

impl TransactionStatus {
    pub fn can_transition(self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, to),
            (Pending, Mapped)
                | (Pending, Error)
                | (Mapped, Approved)
                | (Mapped, Error)
                | (Mapped, Pending)
                | (Error, Pending)
                | (Error, Mapped)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Mapped => "mapped",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// The debit/credit pair a transaction was approved with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Posting {
    pub debit: AccountId,
    pub credit: AccountId,
}

impl Posting {
    pub fn new(debit: &Account, credit: &Account) -> Self {
        Self {
            debit: debit.id.clone(),
            credit: credit.id.clone(),
        }
    }
}

/// A free-form financial transaction awaiting a posting.
///
/// `date` and `amount` are optional because the import collaborator may not
/// supply them; the structural rules report their absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub status: TransactionStatus,
    /// Set once the transaction is approved.
    #[serde(default)]
    pub posting: Option<Posting>,
}

impl Transaction {
    pub fn new(id: &str, description: &str, amount: Decimal, date: NaiveDate) -> Self {
        Self {
            id: TransactionId::new(id),
            description: description.to_string(),
            amount: Some(amount),
            date: Some(date),
            customer: None,
            reference: None,
            status: TransactionStatus::Pending,
            posting: None,
        }
    }

    pub fn with_customer(mut self, customer: &str) -> Self {
        self.customer = Some(customer.to_string());
        self
    }

    /// The amount, or zero when missing. Used by heuristics that tolerate absence.
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or(Decimal::ZERO)
    }

    /// Moves the transaction to `to`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidStatusTransition`] when the state machine forbids it,
    /// including any move out of `Approved`.
    pub fn transition(&mut self, to: TransactionStatus) -> Result<(), EngineError> {
        if !self.status.can_transition(to) {
            return Err(EngineError::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
