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

//! Optional external suggestion oracle.
//!
//! The oracle receives a prompt built from the transaction and the chart of
//! accounts and answers with a JSON object:
//!
//! ```json
//! {"debitAccountCode": "6100", "creditAccountCode": "1000", "confidence": 0.8, "reasoning": "..."}
//! ```
//!
//! Answers are validated strictly against the current [`AccountIndex`]. Any
//! oracle failure (unavailable, timed out, invalid answer) is logged as a
//! warning and the heuristic ranking of [`MappingEngine`] is used instead.

use crate::account::Account;
use crate::account_index::AccountIndex;
use crate::config::OracleConfig;
use crate::diagnostics::{EventLog, Stage};
use crate::error::{EngineError, OracleError};
use crate::mapping::engine::MappingEngine;
use crate::base::Side;
use crate::mapping::roles::{self, check_role};
use crate::mapping::{MappingSource, RankedAccount, TransactionMapping, clamp_confidence};
use crate::transaction::Transaction;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value, json};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// External natural-language suggestion service.
#[async_trait]
pub trait SuggestionOracle: Send + Sync {
    /// Returns the raw answer to `prompt`.
    async fn suggest(&self, prompt: &str) -> Result<String, OracleError>;
}

/// A validated oracle answer.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleSuggestion {
    pub debit: Account,
    pub credit: Account,
    /// Clamped to `[0, 0.95]`.
    pub confidence: f64,
    pub reasoning: String,
}

/// Builds the prompt sent to the oracle.
pub fn build_prompt(transaction: &Transaction, accounts: &[Account]) -> String {
    let mut prompt = String::from(
        "Map this transaction to a debit account and a credit account from the chart of accounts.\n\n",
    );
    let _ = writeln!(prompt, "Description: {}", transaction.description);
    if let Some(amount) = transaction.amount {
        let _ = writeln!(prompt, "Amount: {amount}");
    }
    if let Some(date) = transaction.date {
        let _ = writeln!(prompt, "Date: {date}");
    }
    if let Some(customer) = &transaction.customer {
        let _ = writeln!(prompt, "Customer: {customer}");
    }
    if let Some(reference) = &transaction.reference {
        let _ = writeln!(prompt, "Reference: {reference}");
    }

    prompt.push_str("\nChart of accounts:\n");
    for account in accounts.iter().filter(|a| a.is_active) {
        let _ = writeln!(
            prompt,
            "- {} {} ({}/{})",
            account.code, account.name, account.account_type, account.subtype
        );
    }

    prompt.push_str(
        "\nAnswer with a single JSON object with the keys \"debitAccountCode\", \
         \"creditAccountCode\", \"confidence\" (a number between 0 and 1) and \"reasoning\".",
    );
    prompt
}

/// Validates a raw oracle answer against `index`.
///
/// Text around the outermost `{ ... }` is ignored. Both codes must be
/// non-empty strings naming distinct active accounts, `confidence` must be a
/// number and `reasoning` a string.
///
/// # Errors
///
/// [`EngineError::InvalidOracleResponse`] describing the first violation.
pub fn parse_suggestion(raw: &str, index: &AccountIndex) -> Result<OracleSuggestion, EngineError> {
    let invalid = |reason: &str| EngineError::InvalidOracleResponse(reason.to_string());

    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(invalid("no JSON object in response"));
    };
    if end < start {
        return Err(invalid("no JSON object in response"));
    }
    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| EngineError::InvalidOracleResponse(format!("malformed JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| invalid("response is not a JSON object"))?;

    let debit_code = code_field(object, "debitAccountCode")?;
    let credit_code = code_field(object, "creditAccountCode")?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("confidence must be a number"))?;
    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("reasoning must be a string"))?;

    if debit_code == credit_code {
        return Err(invalid("debit and credit account codes are identical"));
    }
    let resolve = |code: &str| {
        index
            .by_code(code)
            .cloned()
            .ok_or_else(|| EngineError::InvalidOracleResponse(format!("unknown account code {code}")))
    };

    Ok(OracleSuggestion {
        debit: resolve(debit_code)?,
        credit: resolve(credit_code)?,
        confidence: clamp_confidence(confidence),
        reasoning: reasoning.to_string(),
    })
}

fn code_field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str, EngineError> {
    let code = object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidOracleResponse(format!("{key} must be a string")))?
        .trim();
    if code.is_empty() {
        return Err(EngineError::InvalidOracleResponse(format!("{key} is empty")));
    }
    Ok(code)
}

/// Calls `oracle` with a deadline.
///
/// # Errors
///
/// The oracle's own error, or [`OracleError::Timeout`] when `timeout` elapses.
pub async fn suggest_with_timeout(
    oracle: &dyn SuggestionOracle,
    prompt: &str,
    timeout: Duration,
) -> Result<String, OracleError> {
    match tokio::time::timeout(timeout, oracle.suggest(prompt)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(OracleError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Maps transactions through the oracle, falling back to the heuristic ranking.
pub struct OracleMapper {
    oracle: Arc<dyn SuggestionOracle>,
    config: OracleConfig,
    log: EventLog,
}

impl OracleMapper {
    pub fn new(oracle: Arc<dyn SuggestionOracle>, config: OracleConfig, log: EventLog) -> Self {
        Self { oracle, config, log }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Asks the oracle for a suggestion and validates it. No fallback.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotInitialized`] before the engine has an account index.
    /// - [`EngineError::InvalidOracleResponse`] when the call fails or the
    ///   answer does not validate.
    pub async fn suggest(
        &self,
        engine: &MappingEngine,
        transaction: &Transaction,
    ) -> Result<OracleSuggestion, EngineError> {
        let index = engine.index()?;
        let prompt = build_prompt(transaction, index.accounts());
        let raw = suggest_with_timeout(self.oracle.as_ref(), &prompt, self.config.timeout()).await?;
        parse_suggestion(&raw, &index)
    }

    /// Maps one transaction.
    ///
    /// Uses the oracle when enabled; on any oracle failure logs a warning and
    /// returns the heuristic mapping.
    ///
    /// # Errors
    ///
    /// Only the heuristic's own errors ([`EngineError::NotInitialized`],
    /// [`EngineError::NoMatchingAccounts`]).
    pub async fn map(
        &self,
        engine: &MappingEngine,
        transaction: &Transaction,
    ) -> Result<TransactionMapping, EngineError> {
        if !self.config.enabled {
            return engine.map_transaction(transaction);
        }

        let tx_id = transaction.id.as_str();
        match self.suggest(engine, transaction).await {
            Ok(suggestion) => {
                self.log.info(
                    Stage::Mapping,
                    "oracle suggestion accepted",
                    Some(tx_id),
                    Some(json!({
                        "debit": suggestion.debit.code,
                        "credit": suggestion.credit.code,
                        "confidence": suggestion.confidence,
                    })),
                );
                Ok(into_mapping(transaction, suggestion))
            }
            Err(EngineError::NotInitialized) => Err(EngineError::NotInitialized),
            Err(e) => {
                self.log.warning(
                    Stage::Mapping,
                    format!("oracle suggestion rejected, using heuristic ranking: {e}"),
                    Some(tx_id),
                    None,
                );
                engine.map_transaction(transaction)
            }
        }
    }

    /// Maps a batch, at most `max_in_flight` at a time with
    /// `inter_batch_delay` between chunks.
    ///
    /// Results are in input order; one item's failure does not affect the others.
    pub async fn map_batch(
        &self,
        engine: &MappingEngine,
        transactions: &[Transaction],
    ) -> Vec<Result<TransactionMapping, EngineError>> {
        let chunk_size = self.config.max_in_flight.max(1);
        let mut results = Vec::with_capacity(transactions.len());

        for (i, chunk) in transactions.chunks(chunk_size).enumerate() {
            if i > 0 && self.config.enabled {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
            let mapped = join_all(chunk.iter().map(|tx| self.map(engine, tx))).await;
            results.extend(mapped);
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        self.log.info(
            Stage::Mapping,
            format!("batch mapped: {} ok, {failed} failed", results.len() - failed),
            None,
            None,
        );
        results
    }
}

fn into_mapping(transaction: &Transaction, suggestion: OracleSuggestion) -> TransactionMapping {
    let ranked = |account: Account| RankedAccount {
        account,
        confidence: suggestion.confidence,
        priority: 0.0,
        reasons: vec![suggestion.reasoning.clone()],
    };
    let debit = ranked(suggestion.debit.clone());
    let credit = ranked(suggestion.credit.clone());
    let debit_role = check_role(&debit.account, Side::Debit, &transaction.description);
    let credit_role = check_role(&credit.account, Side::Credit, &transaction.description);

    let mut reasoning = vec![format!("Oracle: {}", suggestion.reasoning)];
    reasoning.extend(roles::describe(&debit.account, Side::Debit, debit_role));
    reasoning.extend(roles::describe(&credit.account, Side::Credit, credit_role));

    TransactionMapping {
        transaction_id: transaction.id.clone(),
        category: None,
        debit_candidates: vec![debit.clone()],
        credit_candidates: vec![credit.clone()],
        debit,
        credit,
        confidence: suggestion.confidence,
        reasoning,
        source: MappingSource::Oracle,
        debit_role,
        credit_role,
    }
}
