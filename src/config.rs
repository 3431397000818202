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

//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! [oracle]
//! enabled = true
//! timeout_ms = 5000
//!
//! [mapping]
//! history_suggestion_limit = 3
//!
//! [[mapping.categories]]
//! name = "Software Subscriptions"
//! keywords = ["subscription", "saas", "license"]
//! debit = { type = "expense", subtype = "operating-expense" }
//! credit = { type = "liability", subtype = "current-liability" }
//! confidence_boost = 0.1
//! ```

use crate::error::EngineError;
use crate::mapping::TransactionCategory;
use crate::mapping::engine::DEFAULT_SUGGESTION_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub oracle: OracleConfig,
    pub mapping: MappingConfig,
}

/// Throttling and timeout for the external suggestion oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Oracle calls issued concurrently within one batch chunk.
    pub max_in_flight: usize,
    /// Pause between consecutive chunks of a batch.
    pub inter_batch_delay_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 10_000,
            max_in_flight: 4,
            inter_batch_delay_ms: 1_000,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    pub history_suggestion_limit: usize,
    /// Appended after the built-in categories.
    pub categories: Vec<TransactionCategory>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            history_suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            categories: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] on malformed TOML, unknown keys or a zero
    /// `max_in_flight`.
    pub fn from_toml_str(input: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.oracle.max_in_flight == 0 {
            return Err(EngineError::Config(
                "oracle.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Reads and parses the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountSubtype, AccountType};
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.oracle.enabled);
        assert_eq!(config.oracle.timeout(), Duration::from_secs(10));
        assert_eq!(config.oracle.max_in_flight, 4);
        assert_eq!(config.oracle.inter_batch_delay(), Duration::from_secs(1));
        assert_eq!(config.mapping.history_suggestion_limit, 5);
    }

    #[test]
    fn parses_extra_categories() {
        let config = EngineConfig::from_toml_str(
            r#"
            [oracle]
            enabled = true
            timeout_ms = 250

            [[mapping.categories]]
            name = "Equipment Leases"
            keywords = ["lease", "rental"]
            debit = { type = "expense", subtype = "operating-expense" }
            credit = { type = "liability" }
            amount_threshold = "2500"
            confidence_boost = 0.05

            [[mapping.categories.rules]]
            when = "recurring"
            adjustment = 0.1
            reason = "Recurring lease payment"
            "#,
        )
        .unwrap();

        assert!(config.oracle.enabled);
        assert_eq!(config.oracle.timeout_ms, 250);
        assert_eq!(config.oracle.max_in_flight, 4);

        let category = &config.mapping.categories[0];
        assert_eq!(category.name, "Equipment Leases");
        assert_eq!(category.debit.account_type, AccountType::Expense);
        assert_eq!(category.debit.subtype, Some(AccountSubtype::OperatingExpense));
        assert_eq!(category.credit.subtype, None);
        assert_eq!(category.amount_threshold, Some(dec!(2500)));
        assert_eq!(category.rules.len(), 1);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_concurrency() {
        assert!(matches!(
            EngineConfig::from_toml_str("[oracle]\nretries = 3\n"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[oracle]\nmax_in_flight = 0\n"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mapping]\nhistory_suggestion_limit = 2").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.mapping.history_suggestion_limit, 2);

        assert!(matches!(
            EngineConfig::load("/nonexistent/posting-engine.toml"),
            Err(EngineError::Config(_))
        ));
    }
}
