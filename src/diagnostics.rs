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

//! Append-only audit stream of validation, mapping, override and approval decisions.
//!
//! Components take an [`EventLog`] handle at construction. The handle forwards
//! every entry to an injected [`DiagnosticsSink`] and mirrors it to `tracing`.
//!
//! ```
//! use posting_engine::diagnostics::{EventLog, MemorySink, Stage};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let log = EventLog::new(sink.clone());
//! log.info(Stage::Mapping, "mapped", Some("tx-1"), None);
//! assert_eq!(sink.for_transaction("tx-1").len(), 1);
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

/// Pipeline stage an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validation,
    Mapping,
    Override,
    Approval,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Mapping => "mapping",
            Stage::Override => "override",
            Stage::Approval => "approval",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Destination for [`LogEntry`] records. Sinks only ever append.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&self, _entry: LogEntry) {}
}

/// Entry counts by level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub successful: usize,
}

/// In-memory sink, used by tests and by operators inspecting a single run.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, in arrival order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn for_transaction(&self, transaction_id: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.transaction_id.as_deref() == Some(transaction_id))
            .cloned()
            .collect()
    }

    pub fn for_stage(&self, stage: Stage) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn summary(&self) -> LogSummary {
        self.entries
            .lock()
            .iter()
            .fold(LogSummary::default(), |mut acc, entry| {
                acc.total += 1;
                match entry.level {
                    LogLevel::Error => acc.errors += 1,
                    LogLevel::Warning => acc.warnings += 1,
                    LogLevel::Info => acc.successful += 1,
                    LogLevel::Debug => {}
                }
                acc
            })
    }
}

impl DiagnosticsSink for MemorySink {
    fn record(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Writes one JSON object per line to the wrapped writer.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> DiagnosticsSink for JsonLinesSink<W> {
    fn record(&self, entry: LogEntry) {
        let mut writer = self.writer.lock();
        // The audit stream must not take the pipeline down with it.
        let written = serde_json::to_writer(&mut *writer, &entry)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::error!(error = %e, "failed to write diagnostics entry");
        }
    }
}

/// Cloneable handle used by every component that emits audit entries.
#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn DiagnosticsSink>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl EventLog {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink }
    }

    /// A log that only mirrors to `tracing`.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn record(
        &self,
        level: LogLevel,
        stage: Stage,
        message: impl Into<String>,
        transaction_id: Option<&str>,
        details: Option<Value>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            stage,
            message: message.into(),
            transaction_id: transaction_id.map(str::to_string),
            details,
        };

        let tx = entry.transaction_id.as_deref().unwrap_or("-");
        let stage = stage.as_str();
        match level {
            LogLevel::Error => tracing::error!(stage, tx, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(stage, tx, "{}", entry.message),
            LogLevel::Info => tracing::info!(stage, tx, "{}", entry.message),
            LogLevel::Debug => tracing::debug!(stage, tx, "{}", entry.message),
        }

        self.sink.record(entry);
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>, tx: Option<&str>, details: Option<Value>) {
        self.record(LogLevel::Info, stage, message, tx, details);
    }

    pub fn warning(&self, stage: Stage, message: impl Into<String>, tx: Option<&str>, details: Option<Value>) {
        self.record(LogLevel::Warning, stage, message, tx, details);
    }

    pub fn error(&self, stage: Stage, message: impl Into<String>, tx: Option<&str>, details: Option<Value>) {
        self.record(LogLevel::Error, stage, message, tx, details);
    }

    pub fn debug(&self, stage: Stage, message: impl Into<String>, tx: Option<&str>, details: Option<Value>) {
        self.record(LogLevel::Debug, stage, message, tx, details);
    }
}
