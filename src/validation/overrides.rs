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

//! Human overrides of a rule's blocking effect.
//!
//! An override is keyed by rule id, not by transaction: once granted it applies
//! to every validation run until it expires or is removed.

use crate::base::RuleId;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOverride {
    pub rule_id: RuleId,
    pub reason: String,
    pub approved_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidationOverride {
    /// A non-expiring override.
    pub fn new(rule_id: &str, reason: &str, approved_by: &str) -> Self {
        Self {
            rule_id: RuleId::from(rule_id),
            reason: reason.to_string(),
            approved_by: approved_by.to_string(),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Unset expiry, or expiry strictly after `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }

    /// Checks that the override names a reason and an approver.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.reason.trim().is_empty() {
            return Err(EngineError::InvalidOverride(
                "reason must not be empty".to_string(),
            ));
        }
        if self.approved_by.trim().is_empty() {
            return Err(EngineError::InvalidOverride(
                "approver must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lock-guarded set of overrides, at most one per rule.
#[derive(Debug, Default)]
pub struct OverrideStore {
    overrides: RwLock<HashMap<RuleId, ValidationOverride>>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `override_`, replacing any previous override for the same rule.
    /// Returns the replaced override.
    pub fn insert(&self, override_: ValidationOverride) -> Option<ValidationOverride> {
        self.overrides
            .write()
            .insert(override_.rule_id.clone(), override_)
    }

    /// Returns whether an override was removed.
    pub fn remove(&self, rule_id: &RuleId) -> bool {
        self.overrides.write().remove(rule_id).is_some()
    }

    pub fn get(&self, rule_id: &RuleId) -> Option<ValidationOverride> {
        self.overrides.read().get(rule_id).cloned()
    }

    /// Overrides unexpired at `now`, ordered by rule id.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<ValidationOverride> {
        let mut active: Vec<_> = self
            .overrides
            .read()
            .values()
            .filter(|o| o.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        active
    }

    /// Drops overrides expired at `now`. Returns how many were dropped.
    pub fn clear_expired(&self, now: DateTime<Utc>) -> usize {
        let mut overrides = self.overrides.write();
        let before = overrides.len();
        overrides.retain(|_, o| o.is_active_at(now));
        before - overrides.len()
    }

    pub fn len(&self) -> usize {
        self.overrides.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.read().is_empty()
    }
}
