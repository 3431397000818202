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

//! Rule registry.
//!
//! Built once at startup, read-only afterwards. Per level, rules are kept in
//! descending priority with registration order breaking ties.

use crate::base::RuleId;
use crate::error::EngineError;
use crate::validation::{ValidationLevel, ValidationRule};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
pub struct RuleRegistry {
    /// Registration order.
    rules: Vec<Arc<dyn ValidationRule>>,
    by_id: HashMap<RuleId, usize>,
    by_level: HashMap<ValidationLevel, Vec<usize>>,
    dependencies: HashMap<RuleId, Vec<RuleId>>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.ids())
            .finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `rule`. Its dependencies must already be registered.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateRule`] if the id is taken.
    /// - [`EngineError::UnknownDependency`] if a dependency is not registered yet.
    pub fn register(&mut self, rule: impl ValidationRule + 'static) -> Result<(), EngineError> {
        self.register_arc(Arc::new(rule))
    }

    pub fn register_arc(&mut self, rule: Arc<dyn ValidationRule>) -> Result<(), EngineError> {
        let id = rule.id();
        if self.by_id.contains_key(&id) {
            return Err(EngineError::DuplicateRule(id));
        }
        if let Some(dependency) = rule
            .dependencies()
            .into_iter()
            .find(|dep| !self.by_id.contains_key(dep))
        {
            return Err(EngineError::UnknownDependency {
                rule: id,
                dependency,
            });
        }
        self.insert(rule);
        Ok(())
    }

    /// Registers a set of rules whose dependencies may point anywhere inside
    /// the set. Unlike [`register`](Self::register) this can introduce a cycle,
    /// so [`validate_dependency_graph`](Self::validate_dependency_graph) must
    /// run before the registry is used.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateRule`] or [`EngineError::UnknownDependency`];
    /// the registry is left unchanged.
    pub fn register_all(&mut self, rules: Vec<Arc<dyn ValidationRule>>) -> Result<(), EngineError> {
        let mut incoming = HashSet::new();
        for rule in &rules {
            let id = rule.id();
            if self.by_id.contains_key(&id) || !incoming.insert(id.clone()) {
                return Err(EngineError::DuplicateRule(id));
            }
        }
        for rule in &rules {
            if let Some(dependency) = rule
                .dependencies()
                .into_iter()
                .find(|dep| !self.by_id.contains_key(dep) && !incoming.contains(dep))
            {
                return Err(EngineError::UnknownDependency {
                    rule: rule.id(),
                    dependency,
                });
            }
        }
        rules.into_iter().for_each(|rule| self.insert(rule));
        Ok(())
    }

    fn insert(&mut self, rule: Arc<dyn ValidationRule>) {
        let id = rule.id();
        let pos = self.rules.len();
        self.by_id.insert(id.clone(), pos);
        self.dependencies.insert(id, rule.dependencies());

        let level = self.by_level.entry(rule.level()).or_default();
        level.push(pos);
        // Stable: equal priorities keep registration order.
        let rules = &self.rules;
        let priority = |p: &usize| rules.get(*p).map_or(rule.priority(), |r| r.priority());
        level.sort_by_key(|p| std::cmp::Reverse(priority(p)));

        self.rules.push(rule);
    }

    /// Rules at `level`, highest priority first.
    pub fn rules_for_level(&self, level: ValidationLevel) -> Vec<Arc<dyn ValidationRule>> {
        self.by_level
            .get(&level)
            .map(|positions| positions.iter().map(|p| Arc::clone(&self.rules[*p])).collect())
            .unwrap_or_default()
    }

    /// Declared dependencies of `rule_id`, `None` for unknown rules.
    pub fn dependencies_of(&self, rule_id: &RuleId) -> Option<&[RuleId]> {
        self.dependencies.get(rule_id).map(Vec::as_slice)
    }

    pub fn get(&self, rule_id: &RuleId) -> Option<Arc<dyn ValidationRule>> {
        self.by_id.get(rule_id).map(|p| Arc::clone(&self.rules[*p]))
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Depth-first cycle detection over every registered rule.
    ///
    /// # Errors
    ///
    /// [`EngineError::CircularDependency`] naming a rule on the cycle.
    pub fn validate_dependency_graph(&self) -> Result<(), EngineError> {
        let mut finished = HashSet::new();
        for rule in &self.rules {
            let mut on_path = HashSet::new();
            self.visit(&rule.id(), &mut on_path, &mut finished)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: &RuleId,
        on_path: &mut HashSet<RuleId>,
        finished: &mut HashSet<RuleId>,
    ) -> Result<(), EngineError> {
        if finished.contains(id) {
            return Ok(());
        }
        if !on_path.insert(id.clone()) {
            return Err(EngineError::CircularDependency(id.clone()));
        }
        for dependency in self.dependencies_of(id).unwrap_or(&[]) {
            self.visit(dependency, on_path, finished)?;
        }
        on_path.remove(id);
        finished.insert(id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleFault;
    use crate::validation::{ValidationContext, ValidationResult};

    struct Stub {
        id: &'static str,
        level: ValidationLevel,
        priority: u32,
        deps: Vec<&'static str>,
    }

    impl Stub {
        fn new(id: &'static str, priority: u32, deps: &[&'static str]) -> Self {
            Self {
                id,
                level: ValidationLevel::Structural,
                priority,
                deps: deps.to_vec(),
            }
        }
    }

    impl ValidationRule for Stub {
        fn id(&self) -> RuleId {
            RuleId::from(self.id)
        }
        fn name(&self) -> &str {
            self.id
        }
        fn level(&self) -> ValidationLevel {
            self.level
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn dependencies(&self) -> Vec<RuleId> {
            self.deps.iter().map(|d| RuleId::from(*d)).collect()
        }
        fn can_override(&self) -> bool {
            true
        }
        fn validate(&self, _ctx: &ValidationContext<'_>) -> Result<ValidationResult, RuleFault> {
            Ok(ValidationResult::new(self.level))
        }
    }

    fn ids(rules: &[Arc<dyn ValidationRule>]) -> Vec<String> {
        rules.iter().map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn duplicate_and_forward_references_are_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(Stub::new("a", 10, &[])).unwrap();
        assert_eq!(
            registry.register(Stub::new("a", 5, &[])),
            Err(EngineError::DuplicateRule(RuleId::from("a")))
        );
        assert_eq!(
            registry.register(Stub::new("b", 5, &["c"])),
            Err(EngineError::UnknownDependency {
                rule: RuleId::from("b"),
                dependency: RuleId::from("c"),
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn level_order_is_priority_then_registration() {
        let mut registry = RuleRegistry::new();
        registry.register(Stub::new("low", 10, &[])).unwrap();
        registry.register(Stub::new("tie-1", 50, &[])).unwrap();
        registry.register(Stub::new("high", 90, &[])).unwrap();
        registry.register(Stub::new("tie-2", 50, &[])).unwrap();
        let mut other = Stub::new("elsewhere", 100, &[]);
        other.level = ValidationLevel::Business;
        registry.register(other).unwrap();

        assert_eq!(
            ids(&registry.rules_for_level(ValidationLevel::Structural)),
            vec!["high", "tie-1", "tie-2", "low"]
        );
        assert_eq!(ids(&registry.rules_for_level(ValidationLevel::Business)), vec!["elsewhere"]);
        assert!(registry.rules_for_level(ValidationLevel::Historical).is_empty());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut registry = RuleRegistry::new();
        registry.register(Stub::new("root", 1, &[])).unwrap();
        registry.register(Stub::new("left", 1, &["root"])).unwrap();
        registry.register(Stub::new("right", 1, &["root"])).unwrap();
        registry.register(Stub::new("top", 1, &["left", "right"])).unwrap();
        assert_eq!(registry.validate_dependency_graph(), Ok(()));
        assert_eq!(
            registry.dependencies_of(&RuleId::from("top")),
            Some(&[RuleId::from("left"), RuleId::from("right")][..])
        );
    }

    #[test]
    fn mutual_dependency_is_a_cycle() {
        let mut registry = RuleRegistry::new();
        registry
            .register_all(vec![
                Arc::new(Stub::new("a", 1, &["b"])),
                Arc::new(Stub::new("b", 1, &["a"])),
            ])
            .unwrap();
        assert!(matches!(
            registry.validate_dependency_graph(),
            Err(EngineError::CircularDependency(_))
        ));
    }

    #[test]
    fn register_all_is_atomic() {
        let mut registry = RuleRegistry::new();
        let result = registry.register_all(vec![
            Arc::new(Stub::new("a", 1, &[])),
            Arc::new(Stub::new("b", 1, &["missing"])),
        ]);
        assert!(matches!(result, Err(EngineError::UnknownDependency { .. })));
        assert!(registry.is_empty());
    }
}
