//! Guard Registry
//!
//! Guards are declarative rule sets registered under a name and a scope.
//! Per-input guards intercept values with matching labels as they are bound;
//! per-operation guards intercept operations of matching kinds before they
//! execute. Rule evaluation lives in the interpreter (it needs expression
//! evaluation); this module owns the registry and the decision model.

use std::collections::BTreeSet;

use crate::ast::types::{GuardDirective, GuardRuleNode, GuardScopeNode};

/// Scope a guard is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardScope {
    PerInput,
    PerOperation,
}

impl From<GuardScopeNode> for GuardScope {
    fn from(node: GuardScopeNode) -> Self {
        match node {
            GuardScopeNode::PerInput => GuardScope::PerInput,
            GuardScopeNode::PerOperation => GuardScope::PerOperation,
        }
    }
}

/// A registered guard: name, scope, filters, and ordered rules.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardDef {
    pub name: String,
    pub scope: GuardScope,
    pub op_kinds: BTreeSet<String>,
    pub labels: BTreeSet<String>,
    pub rules: Vec<GuardRuleNode>,
}

impl GuardDef {
    pub fn from_directive(directive: &GuardDirective) -> Self {
        Self {
            name: directive.name.clone(),
            scope: directive.scope.into(),
            op_kinds: directive.op_kinds.iter().cloned().collect(),
            labels: directive.labels.iter().cloned().collect(),
            rules: directive.rules.clone(),
        }
    }

    /// Per-operation match: guard intercepts this op kind.
    pub fn matches_op(&self, op_kind: &str) -> bool {
        self.op_kinds.is_empty() || self.op_kinds.contains(op_kind)
    }

    /// Per-input match: guard intercepts values carrying any of its labels.
    pub fn matches_labels(&self, labels: &BTreeSet<String>) -> bool {
        if self.labels.is_empty() {
            return true;
        }
        self.labels.iter().any(|l| labels.contains(l))
    }
}

/// Decision produced by guard evaluation; first matching rule wins.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Allow,
    Deny { reason: String },
    Retry { hint: Option<String> },
    Prompt,
}

/// Stores guards keyed by (name, scope).
#[derive(Debug, Clone, Default)]
pub struct GuardRegistry {
    guards: Vec<GuardDef>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a guard under (name, scope).
    pub fn register(&mut self, def: GuardDef) {
        self.guards
            .retain(|g| !(g.name == def.name && g.scope == def.scope));
        self.guards.push(def);
    }

    /// Guards of a scope matching an operation kind, in registration order.
    pub fn for_operation(&self, op_kind: &str) -> Vec<&GuardDef> {
        self.guards
            .iter()
            .filter(|g| g.scope == GuardScope::PerOperation && g.matches_op(op_kind))
            .collect()
    }

    /// Per-input guards matching a value's labels, in registration order.
    pub fn for_input(&self, labels: &BTreeSet<String>) -> Vec<&GuardDef> {
        self.guards
            .iter()
            .filter(|g| g.scope == GuardScope::PerInput && g.matches_labels(labels))
            .collect()
    }

    pub fn get(&self, name: &str, scope: GuardScope) -> Option<&GuardDef> {
        self.guards
            .iter()
            .find(|g| g.name == name && g.scope == scope)
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::GuardActionNode;

    fn guard(name: &str, scope: GuardScope, op_kinds: &[&str], labels: &[&str]) -> GuardDef {
        GuardDef {
            name: name.to_string(),
            scope,
            op_kinds: op_kinds.iter().map(|s| s.to_string()).collect(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            rules: vec![GuardRuleNode {
                condition: None,
                action: GuardActionNode::Allow,
            }],
        }
    }

    #[test]
    fn test_register_replaces_same_key() {
        let mut reg = GuardRegistry::new();
        reg.register(guard("g", GuardScope::PerOperation, &["exe"], &[]));
        reg.register(guard("g", GuardScope::PerOperation, &["show"], &[]));

        assert_eq!(reg.for_operation("exe").len(), 0);
        assert_eq!(reg.for_operation("show").len(), 1);
    }

    #[test]
    fn test_same_name_different_scope_coexist() {
        let mut reg = GuardRegistry::new();
        reg.register(guard("g", GuardScope::PerOperation, &["exe"], &[]));
        reg.register(guard("g", GuardScope::PerInput, &[], &["secret"]));

        assert!(reg.get("g", GuardScope::PerOperation).is_some());
        assert!(reg.get("g", GuardScope::PerInput).is_some());
    }

    #[test]
    fn test_for_operation_filters_kind() {
        let mut reg = GuardRegistry::new();
        reg.register(guard("a", GuardScope::PerOperation, &["exe"], &[]));
        reg.register(guard("b", GuardScope::PerOperation, &["output", "show"], &[]));
        reg.register(guard("c", GuardScope::PerInput, &[], &["secret"]));

        let hits = reg.for_operation("show");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "b");
    }

    #[test]
    fn test_for_input_matches_any_label() {
        let mut reg = GuardRegistry::new();
        reg.register(guard("s", GuardScope::PerInput, &[], &["secret", "pii"]));

        let mut labels = BTreeSet::new();
        labels.insert("pii".to_string());
        assert_eq!(reg.for_input(&labels).len(), 1);

        let mut other = BTreeSet::new();
        other.insert("public".to_string());
        assert!(reg.for_input(&other).is_empty());
    }
}
