//! Policy Enforcement
//!
//! Label-flow rules: the enforcer observes operation entry and value flow,
//! reports violations when taint would cross a disallowed boundary, and
//! derives output descriptors. Descriptor derivation lives in exactly one
//! place (`derive_output_descriptor`) so evaluators cannot drift apart.

use std::collections::BTreeSet;

use crate::interpreter::errors::MlldError;
use crate::values::SecurityDescriptor;

/// Denies values carrying `label` from flowing into `channel`, unless the
/// operation also carries `unless_label`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRule {
    pub label: String,
    pub channel: String,
    pub unless_label: Option<String>,
}

/// Inputs to a label-flow check at an operation boundary.
#[derive(Debug, Clone, Default)]
pub struct LabelFlowQuery {
    /// Taint and labels carried by the operation's inputs
    pub input_labels: BTreeSet<String>,
    pub input_taint: BTreeSet<String>,
    /// Labels of the operation itself ("op:net", "op:fs", ...)
    pub op_labels: BTreeSet<String>,
    /// Labels declared on the executable
    pub exe_labels: BTreeSet<String>,
    /// Flow channel under evaluation ("exec", "show", "output")
    pub flow_channel: String,
    /// Command text for diagnostics
    pub command: Option<String>,
}

/// Summary of the active policy, visible through the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySummary {
    pub rule_count: usize,
    pub strips: BTreeSet<String>,
}

/// Observes operation entry and value flow; never owns control flow.
#[derive(Debug, Clone, Default)]
pub struct PolicyEnforcer {
    rules: Vec<FlowRule>,
    /// Labels removed from derived output descriptors
    strip_labels: BTreeSet<String>,
}

impl PolicyEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default posture: secret material may not flow into network-labelled
    /// operations without an approving label.
    pub fn with_default_rules() -> Self {
        let mut enforcer = Self::new();
        enforcer.add_rule(FlowRule {
            label: "secret".to_string(),
            channel: "op:net".to_string(),
            unless_label: Some("net-approved".to_string()),
        });
        enforcer
    }

    pub fn add_rule(&mut self, rule: FlowRule) {
        self.rules.push(rule);
    }

    pub fn strip_label(&mut self, label: impl Into<String>) {
        self.strip_labels.insert(label.into());
    }

    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            rule_count: self.rules.len(),
            strips: self.strip_labels.clone(),
        }
    }

    /// Check whether input taint/labels may cross into the operation.
    pub fn check_label_flow(&self, query: &LabelFlowQuery) -> Result<(), MlldError> {
        let mut carried: BTreeSet<&String> = query.input_labels.iter().collect();
        carried.extend(query.input_taint.iter());

        let mut op: BTreeSet<&String> = query.op_labels.iter().collect();
        op.extend(query.exe_labels.iter());

        for rule in &self.rules {
            if !carried.contains(&rule.label) {
                continue;
            }
            if !op.contains(&rule.channel) {
                continue;
            }
            if let Some(unless) = &rule.unless_label {
                if op.contains(unless) {
                    continue;
                }
            }
            let mut reason = format!(
                "'{}' input may not flow into '{}' via {}",
                rule.label, rule.channel, query.flow_channel
            );
            if let Some(command) = &query.command {
                reason.push_str(&format!(" (command: {})", command));
            }
            return Err(MlldError::SecurityBlocked(reason));
        }
        Ok(())
    }

    /// Output descriptor of any operation: union of input descriptors, the
    /// executable's labels, and the operation labels, filtered through the
    /// active policy.
    pub fn derive_output_descriptor(
        &self,
        inputs: &[&SecurityDescriptor],
        op_labels: &BTreeSet<String>,
        exe_labels: &BTreeSet<String>,
    ) -> SecurityDescriptor {
        let mut out = SecurityDescriptor::union_all(inputs.iter().copied());
        for label in op_labels {
            out.labels.insert(label.clone());
        }
        for label in exe_labels {
            out.labels.insert(label.clone());
        }
        for strip in &self.strip_labels {
            out.labels.remove(strip);
        }
        out
    }
}
