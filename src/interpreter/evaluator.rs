//! Evaluator - AST Dispatch
//!
//! The engine that ties the interpreter components together. Dispatch is a
//! total function over node kinds; forward-compat nodes the parser may
//! deliver are rejected with a stable error.
//!
//! evaluate_document -> evaluate_node -> (directives | expressions | control flow)

use crate::ast::types::{DirectiveNode, Node};
use crate::env::environment::EnvId;
use crate::interpreter::errors::{MlldError, ReturnSignal};
use crate::interpreter::types::{
    DocumentOutput, EvalOutcome, EvaluationResult, ExecutionLimits, HostInterfaces,
    InterpreterState,
};
use crate::values::StructuredValue;

/// The evaluation engine. Hosts and limits are borrowed for the duration of
/// a call; all mutable state lives in `InterpreterState`.
pub struct Evaluator<'a> {
    pub limits: &'a ExecutionLimits,
    pub hosts: &'a HostInterfaces,
}

impl<'a> Evaluator<'a> {
    pub fn new(limits: &'a ExecutionLimits, hosts: &'a HostInterfaces) -> Self {
        Self { limits, hosts }
    }

    /// Evaluate a complete document against the state's root environment.
    pub fn evaluate_document(
        &self,
        state: &mut InterpreterState,
        document: &Node,
    ) -> Result<EvaluationResult, MlldError> {
        let env = self.root_env(state);
        state.doc = DocumentOutput::default();

        let nodes: &[Node] = match document {
            Node::Document(nodes) => nodes,
            other => std::slice::from_ref(other),
        };
        for node in nodes {
            self.evaluate_node(state, env, node)?;
        }

        let exports = self.exported_names(state, env);
        Ok(EvaluationResult {
            document: state.doc.body.clone(),
            stdout: state.doc.stdout.clone(),
            stderr: state.doc.stderr.clone(),
            env_vars: state.doc.env_vars.clone(),
            exports,
        })
    }

    /// The state's root environment, created on first use.
    pub fn root_env(&self, state: &mut InterpreterState) -> EnvId {
        if state.arena.is_empty() {
            state.arena.new_root()
        } else {
            EnvId(0)
        }
    }

    fn exported_names(&self, state: &InterpreterState, env: EnvId) -> Vec<String> {
        if state.exports.wildcard {
            return state.arena.frame_names(env);
        }
        state.exports.names.iter().cloned().collect()
    }

    /// Evaluate a statement sequence; the outcome of the last node wins.
    pub fn evaluate_nodes(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        nodes: &[Node],
    ) -> Result<EvalOutcome, MlldError> {
        let mut last = EvalOutcome::none();
        for node in nodes {
            last = self.evaluate_node(state, env, node)?;
        }
        Ok(last)
    }

    /// Evaluate one node. Total over node kinds.
    pub fn evaluate_node(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &Node,
    ) -> Result<EvalOutcome, MlldError> {
        state.enter(self.limits)?;
        let result = self.evaluate_node_inner(state, env, node);
        state.leave();
        result
    }

    fn evaluate_node_inner(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &Node,
    ) -> Result<EvalOutcome, MlldError> {
        match node {
            Node::Document(nodes) => self.evaluate_nodes(state, env, nodes),
            Node::Directive(directive) => self.evaluate_directive_node(state, env, directive),
            Node::Text(text) => {
                state.doc.append_body(text);
                Ok(EvalOutcome::none())
            }
            Node::Newline => {
                state.doc.body.push('\n');
                Ok(EvalOutcome::none())
            }
            Node::Comment(_) | Node::Frontmatter(_) => Ok(EvalOutcome::none()),
            Node::CodeFence { language, body } => {
                let fence = format!(
                    "```{}\n{}\n```",
                    language.as_deref().unwrap_or(""),
                    body.trim_end_matches('\n')
                );
                state.doc.append_body(&fence);
                Ok(EvalOutcome::none())
            }
            Node::MlldRunBlock(nodes) => self.evaluate_nodes(state, env, nodes),
            Node::Let(binding) => {
                let value = self.evaluate_expr(state, env, &binding.value)?;
                let var = crate::env::factory::VariableFactory::structured(
                    &binding.name,
                    value,
                    crate::env::variable::VariableSource::directive("let", "expression"),
                );
                state.arena.define_let(env, var)?;
                Ok(EvalOutcome::none())
            }
            Node::Augment(assignment) => {
                self.evaluate_augment(state, env, assignment)?;
                Ok(EvalOutcome::none())
            }
            Node::Return(ret) => {
                let value = match &ret.value {
                    Some(expr) => self.evaluate_expr(state, env, expr)?,
                    None => StructuredValue::empty(),
                };
                Err(MlldError::Return(ReturnSignal { value }))
            }
            Node::Expression(expr) => {
                let value = self.evaluate_expr(state, env, expr)?;
                Ok(EvalOutcome::value(value))
            }
            Node::Unknown { kind } => Err(MlldError::UnknownNode(kind.clone())),
        }
    }

    fn evaluate_directive_node(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        directive: &DirectiveNode,
    ) -> Result<EvalOutcome, MlldError> {
        state.count_directive(self.limits)?;
        let result = self.evaluate_directive(state, env, directive);
        match (result, directive.pos) {
            (Err(err), Some(pos)) => Err(err.at(pos, directive.kind.kind_name())),
            (other, _) => other,
        }
    }

    /// Append semantics for `+=`: numbers add, arrays push, everything else
    /// concatenates text.
    pub(crate) fn evaluate_augment(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        assignment: &crate::ast::types::AugmentedAssignment,
    ) -> Result<(), MlldError> {
        let addition = self.evaluate_expr(state, env, &assignment.value)?;
        let current = state
            .arena
            .lookup(env, &assignment.name)
            .map(|v| v.to_structured())
            .ok_or_else(|| MlldError::UnknownVariable(assignment.name.clone()))?;

        let combined = append_values(&current, &addition);
        state.arena.assign(env, &assignment.name, combined)
    }
}

/// Combine two values for augmented assignment.
pub fn append_values(current: &StructuredValue, addition: &StructuredValue) -> StructuredValue {
    use serde_json::Value;

    let typed = match (&current.typed, &addition.typed) {
        (Value::Number(a), Value::Number(b)) => {
            let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
            if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
                Value::from(sum as i64)
            } else {
                serde_json::Number::from_f64(sum)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        (Value::Array(items), other) => {
            let mut items = items.clone();
            items.push(other.clone());
            Value::Array(items)
        }
        _ => Value::String(format!("{}{}", current.text, addition.text)),
    };

    let mut out = StructuredValue::from_json(typed);
    out.merge_descriptor(&current.descriptor);
    out.merge_descriptor(&addition.descriptor);
    out
}
