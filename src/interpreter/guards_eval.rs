//! Guard Evaluation
//!
//! Runs the rules of registered guards against the current operation.
//! Rules evaluate in order with an augmented `@ctx` exposing the guard try
//! counter and the value under observation; the first matching rule wins.
//! Callers must have pushed the operation context the guard observes.

use crate::context::GuardFrame;
use crate::env::environment::EnvId;
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::types::InterpreterState;
use crate::policy::{GuardDecision, GuardDef};
use crate::values::StructuredValue;

impl Evaluator<'_> {
    /// Evaluate the per-operation guards matching `op_kind`. The first
    /// non-allow decision wins across guards.
    pub fn evaluate_operation_guards(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        op_kind: &str,
        value: &StructuredValue,
        attempt: u32,
    ) -> Result<GuardDecision, MlldError> {
        let guards: Vec<GuardDef> = state
            .guards
            .for_operation(op_kind)
            .into_iter()
            .cloned()
            .collect();
        self.evaluate_guard_set(state, env, &guards, value, attempt)
    }

    /// Evaluate the per-input guards matching a value's labels.
    pub fn evaluate_input_guards(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        value: &StructuredValue,
    ) -> Result<GuardDecision, MlldError> {
        let guards: Vec<GuardDef> = state
            .guards
            .for_input(&value.descriptor.labels)
            .into_iter()
            .cloned()
            .collect();
        self.evaluate_guard_set(state, env, &guards, value, 1)
    }

    fn evaluate_guard_set(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        guards: &[GuardDef],
        value: &StructuredValue,
        attempt: u32,
    ) -> Result<GuardDecision, MlldError> {
        for guard in guards {
            let decision = self.evaluate_guard(state, env, guard, value, attempt)?;
            if decision != GuardDecision::Allow {
                return Ok(decision);
            }
        }
        Ok(GuardDecision::Allow)
    }

    fn evaluate_guard(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        guard: &GuardDef,
        value: &StructuredValue,
        attempt: u32,
    ) -> Result<GuardDecision, MlldError> {
        // Install the guard frame on the observed operation so rule bodies
        // see @ctx.op of the guarded op plus @ctx.guard and @ctx.output.
        if let Some(op) = state.ctx.current_mut() {
            op.guard = Some(GuardFrame {
                try_count: attempt,
                reason: None,
                output: Some(value.clone()),
            });
            op.security = value.descriptor.clone();
        }

        let result = self.evaluate_guard_rules(state, env, guard);

        if let Some(op) = state.ctx.current_mut() {
            op.guard = None;
        }
        result
    }

    fn evaluate_guard_rules(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        guard: &GuardDef,
    ) -> Result<GuardDecision, MlldError> {
        use crate::ast::types::GuardActionNode;

        for rule in &guard.rules {
            let matched = match &rule.condition {
                None => true,
                Some(condition) => self
                    .evaluate_expr(state, env, condition)
                    .map_err(|_| MlldError::ConditionFailed)?
                    .is_truthy(),
            };
            if !matched {
                continue;
            }

            return Ok(match &rule.action {
                GuardActionNode::Allow => GuardDecision::Allow,
                GuardActionNode::Deny { message } => {
                    let reason = match message {
                        Some(expr) => self.evaluate_expr(state, env, expr)?.text,
                        None => format!("denied by guard @{}", guard.name),
                    };
                    GuardDecision::Deny { reason }
                }
                GuardActionNode::Retry { hint } => {
                    let hint = match hint {
                        Some(expr) => Some(self.evaluate_expr(state, env, expr)?.text),
                        None => None,
                    };
                    GuardDecision::Retry { hint }
                }
                GuardActionNode::Prompt => match &self.hosts.approver {
                    Some(approver) => {
                        if approver.approve(&guard.name, "approval requested") {
                            GuardDecision::Allow
                        } else {
                            GuardDecision::Deny {
                                reason: format!("approval refused for guard @{}", guard.name),
                            }
                        }
                    }
                    // No approver available: prompt degrades to deny.
                    None => GuardDecision::Deny {
                        reason: format!("approval unavailable for guard @{}", guard.name),
                    },
                },
            });
        }
        Ok(GuardDecision::Allow)
    }
}
