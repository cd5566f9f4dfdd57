//! When Evaluation
//!
//! Three forms: simple (one condition), match (subject compared to each
//! branch), and block (first match wins). The `none` sentinel is a trailing
//! default; `denied` branches fire only inside a denied context. Modifiers:
//! `first` is identical to block, `any` evaluates to the first match, `all`
//! requires every condition truthy before the grouped actions run.

use crate::ast::types::{Expr, WhenBranch, WhenCondition, WhenForm, WhenModifier, WhenNode};
use crate::env::environment::EnvId;
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::types::{EvalOutcome, InterpreterState};

/// `none` written as a bare identifier arrives as a variable reference.
fn is_none_ident(expr: &Expr) -> bool {
    matches!(expr, Expr::VariableReference { name, fields, .. } if name == "none" && fields.is_empty())
}

fn mentions_none_under_operator(expr: &Expr) -> bool {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            is_none_ident(lhs)
                || is_none_ident(rhs)
                || mentions_none_under_operator(lhs)
                || mentions_none_under_operator(rhs)
        }
        Expr::Unary { operand, .. } => {
            is_none_ident(operand) || mentions_none_under_operator(operand)
        }
        _ => false,
    }
}

/// Normalize a branch condition: a bare `none` identifier is the sentinel.
fn condition_of(branch: &WhenBranch) -> Result<WhenCondition, MlldError> {
    match &branch.condition {
        WhenCondition::Expr(expr) if mentions_none_under_operator(expr) => {
            Err(MlldError::NoneWithOperators)
        }
        WhenCondition::Expr(expr) if is_none_ident(expr) => Ok(WhenCondition::None),
        other => Ok(other.clone()),
    }
}

/// `none` may only appear as the last condition(s).
fn validate_none_placement(conditions: &[WhenCondition]) -> Result<(), MlldError> {
    let mut seen_none = false;
    for condition in conditions {
        match condition {
            WhenCondition::None => seen_none = true,
            WhenCondition::Denied => {}
            WhenCondition::Expr(_) if seen_none => return Err(MlldError::NonePlacement),
            WhenCondition::Expr(_) => {}
        }
    }
    Ok(())
}

impl Evaluator<'_> {
    pub fn evaluate_when(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &WhenNode,
    ) -> Result<EvalOutcome, MlldError> {
        let conditions: Vec<WhenCondition> = node
            .branches
            .iter()
            .map(condition_of)
            .collect::<Result<_, _>>()?;
        validate_none_placement(&conditions)?;

        match (&node.form, node.modifier) {
            (_, Some(WhenModifier::All)) => self.evaluate_when_all(state, env, node, &conditions),
            (WhenForm::Match { subject }, _) => {
                self.evaluate_when_match(state, env, node, &conditions, subject)
            }
            // Simple, block, `first`, and `any` all take the first match.
            _ => self.evaluate_when_first(state, env, node, &conditions),
        }
    }

    fn branch_fires(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        condition: &WhenCondition,
    ) -> Result<bool, MlldError> {
        match condition {
            WhenCondition::Expr(expr) => Ok(self.evaluate_expr(state, env, expr)?.is_truthy()),
            WhenCondition::None => Ok(true),
            WhenCondition::Denied => Ok(state.ctx.is_denied()),
        }
    }

    fn evaluate_when_first(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &WhenNode,
        conditions: &[WhenCondition],
    ) -> Result<EvalOutcome, MlldError> {
        for (branch, condition) in node.branches.iter().zip(conditions) {
            if self.branch_fires(state, env, condition)? {
                return self.evaluate_nodes(state, env, &branch.actions);
            }
        }
        Ok(EvalOutcome::none())
    }

    fn evaluate_when_match(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &WhenNode,
        conditions: &[WhenCondition],
        subject: &Expr,
    ) -> Result<EvalOutcome, MlldError> {
        let subject_value = self.evaluate_expr(state, env, subject)?;
        for (branch, condition) in node.branches.iter().zip(conditions) {
            let fires = match condition {
                WhenCondition::Expr(expr) => {
                    let candidate = self.evaluate_expr(state, env, expr)?;
                    candidate.typed == subject_value.typed
                }
                WhenCondition::None => true,
                WhenCondition::Denied => state.ctx.is_denied(),
            };
            if fires {
                return self.evaluate_nodes(state, env, &branch.actions);
            }
        }
        Ok(EvalOutcome::none())
    }

    /// `all`: every condition must be truthy; then the branches' actions run
    /// as one grouped sequence.
    fn evaluate_when_all(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &WhenNode,
        conditions: &[WhenCondition],
    ) -> Result<EvalOutcome, MlldError> {
        for condition in conditions {
            if let WhenCondition::Expr(_) = condition {
                if !self.branch_fires(state, env, condition)? {
                    return Ok(EvalOutcome::none());
                }
            }
        }
        let mut last = EvalOutcome::none();
        for branch in &node.branches {
            last = self.evaluate_nodes(state, env, &branch.actions)?;
        }
        Ok(last)
    }
}
