//! Expression Evaluation
//!
//! Literals, variable references (including the ambient `@ctx`, `@input`,
//! and guard-time `@output` bindings), operators, collections, and the RHS
//! expression forms that delegate to other subsystems.

use serde_json::Value;

use crate::ast::types::{BinaryOp, Expr, UnaryOp};
use crate::content::loader::{resolve_file_reference, resolve_load_content};
use crate::env::environment::EnvId;
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::fields::traverse_fields;
use crate::interpreter::interpolation::{interpolate, InterpolationContext};
use crate::interpreter::types::InterpreterState;
use crate::values::{SecurityDescriptor, StructuredValue};

impl Evaluator<'_> {
    /// Evaluate an expression to a StructuredValue.
    pub fn evaluate_expr(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        expr: &Expr,
    ) -> Result<StructuredValue, MlldError> {
        match expr {
            Expr::Literal(value) => Ok(StructuredValue::from_json(value.clone())),

            Expr::VariableReference { name, fields, .. } => {
                self.resolve_reference(state, env, name, fields)
            }

            Expr::ExecInvocation(invocation) => self.invoke_executable(state, env, invocation),

            Expr::Binary { op, lhs, rhs } => self.evaluate_binary(state, env, *op, lhs, rhs),

            Expr::Unary { op, operand } => {
                let value = self.evaluate_expr(state, env, operand)?;
                let typed = match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => {
                        let n = value.typed.as_f64().unwrap_or(0.0);
                        number_value(-n)
                    }
                };
                Ok(StructuredValue::from_json(typed).with_descriptor(value.descriptor))
            }

            Expr::Array(items) => {
                let mut descriptor = SecurityDescriptor::new();
                let mut typed = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.evaluate_expr(state, env, item)?;
                    descriptor.merge(&value.descriptor);
                    typed.push(value.typed);
                }
                Ok(StructuredValue::from_json(Value::Array(typed)).with_descriptor(descriptor))
            }

            Expr::Object(entries) => {
                let mut descriptor = SecurityDescriptor::new();
                let mut map = serde_json::Map::new();
                for (key, value_expr) in entries {
                    let value = self.evaluate_expr(state, env, value_expr)?;
                    descriptor.merge(&value.descriptor);
                    map.insert(key.clone(), value.typed);
                }
                Ok(StructuredValue::from_json(Value::Object(map)).with_descriptor(descriptor))
            }

            Expr::Template(segments) => {
                let (text, descriptor) =
                    interpolate(state, env, segments, InterpolationContext::Default)?;
                Ok(StructuredValue::from_text(text).with_descriptor(descriptor))
            }

            Expr::Command(command) => self.run_command_segments(state, env, &command.segments, None, "run"),

            Expr::Code(code) => self.run_code_expr(state, env, code),

            Expr::LoadContent(load) => {
                let fs = self.hosts.fs()?;
                resolve_load_content(state, env, fs.as_ref(), load)
            }

            Expr::FileReference { load, fields } => {
                let fs = self.hosts.fs()?;
                resolve_file_reference(state, env, fs.as_ref(), load, fields)
            }

            Expr::Foreach(foreach) => self.evaluate_foreach(state, env, foreach),

            Expr::WhenExpression(when) => {
                let outcome = self.evaluate_when(state, env, when)?;
                Ok(outcome.value.unwrap_or_default())
            }

            Expr::ForExpression(for_node) => self.evaluate_for(state, env, for_node),

            Expr::LoopExpression(loop_node) => {
                let outcome = self.evaluate_loop(state, env, loop_node)?;
                Ok(outcome.value.unwrap_or_default())
            }
        }
    }

    /// Resolve `@name` with an optional field path. `ctx` and the pipeline /
    /// guard ambients resolve before regular lookup.
    fn resolve_reference(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        name: &str,
        fields: &[crate::ast::types::FieldAccess],
    ) -> Result<StructuredValue, MlldError> {
        let base = match name {
            "ctx" => StructuredValue::from_json(state.ctx.build_ctx()),
            "output" => state
                .ctx
                .guard_frame()
                .and_then(|g| g.output.clone())
                .ok_or_else(|| MlldError::UnknownVariable(name.to_string()))?,
            "input" => match state.ctx.pipeline_snapshot() {
                Some(pipe) => StructuredValue::from_json(pipe.input.clone()),
                None => self.lookup_variable(state, env, name)?,
            },
            _ => self.lookup_variable(state, env, name)?,
        };

        if fields.is_empty() {
            return Ok(base);
        }
        let typed = traverse_fields(&base.typed, fields)?;
        Ok(StructuredValue::from_json(typed).with_descriptor(base.descriptor))
    }

    fn lookup_variable(
        &self,
        state: &InterpreterState,
        env: EnvId,
        name: &str,
    ) -> Result<StructuredValue, MlldError> {
        state
            .arena
            .lookup(env, name)
            .map(|v| v.to_structured())
            .ok_or_else(|| MlldError::UnknownVariable(name.to_string()))
    }

    fn evaluate_binary(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<StructuredValue, MlldError> {
        // && and || short-circuit.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = self.evaluate_expr(state, env, lhs)?;
            let truthy = left.is_truthy();
            if (op == BinaryOp::And && !truthy) || (op == BinaryOp::Or && truthy) {
                return Ok(StructuredValue::from_json(Value::Bool(truthy))
                    .with_descriptor(left.descriptor));
            }
            let right = self.evaluate_expr(state, env, rhs)?;
            let mut descriptor = left.descriptor;
            descriptor.merge(&right.descriptor);
            return Ok(
                StructuredValue::from_json(Value::Bool(right.is_truthy()))
                    .with_descriptor(descriptor),
            );
        }

        let left = self.evaluate_expr(state, env, lhs)?;
        let right = self.evaluate_expr(state, env, rhs)?;
        let mut descriptor = left.descriptor.clone();
        descriptor.merge(&right.descriptor);

        let typed = match op {
            BinaryOp::Eq => Value::Bool(loose_eq(&left.typed, &right.typed)),
            BinaryOp::Ne => Value::Bool(!loose_eq(&left.typed, &right.typed)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(&left, &right);
                Value::Bool(match op {
                    BinaryOp::Lt => ordering == std::cmp::Ordering::Less,
                    BinaryOp::Le => ordering != std::cmp::Ordering::Greater,
                    BinaryOp::Gt => ordering == std::cmp::Ordering::Greater,
                    _ => ordering != std::cmp::Ordering::Less,
                })
            }
            BinaryOp::Add => match (&left.typed, &right.typed) {
                (Value::Number(a), Value::Number(b)) => {
                    number_value(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
                }
                _ => Value::String(format!("{}{}", left.text, right.text)),
            },
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };

        Ok(StructuredValue::from_json(typed).with_descriptor(descriptor))
    }
}

/// Equality that treats numbers numerically and everything else structurally.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        return x.as_f64() == y.as_f64();
    }
    a == b
}

fn compare(left: &StructuredValue, right: &StructuredValue) -> std::cmp::Ordering {
    match (left.typed.as_f64(), right.typed.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => left.text.cmp(&right.text),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
