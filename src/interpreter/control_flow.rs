//! Control Flow Evaluation
//!
//! `if`, `for`/`foreach`, `loop`, and exe blocks. Return control unwinds as
//! a typed signal caught at the exe-block boundary. Parallel `for` creates
//! an isolation-root environment whose descendants may not mutate outer
//! bindings.

use regex_lite::Regex;
use serde_json::Value;

use crate::ast::types::{ExeBlockNode, ForBody, ForNode, ForeachExpr, IfNode, LoopNode};
use crate::context::OperationContext;
use crate::env::environment::EnvId;
use crate::env::factory::VariableFactory;
use crate::interpreter::errors::{LimitKind, MlldError};
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::types::{EvalOutcome, InterpreterState};
use crate::values::{SecurityDescriptor, StructuredValue, ValueType};

/// Validate that a name is a usable identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    re.is_match(name)
}

impl Evaluator<'_> {
    /// `if` short-circuits on the condition; an ExeReturn in either branch
    /// propagates to the enclosing exe block.
    pub fn evaluate_if(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &IfNode,
    ) -> Result<EvalOutcome, MlldError> {
        if self.evaluate_expr(state, env, &node.condition)?.is_truthy() {
            return self.evaluate_nodes(state, env, &node.then_branch);
        }
        if let Some(else_branch) = &node.else_branch {
            return self.evaluate_nodes(state, env, else_branch);
        }
        Ok(EvalOutcome::none())
    }

    /// `for @x in xs`: sequential unless marked parallel. The result is the
    /// collection of body values in input order.
    pub fn evaluate_for(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &ForNode,
    ) -> Result<StructuredValue, MlldError> {
        let iterable = self.evaluate_expr(state, env, &node.iterable)?;
        let items = match &iterable.typed {
            Value::Array(items) => items.clone(),
            other => {
                return Err(MlldError::ForNotIterable(
                    ValueType::of(other).as_str().to_string(),
                ))
            }
        };

        if items.len() as u64 > self.limits.max_loop_iterations {
            return Err(MlldError::Limit {
                kind: LimitKind::Iterations,
                limit: self.limits.max_loop_iterations,
            });
        }

        // Parallel iterations hang off an isolation root; each branch gets a
        // deep-cloned input and its own child frame.
        let iteration_parent = if node.parallel {
            state.arena.child_isolated(env)
        } else {
            env
        };

        let mut results: Vec<Value> = Vec::with_capacity(items.len());
        let mut descriptor = iterable.descriptor.clone();
        for item in items {
            let iteration_env = state.arena.child(iteration_parent);
            let item_value =
                StructuredValue::from_json(item).with_descriptor(iterable.descriptor.clone());
            state.arena.define_parameter(
                iteration_env,
                VariableFactory::parameter(&node.variable, item_value),
            );

            let outcome = match &node.body {
                ForBody::Expr(expr) => {
                    EvalOutcome::value(self.evaluate_expr(state, iteration_env, expr)?)
                }
                ForBody::Block(nodes) => self.evaluate_nodes(state, iteration_env, nodes)?,
            };
            if let Some(value) = outcome.value {
                descriptor.merge(&value.descriptor);
                results.push(value.typed);
            } else {
                results.push(Value::Null);
            }
        }

        Ok(StructuredValue::from_json(Value::Array(results)).with_descriptor(descriptor))
    }

    /// `foreach @f(@xs, @ys)`: pointwise application over aligned
    /// collections.
    pub fn evaluate_foreach(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &ForeachExpr,
    ) -> Result<StructuredValue, MlldError> {
        let exe = state
            .arena
            .lookup(env, &node.name)
            .cloned()
            .ok_or_else(|| MlldError::UnknownVariable(node.name.clone()))?;
        if !exe.is_executable() {
            return Err(MlldError::NotExecutable(node.name.clone()));
        }

        let mut collections: Vec<Vec<Value>> = Vec::with_capacity(node.collections.len());
        let mut descriptor = SecurityDescriptor::new();
        for expr in &node.collections {
            let value = self.evaluate_expr(state, env, expr)?;
            descriptor.merge(&value.descriptor);
            match value.typed {
                Value::Array(items) => collections.push(items),
                other => {
                    return Err(MlldError::ForNotIterable(
                        ValueType::of(&other).as_str().to_string(),
                    ))
                }
            }
        }

        let len = collections.first().map(|c| c.len()).unwrap_or(0);
        for collection in &collections {
            if collection.len() != len {
                return Err(MlldError::ForeachLengthMismatch(len, collection.len()));
            }
        }

        let mut results = Vec::with_capacity(len);
        for index in 0..len {
            let args: Vec<StructuredValue> = collections
                .iter()
                .map(|c| StructuredValue::from_json(c[index].clone()))
                .collect();

            let mut op = OperationContext::named("exe", &node.name);
            op.executable_type = exe
                .as_executable()
                .map(|def| def.body.type_name().to_string());
            state.ctx.push_operation(op);
            let result = self.execute_executable(state, env, &exe, &args);
            state.ctx.pop_operation();

            let value = result?;
            descriptor.merge(&value.descriptor);
            results.push(value.typed);
        }

        Ok(StructuredValue::from_json(Value::Array(results)).with_descriptor(descriptor))
    }

    /// Bounded repeat; the running iteration is visible as `@ctx.try`.
    pub fn evaluate_loop(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &LoopNode,
    ) -> Result<EvalOutcome, MlldError> {
        let count_value = self.evaluate_expr(state, env, &node.count)?;
        let count = count_value.typed.as_u64().unwrap_or(0);
        if count > self.limits.max_loop_iterations {
            return Err(MlldError::Limit {
                kind: LimitKind::Iterations,
                limit: self.limits.max_loop_iterations,
            });
        }

        let mut last = EvalOutcome::none();
        for iteration in 0..count {
            let mut op = OperationContext::new("loop");
            op.try_count = iteration as u32 + 1;
            state.ctx.push_operation(op);
            let result = self.evaluate_nodes(state, env, &node.body);
            state.ctx.pop_operation();
            last = result?;
        }
        Ok(last)
    }

    /// Exe block: statements run in a shadowing child scope; `return`
    /// short-circuits with its value, otherwise the last statement's value
    /// is the block value.
    pub fn evaluate_exe_block(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        node: &ExeBlockNode,
    ) -> Result<StructuredValue, MlldError> {
        let block_env = state.arena.child_shadowing(env);
        let mut last = EvalOutcome::none();
        for statement in &node.statements {
            match self.evaluate_node(state, block_env, statement) {
                Ok(outcome) => last = outcome,
                Err(MlldError::Return(signal)) => return Ok(signal.value),
                Err(err) => return Err(err),
            }
        }
        Ok(last.value.unwrap_or_default())
    }
}
