//! Executable Invocation
//!
//! Resolves an executable by name, binds arguments, runs guards, and
//! dispatches over the execution strategies: command, code (including the
//! `mlld-when` / `mlld-exe-block` pseudo-languages), template, commandRef,
//! prose, and builtin transformers.
//!
//! An invocation never mutates its call site; retries re-execute with a
//! fresh child environment and an incremented try counter.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::ast::types::{CodeExpr, ExecInvocationNode, Expr, TemplateSegment};
use crate::context::{DeniedInfo, OperationContext};
use crate::env::environment::EnvId;
use crate::env::factory::VariableFactory;
use crate::env::variable::{CodeSource, ExecutableBody, ExecutableDef, Variable};
use crate::exec::{
    exit_failure, validate_command, validate_env_payload, CodeRequest, CommandRequest,
    ProviderRequest,
};
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::interpolation::{interpolate, InterpolationContext};
use crate::interpreter::types::InterpreterState;
use crate::policy::{invoke_keychain, GuardDecision, LabelFlowQuery};
use crate::values::{SecurityDescriptor, StructuredValue};

/// Languages whose runtimes receive captured shadow environments.
fn is_js_family(language: &str) -> bool {
    matches!(language, "js" | "javascript" | "node" | "nodejs")
}

impl Evaluator<'_> {
    /// Full invocation path: resolve, bind, guard, execute, then apply the
    /// with-clause pipeline with this invocation as the synthetic source.
    pub fn invoke_executable(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        invocation: &ExecInvocationNode,
    ) -> Result<StructuredValue, MlldError> {
        let exe = state
            .arena
            .lookup(env, &invocation.name)
            .cloned()
            .ok_or_else(|| MlldError::UnknownVariable(invocation.name.clone()))?;
        if !exe.is_executable() {
            return Err(MlldError::NotExecutable(invocation.name.clone()));
        }

        let mut args = Vec::with_capacity(invocation.args.len());
        for arg in &invocation.args {
            args.push(self.evaluate_expr(state, env, arg)?);
        }

        let using = invocation
            .with_clause
            .as_ref()
            .and_then(|wc| wc.using.clone());
        let saved_provider = state.active_provider.take();
        if using.is_some() {
            state.active_provider = using;
        }
        let result = self.invoke_with_guards(state, env, &exe, &args);
        state.active_provider = saved_provider;
        let mut out = result?;

        if let Some(with_clause) = &invocation.with_clause {
            if let Some(stages) = &with_clause.pipeline {
                let source = crate::pipeline::executor::SyntheticSource {
                    exe: exe.clone(),
                    args: args.clone(),
                };
                out = self.run_pipeline(state, env, stages, out, Some(&source))?;
            }
            out = apply_format(out, with_clause.as_format.as_deref());
        }

        Ok(out)
    }

    /// Guarded execution of a resolved executable. A guard `retry` re-runs
    /// the guard loop with an incremented try; `deny` flips into the denied
    /// context and hands control to the executable's denied-aware body.
    pub fn invoke_with_guards(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        exe: &Variable,
        args: &[StructuredValue],
    ) -> Result<StructuredValue, MlldError> {
        let guard_input = args.first().cloned().unwrap_or_default();
        let op = self.exec_context(state, exe, args, 1);
        state.ctx.push_operation(op);

        // Per-input guards observe every argument as it is bound. Denial
        // here means the same thing it means per-operation: the op enters
        // the denied context instead of erroring.
        let mut decision = GuardDecision::Allow;
        for arg in args {
            match self.evaluate_input_guards(state, env, arg) {
                Err(err) => {
                    state.ctx.pop_operation();
                    return Err(err);
                }
                Ok(GuardDecision::Deny { reason }) => {
                    decision = GuardDecision::Deny { reason };
                    break;
                }
                Ok(_) => {}
            }
        }

        if decision == GuardDecision::Allow {
            let mut attempt: u32 = 1;
            decision = loop {
                let result =
                    self.evaluate_operation_guards(state, env, "exe", &guard_input, attempt);
                match result {
                    Err(err) => {
                        state.ctx.pop_operation();
                        return Err(err);
                    }
                    Ok(GuardDecision::Retry { .. }) => {
                        attempt += 1;
                        if attempt > 100 {
                            state.ctx.pop_operation();
                            return Err(MlldError::PipelineIterationCap);
                        }
                        if let Some(top) = state.ctx.current_mut() {
                            top.try_count = attempt;
                        }
                    }
                    Ok(other) => break other,
                }
            };
        }

        let result = match decision {
            GuardDecision::Allow => self.execute_executable_in_context(state, env, exe, args),
            GuardDecision::Deny { reason } => {
                if let Some(top) = state.ctx.current_mut() {
                    top.denied = Some(DeniedInfo {
                        reason: reason.clone(),
                    });
                }
                self.execute_denied_body(state, env, exe, args)
            }
            // evaluate_guard_rules resolves prompt/retry before this point.
            _ => Ok(StructuredValue::empty()),
        };

        state.ctx.pop_operation();
        result
    }

    /// Build the operation context for an exec frame.
    pub(crate) fn exec_context(
        &self,
        state: &InterpreterState,
        exe: &Variable,
        args: &[StructuredValue],
        try_count: u32,
    ) -> OperationContext {
        let mut op = OperationContext::named("exe", &exe.name);
        op.try_count = try_count;
        op.exec_depth = state.ctx.exec_depth() + 1;
        if let Some(def) = exe.as_executable() {
            op.executable_type = Some(def.body.type_name().to_string());
            op.labels = def.labels.clone();
        }
        op.security =
            SecurityDescriptor::union_all(args.iter().map(|a| &a.descriptor));
        op
    }

    /// The denied path: a `when`/block body still evaluates so its `denied`
    /// branches can catch the denial; any other body is aborted outright.
    pub(crate) fn execute_denied_body(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        exe: &Variable,
        args: &[StructuredValue],
    ) -> Result<StructuredValue, MlldError> {
        let def = match exe.as_executable() {
            Some(def) => def.clone(),
            None => return Ok(StructuredValue::empty()),
        };
        match &def.body {
            ExecutableBody::Code { source, .. } => match source {
                CodeSource::When(when) => {
                    let child = self.bind_parameters(state, env, &def, args);
                    let outcome = self.evaluate_when(state, child, when)?;
                    Ok(outcome.value.unwrap_or_default())
                }
                CodeSource::Block(block) => {
                    let child = self.bind_parameters(state, env, &def, args);
                    self.evaluate_exe_block(state, child, block)
                }
                CodeSource::Segments(_) => Ok(StructuredValue::empty()),
            },
            _ => Ok(StructuredValue::empty()),
        }
    }

    /// Execute with a fresh exec context pushed; used by paths that have not
    /// pushed one themselves.
    fn execute_executable_in_context(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        exe: &Variable,
        args: &[StructuredValue],
    ) -> Result<StructuredValue, MlldError> {
        self.execute_executable(state, env, exe, args)
    }

    /// Strategy dispatch. Callers own the operation context; this binds
    /// parameters, runs the body, and derives the output descriptor.
    pub fn execute_executable(
        &self,
        state: &mut InterpreterState,
        caller_env: EnvId,
        exe: &Variable,
        args: &[StructuredValue],
    ) -> Result<StructuredValue, MlldError> {
        let def = exe
            .as_executable()
            .cloned()
            .ok_or_else(|| MlldError::NotExecutable(exe.name.clone()))?;

        let child = self.bind_parameters(state, caller_env, &def, args);

        let result = match &def.body {
            ExecutableBody::Command { segments } => {
                self.check_exec_label_flow(state, &def, args)?;
                self.run_command_segments(state, child, segments, None, "exe")
            }
            ExecutableBody::Code { language, source } => {
                self.run_code_body(state, child, exe, language, source, &def, args)
            }
            ExecutableBody::Template { parts } => {
                let (text, descriptor) =
                    interpolate(state, child, parts, InterpolationContext::Default)?;
                Ok(StructuredValue::from_text(text).with_descriptor(descriptor))
            }
            ExecutableBody::CommandRef { target, args: ref_args } => {
                self.run_command_ref(state, child, &exe.name, target, ref_args)
            }
            ExecutableBody::Prose { recipe } => {
                let (text, descriptor) =
                    interpolate(state, child, recipe, InterpolationContext::Default)?;
                Ok(StructuredValue::from_text(text).with_descriptor(descriptor))
            }
            ExecutableBody::Builtin { .. } => self.run_builtin(state, exe, args),
        }?;

        let arg_descriptors: Vec<&SecurityDescriptor> =
            args.iter().map(|a| &a.descriptor).collect();
        let derived = state.policy.derive_output_descriptor(
            &arg_descriptors,
            &BTreeSet::new(),
            &def.labels,
        );
        let mut out = result;
        out.merge_descriptor(&derived);
        Ok(out)
    }

    /// Child environment with parameters bound positionally; missing args
    /// default to the empty string.
    fn bind_parameters(
        &self,
        state: &mut InterpreterState,
        caller_env: EnvId,
        def: &ExecutableDef,
        args: &[StructuredValue],
    ) -> EnvId {
        let child = state.arena.child(caller_env);
        for (index, param) in def.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_else(StructuredValue::empty);
            state
                .arena
                .define_parameter(child, VariableFactory::parameter(param, value));
        }
        child
    }

    fn check_exec_label_flow(
        &self,
        state: &InterpreterState,
        def: &ExecutableDef,
        args: &[StructuredValue],
    ) -> Result<(), MlldError> {
        let input = SecurityDescriptor::union_all(args.iter().map(|a| &a.descriptor));
        let mut op_labels = BTreeSet::new();
        op_labels.insert("op:exec".to_string());
        state.policy.check_label_flow(&LabelFlowQuery {
            input_labels: input.labels,
            input_taint: input.taint,
            op_labels,
            exe_labels: def.labels.clone(),
            flow_channel: "exec".to_string(),
            command: None,
        })
    }

    /// Interpolate, validate, and dispatch a command line; shared by command
    /// executables and the `run` directive.
    pub fn run_command_segments(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        segments: &[TemplateSegment],
        using: Option<&str>,
        directive_type: &str,
    ) -> Result<StructuredValue, MlldError> {
        let (command, descriptor) =
            interpolate(state, env, segments, InterpolationContext::ShellSafe)?;
        validate_command(&command, &self.hosts.safety)?;

        let provider_name = using
            .map(String::from)
            .or_else(|| state.active_provider.clone());

        // Parameters of the executing frame are injected as env vars.
        let mut env_vars: HashMap<String, String> = HashMap::new();
        let mut secrets: HashMap<String, String> = HashMap::new();
        for (name, var) in &state.arena.frame(env).parameters {
            let value = var.to_structured();
            if value.descriptor.has_label("secret") {
                secrets.insert(name.clone(), value.text);
            } else {
                env_vars.insert(name.clone(), value.text);
            }
        }
        validate_env_payload(&env_vars, &self.hosts.safety)?;

        let request = CommandRequest {
            command: command.clone(),
            working_directory: state.cwd.clone(),
            env_vars: env_vars.clone(),
            stdin: None,
            timeout: None,
        };

        let outcome = match provider_name.as_deref() {
            Some(provider_name) => {
                let provider = self
                    .hosts
                    .providers
                    .get(provider_name)
                    .cloned()
                    .ok_or(MlldError::HostUnavailable("command provider"))?;
                provider.run(&ProviderRequest {
                    command: command.clone(),
                    working_directory: state.cwd.clone(),
                    vars: env_vars,
                    secrets,
                })?
            }
            None => self.hosts.command()?.execute(&request)?,
        };

        if outcome.exit_code != 0 {
            return Err(exit_failure(&request, &outcome, directive_type));
        }

        let mut out_descriptor = descriptor;
        out_descriptor.add_taint("src:command");
        let text = outcome.output.trim_end_matches('\n').to_string();
        Ok(StructuredValue::from_text(text).with_descriptor(out_descriptor))
    }

    /// Code RHS outside an executable definition (`var @x = js {...}`).
    pub fn run_code_expr(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        code: &CodeExpr,
    ) -> Result<StructuredValue, MlldError> {
        let def = ExecutableDef::new(
            Vec::new(),
            ExecutableBody::Code {
                language: code.language.clone(),
                source: CodeSource::Segments(code.segments.clone()),
            },
        );
        let exe = VariableFactory::executable(
            "<inline>",
            def,
            crate::env::variable::VariableSource::directive("var", "code"),
            None,
        );
        self.execute_executable(state, env, &exe, &[])
    }

    #[allow(clippy::too_many_arguments)]
    fn run_code_body(
        &self,
        state: &mut InterpreterState,
        child: EnvId,
        exe: &Variable,
        language: &str,
        source: &CodeSource,
        def: &ExecutableDef,
        args: &[StructuredValue],
    ) -> Result<StructuredValue, MlldError> {
        match source {
            // The pseudo-languages hand control back to the evaluator.
            CodeSource::When(when) => {
                let outcome = self.evaluate_when(state, child, when)?;
                Ok(outcome.value.unwrap_or_default())
            }
            CodeSource::Block(block) => self.evaluate_exe_block(state, child, block),
            CodeSource::Segments(segments) => {
                let (source_text, descriptor) =
                    interpolate(state, child, segments, InterpolationContext::Default)?;

                // Arguments are passed by name.
                let mut named_args: HashMap<String, Value> = HashMap::new();
                for (index, param) in def.params.iter().enumerate() {
                    let value = args
                        .get(index)
                        .map(|a| a.typed.clone())
                        .unwrap_or(Value::String(String::new()));
                    named_args.insert(param.clone(), value);
                }

                let shadow = if is_js_family(language) {
                    exe.internal
                        .captured_shadow_envs
                        .clone()
                        .unwrap_or_else(|| state.shadow_envs.clone())
                } else {
                    Default::default()
                };

                let request = CodeRequest {
                    language: language.to_string(),
                    source: source_text,
                    args: named_args,
                    shadow,
                    timeout: None,
                };
                let outcome = self.hosts.code()?.run(&request)?;

                let mut out = match outcome.value {
                    Some(value) => StructuredValue::from_json(value),
                    None => {
                        let text = outcome.output.trim_end_matches('\n').to_string();
                        auto_parse_structured(text)
                    }
                };
                out.merge_descriptor(&descriptor);
                Ok(out)
            }
        }
    }

    /// CommandRef strategy: rewrite to the referenced executable with the
    /// stored arguments, detecting cycles via the call stack.
    fn run_command_ref(
        &self,
        state: &mut InterpreterState,
        child: EnvId,
        caller_name: &str,
        target: &str,
        ref_args: &[Expr],
    ) -> Result<StructuredValue, MlldError> {
        state.call_stack.push(caller_name.to_string());
        let result = self.run_command_ref_inner(state, child, target, ref_args);
        state.call_stack.pop();
        result
    }

    fn run_command_ref_inner(
        &self,
        state: &mut InterpreterState,
        child: EnvId,
        target: &str,
        ref_args: &[Expr],
    ) -> Result<StructuredValue, MlldError> {
        if let Some(pos) = state.call_stack.iter().position(|name| name == target) {
            let mut chain: Vec<String> = state.call_stack[pos..].to_vec();
            chain.push(target.to_string());
            return Err(MlldError::CircularReference(chain.join(" -> ")));
        }

        let mut args = Vec::with_capacity(ref_args.len());
        for arg in ref_args {
            args.push(self.evaluate_expr(state, child, arg)?);
        }

        let target_var = state
            .arena
            .lookup(child, target)
            .cloned()
            .ok_or_else(|| MlldError::UnknownVariable(target.to_string()))?;
        if !target_var.is_executable() {
            return Err(MlldError::NotExecutable(target.to_string()));
        }
        self.execute_executable(state, child, &target_var, &args)
    }

    /// Builtin transformers receive already-evaluated args; keychain roles
    /// go through the keychain gate.
    fn run_builtin(
        &self,
        state: &mut InterpreterState,
        exe: &Variable,
        args: &[StructuredValue],
    ) -> Result<StructuredValue, MlldError> {
        let _ = state;
        if let Some(function) = exe.internal.keychain_function {
            let keychain = self
                .hosts
                .keychain
                .clone()
                .ok_or(MlldError::HostUnavailable("keychain"))?;
            return invoke_keychain(&keychain, function, args);
        }
        let implementation = exe
            .internal
            .transformer_implementation
            .clone()
            .ok_or_else(|| MlldError::NotExecutable(exe.name.clone()))?;
        (implementation.0)(args)
    }
}

/// Auto-parse command/code output that looks structured.
fn auto_parse_structured(text: String) -> StructuredValue {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return StructuredValue::from_json(value);
        }
    }
    StructuredValue::from_text(text)
}

/// Apply a with-clause `asFormat` override.
fn apply_format(value: StructuredValue, format: Option<&str>) -> StructuredValue {
    match format {
        Some("json") => {
            let descriptor = value.descriptor.clone();
            match serde_json::from_str::<Value>(&value.text) {
                Ok(parsed) => StructuredValue::from_json(parsed).with_descriptor(descriptor),
                Err(_) => value,
            }
        }
        Some("text") => {
            let descriptor = value.descriptor.clone();
            StructuredValue::from_text(value.text.clone()).with_descriptor(descriptor)
        }
        _ => value,
    }
}
