//! Directive Evaluation
//!
//! One evaluator per directive kind. Value-producing directives (`var`,
//! `show`, `run`, `output`) may trigger executable invocation and pipelines;
//! binding directives (`exe`, `guard`, `import`, `export`, `env`) extend the
//! environment or the registries.

use serde_json::Value;

use crate::ast::types::{
    DirectiveKind, DirectiveNode, EnvDirective, ExeBody, ExeDirective, ExportDirective, Expr,
    GuardDirective, ImportDirective, Node, OutputDirective, OutputFormat, OutputSink,
    PipelineStage, RunDirective, ShowDirective, VarDirective,
};
use crate::context::{DeniedInfo, OperationContext};
use crate::env::environment::EnvId;
use crate::env::factory::VariableFactory;
use crate::env::variable::{CodeSource, ExecutableBody, ExecutableDef, VariableSource};
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::interpolation::{interpolate, InterpolationContext};
use crate::interpreter::types::{EvalOutcome, InterpreterState};
use crate::policy::{GuardDecision, GuardDef};
use crate::values::StructuredValue;

impl Evaluator<'_> {
    pub fn evaluate_directive(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        directive: &DirectiveNode,
    ) -> Result<EvalOutcome, MlldError> {
        match &directive.kind {
            DirectiveKind::Var(var) => self.eval_var(state, env, var, directive),
            DirectiveKind::Exe(exe) => self.eval_exe(state, env, exe),
            DirectiveKind::Show(show) => self.eval_show(state, env, show),
            DirectiveKind::Run(run) => self.eval_run(state, env, run),
            DirectiveKind::Output(output) => self.eval_output(state, env, output),
            DirectiveKind::When(when) => self.evaluate_when(state, env, when),
            DirectiveKind::If(if_node) => self.evaluate_if(state, env, if_node),
            DirectiveKind::For(for_node) => {
                self.evaluate_for(state, env, for_node)?;
                Ok(EvalOutcome::none())
            }
            DirectiveKind::Foreach(foreach) => {
                let value = self.evaluate_foreach(state, env, foreach)?;
                Ok(EvalOutcome::value(value))
            }
            DirectiveKind::Loop(loop_node) => self.evaluate_loop(state, env, loop_node),
            DirectiveKind::Import(import) => self.eval_import(state, env, import),
            DirectiveKind::Export(export) => self.eval_export(state, export),
            DirectiveKind::Guard(guard) => self.eval_guard(state, guard),
            DirectiveKind::Env(env_directive) => self.eval_env(state, env, env_directive),
        }
    }

    /// `var @name = RHS`: evaluate, wrap, and bind. Command/code/exec RHS
    /// marks the variable retryable with the originating node recorded;
    /// template RHS is stored as AST, not pre-interpolated.
    fn eval_var(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        var: &VarDirective,
        directive: &DirectiveNode,
    ) -> Result<EvalOutcome, MlldError> {
        if !crate::interpreter::control_flow::is_valid_identifier(&var.name) {
            return Err(MlldError::InvalidIdentifier(var.name.clone()));
        }

        // Template RHS never pre-interpolates.
        if let Expr::Template(parts) = &var.value {
            let variable = VariableFactory::template(
                &var.name,
                parts.clone(),
                VariableSource::directive("var", "template"),
            );
            state.arena.define(env, variable)?;
            return Ok(EvalOutcome::none());
        }

        state
            .ctx
            .push_operation(OperationContext::named("var", &var.name));
        let result = self.eval_var_value(state, env, var);
        state.ctx.pop_operation();
        let value = match result? {
            Some(value) => value,
            // Guard denial aborts the binding; denied is a context, not an
            // error.
            None => return Ok(EvalOutcome::none()),
        };

        let retryable = matches!(
            &var.value,
            Expr::Command(_) | Expr::Code(_) | Expr::ExecInvocation(_)
        );
        let variable = if retryable {
            VariableFactory::retryable(
                &var.name,
                value,
                VariableSource::directive("var", rhs_syntax(&var.value)),
                Node::Directive(directive.clone()),
            )
        } else {
            VariableFactory::structured(
                &var.name,
                value,
                VariableSource::directive("var", rhs_syntax(&var.value)),
            )
        };
        state.arena.define(env, variable)?;
        Ok(EvalOutcome::none())
    }

    fn eval_var_value(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        var: &VarDirective,
    ) -> Result<Option<StructuredValue>, MlldError> {
        let mut value = self.evaluate_expr(state, env, &var.value)?;

        if let GuardDecision::Deny { reason } = self.evaluate_input_guards(state, env, &value)? {
            if let Some(top) = state.ctx.current_mut() {
                top.denied = Some(DeniedInfo { reason });
            }
            return Ok(None);
        }

        if let Some(stages) = &var.pipeline {
            value = self.run_rhs_pipeline(state, env, &var.value, stages, value)?;
        }
        Ok(Some(value))
    }

    /// Tail pipeline over an RHS value; an invocation RHS doubles as the
    /// synthetic source for retry-from-0.
    fn run_rhs_pipeline(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        rhs: &Expr,
        stages: &[PipelineStage],
        value: StructuredValue,
    ) -> Result<StructuredValue, MlldError> {
        if let Expr::ExecInvocation(invocation) = rhs {
            if let Some(exe) = state.arena.lookup(env, &invocation.name).cloned() {
                if exe.is_executable() {
                    let mut args = Vec::with_capacity(invocation.args.len());
                    for arg in &invocation.args {
                        args.push(self.evaluate_expr(state, env, arg)?);
                    }
                    let source = crate::pipeline::executor::SyntheticSource { exe, args };
                    return self.run_pipeline(state, env, stages, value, Some(&source));
                }
            }
        }
        self.run_pipeline(state, env, stages, value, None)
    }

    /// `show`: render the value into the document body, unless a guard
    /// denies the display.
    fn eval_show(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        show: &ShowDirective,
    ) -> Result<EvalOutcome, MlldError> {
        state.ctx.push_operation(OperationContext::new("show"));
        let result = (|| {
            let mut value = self.evaluate_expr(state, env, &show.value)?;
            if let Some(stages) = &show.pipeline {
                value = self.run_rhs_pipeline(state, env, &show.value, stages, value)?;
            }
            match self.evaluate_operation_guards(state, env, "show", &value, 1)? {
                GuardDecision::Deny { reason } => {
                    if let Some(top) = state.ctx.current_mut() {
                        top.denied = Some(DeniedInfo { reason });
                    }
                    Ok(None)
                }
                _ => Ok(Some(value)),
            }
        })();
        state.ctx.pop_operation();

        if let Some(value) = result? {
            if !value.text.is_empty() {
                state.doc.append_body(&value.text);
            }
        }
        Ok(EvalOutcome::none())
    }

    /// `run {command}`: immediate execution; output renders into the
    /// document body.
    fn eval_run(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        run: &RunDirective,
    ) -> Result<EvalOutcome, MlldError> {
        state.ctx.push_operation(OperationContext::new("run"));
        let result = (|| {
            let decision = self.evaluate_operation_guards(
                state,
                env,
                "run",
                &StructuredValue::empty(),
                1,
            )?;
            if let GuardDecision::Deny { reason } = decision {
                // The command never executes; the denial stays catchable.
                if let Some(top) = state.ctx.current_mut() {
                    top.denied = Some(DeniedInfo { reason });
                }
                return Ok(None);
            }
            let mut value =
                self.run_command_segments(state, env, &run.command.segments, None, "run")?;
            if let Some(stages) = &run.pipeline {
                value = self.run_pipeline(state, env, stages, value, None)?;
            }
            Ok(Some(value))
        })();
        state.ctx.pop_operation();

        match result? {
            Some(value) => {
                if !value.text.is_empty() {
                    state.doc.append_body(&value.text);
                }
                Ok(EvalOutcome::value(value))
            }
            None => Ok(EvalOutcome::none()),
        }
    }

    /// `output @v to <sink> [as <format>]`.
    fn eval_output(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        output: &OutputDirective,
    ) -> Result<EvalOutcome, MlldError> {
        state.ctx.push_operation(OperationContext::new("output"));
        let result = (|| {
            let value = self.evaluate_expr(state, env, &output.value)?;
            match self.evaluate_operation_guards(state, env, "output", &value, 1)? {
                GuardDecision::Deny { reason } => {
                    // Nothing reaches the sink; the denial stays catchable.
                    if let Some(top) = state.ctx.current_mut() {
                        top.denied = Some(DeniedInfo { reason });
                    }
                    Ok(None)
                }
                _ => Ok(Some(value)),
            }
        })();
        state.ctx.pop_operation();

        let value = match result? {
            Some(value) => value,
            None => return Ok(EvalOutcome::none()),
        };

        let rendered = render_output(&value, output.format)?;
        match &output.sink {
            OutputSink::File(path_segments) => {
                let (raw_path, _) =
                    interpolate(state, env, path_segments, InterpolationContext::Default)?;
                let fs = self.hosts.fs()?;
                let path = fs.resolve_path(&state.cwd, &raw_path);
                fs.write_file(&path, &rendered).map_err(|e| {
                    MlldError::execution(
                        format!("Failed to write output to {}: {}", path, e),
                        Default::default(),
                    )
                })?;
            }
            OutputSink::Stdout => state.doc.stdout.push_str(&rendered),
            OutputSink::Stderr => state.doc.stderr.push_str(&rendered),
            OutputSink::Env(name) => {
                let var_name = match name {
                    Some(explicit) => explicit.clone(),
                    None => default_env_name(&output.value),
                };
                state.doc.env_vars.insert(var_name, rendered);
            }
            OutputSink::Resolver(target) => {
                let sink = self
                    .hosts
                    .resolver_sink
                    .clone()
                    .ok_or(MlldError::HostUnavailable("resolver"))?;
                sink.route(target, &rendered)?;
            }
        }
        Ok(EvalOutcome::none())
    }

    /// `exe @name(params) = RHS`: the RHS form determines the executable
    /// type; `when`/block bodies become the evaluator pseudo-languages.
    fn eval_exe(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        exe: &ExeDirective,
    ) -> Result<EvalOutcome, MlldError> {
        if !crate::interpreter::control_flow::is_valid_identifier(&exe.name) {
            return Err(MlldError::InvalidIdentifier(exe.name.clone()));
        }

        let body = match &exe.body {
            ExeBody::Command(command) => ExecutableBody::Command {
                segments: command.segments.clone(),
            },
            ExeBody::Code(code) => ExecutableBody::Code {
                language: code.language.clone(),
                source: CodeSource::Segments(code.segments.clone()),
            },
            ExeBody::Template(parts) => ExecutableBody::Template {
                parts: parts.clone(),
            },
            ExeBody::CommandRef { target, args } => ExecutableBody::CommandRef {
                target: target.clone(),
                args: args.clone(),
            },
            ExeBody::When(when) => ExecutableBody::Code {
                language: "mlld-when".to_string(),
                source: CodeSource::When(when.clone()),
            },
            ExeBody::Block(block) => ExecutableBody::Code {
                language: "mlld-exe-block".to_string(),
                source: CodeSource::Block(block.clone()),
            },
            ExeBody::Prose(recipe) => ExecutableBody::Prose {
                recipe: recipe.clone(),
            },
        };

        let def = ExecutableDef::new(exe.params.clone(), body);
        let captured = if state.shadow_envs.is_empty() {
            None
        } else {
            Some(state.shadow_envs.clone())
        };
        let variable = VariableFactory::executable(
            &exe.name,
            def,
            VariableSource::directive("exe", exe_syntax(&exe.body)),
            captured,
        );
        state.arena.define(env, variable)?;
        Ok(EvalOutcome::none())
    }

    /// `guard @name for <kind> = when [...]`.
    fn eval_guard(
        &self,
        state: &mut InterpreterState,
        guard: &GuardDirective,
    ) -> Result<EvalOutcome, MlldError> {
        state.guards.register(GuardDef::from_directive(guard));
        Ok(EvalOutcome::none())
    }

    /// `import { a, b } from "module"`: bind exported names as imported
    /// variables.
    fn eval_import(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        import: &ImportDirective,
    ) -> Result<EvalOutcome, MlldError> {
        let resolver = self
            .hosts
            .modules
            .clone()
            .ok_or_else(|| MlldError::UnresolvedModule(import.source.clone()))?;
        let exports = resolver
            .resolve(&import.source)
            .ok_or_else(|| MlldError::UnresolvedModule(import.source.clone()))?;

        for name in &import.names {
            let exported = exports
                .iter()
                .find(|v| &v.name == name)
                .cloned()
                .ok_or_else(|| MlldError::MissingExport {
                    module: import.source.clone(),
                    name: name.clone(),
                })?;
            let variable = VariableFactory::imported(exported, &import.source);
            // Imported bindings are redefinable, and may themselves replace
            // an earlier import.
            let frame = state.arena.frame_mut(env);
            frame.variables.insert(variable.name.clone(), variable);
        }
        Ok(EvalOutcome::none())
    }

    /// `export { a, b }` / `export *`.
    fn eval_export(
        &self,
        state: &mut InterpreterState,
        export: &ExportDirective,
    ) -> Result<EvalOutcome, MlldError> {
        if export.wildcard {
            state.exports.wildcard = true;
        }
        for name in &export.names {
            state.exports.add(name);
        }
        Ok(EvalOutcome::none())
    }

    /// `env js { a, b }`: capture current values as a shadow environment for
    /// the language; later `exe` definitions capture the current set.
    fn eval_env(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        directive: &EnvDirective,
    ) -> Result<EvalOutcome, MlldError> {
        let mut captured = std::collections::HashMap::new();
        for name in &directive.names {
            let value = state
                .arena
                .lookup(env, name)
                .map(|v| v.to_structured())
                .ok_or_else(|| MlldError::UnknownVariable(name.clone()))?;
            captured.insert(name.clone(), value.typed);
        }
        state
            .shadow_envs
            .insert(directive.language.clone(), captured);
        Ok(EvalOutcome::none())
    }
}

fn rhs_syntax(expr: &Expr) -> &'static str {
    match expr {
        Expr::Literal(_) => "literal",
        Expr::Command(_) => "run",
        Expr::Code(_) => "code",
        Expr::ExecInvocation(_) => "invocation",
        Expr::Template(_) => "template",
        Expr::LoadContent(_) | Expr::FileReference { .. } => "load-content",
        Expr::Array(_) => "array",
        Expr::Object(_) => "object",
        _ => "expression",
    }
}

fn exe_syntax(body: &ExeBody) -> &'static str {
    match body {
        ExeBody::Command(_) => "run",
        ExeBody::Code(_) => "code",
        ExeBody::Template(_) => "template",
        ExeBody::CommandRef { .. } => "ref",
        ExeBody::When(_) => "when",
        ExeBody::Block(_) => "block",
        ExeBody::Prose(_) => "prose",
    }
}

/// Serialize a value for an output sink.
fn render_output(
    value: &StructuredValue,
    format: Option<OutputFormat>,
) -> Result<String, MlldError> {
    match format {
        Some(OutputFormat::Json) => serde_json::to_string_pretty(&value.typed).map_err(|e| {
            MlldError::execution(format!("Failed to serialize output as json: {}", e), Default::default())
        }),
        Some(OutputFormat::Yaml) => serde_yaml::to_string(&value.typed).map_err(|e| {
            MlldError::execution(format!("Failed to serialize output as yaml: {}", e), Default::default())
        }),
        Some(OutputFormat::Text) | None => Ok(match &value.typed {
            // Objects serialize even in text mode so env sinks stay parseable.
            Value::Object(_) | Value::Array(_) => value.typed.to_string(),
            _ => value.text.clone(),
        }),
    }
}

/// Default env-var sink name: `MLLD_<UPPERCASE>` of the source variable.
fn default_env_name(expr: &Expr) -> String {
    match expr {
        Expr::VariableReference { name, .. } => format!("MLLD_{}", name.to_uppercase()),
        _ => "MLLD_OUTPUT".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{
        CodeExpr, CommandExpr, GuardActionNode, GuardRuleNode, GuardScopeNode, TemplateSegment,
    };
    use crate::interpreter::test_support::{eval_doc, eval_doc_with, new_evaluator_parts};
    use crate::interpreter::types::StaticModules;
    use serde_json::json;
    use std::sync::Arc;

    fn directive(kind: DirectiveKind) -> Node {
        Node::Directive(DirectiveNode::new(kind))
    }

    #[test]
    fn test_var_redefinition_fails() {
        let doc = vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "x".to_string(),
                value: Expr::string("1"),
                pipeline: None,
            })),
            directive(DirectiveKind::Var(VarDirective {
                name: "x".to_string(),
                value: Expr::string("2"),
                pipeline: None,
            })),
        ];
        let err = eval_doc(doc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Variable 'x' is already defined and cannot be redefined"
        );
    }

    #[test]
    fn test_run_directive_renders_output() {
        let doc = vec![directive(DirectiveKind::Run(RunDirective {
            command: CommandExpr {
                segments: vec![TemplateSegment::text("echo hello")],
            },
            pipeline: None,
        }))];
        let result = eval_doc(doc).unwrap();
        assert_eq!(result.document, "hello\n");
    }

    #[test]
    fn test_show_renders_value() {
        let doc = vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "msg".to_string(),
                value: Expr::string("salut"),
                pipeline: None,
            })),
            directive(DirectiveKind::Show(ShowDirective {
                value: Expr::var("msg"),
                pipeline: None,
            })),
        ];
        assert_eq!(eval_doc(doc).unwrap().document, "salut\n");
    }

    #[test]
    fn test_output_json_format() {
        let doc = vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "data".to_string(),
                value: Expr::Object(vec![("port".to_string(), Expr::number(8080))]),
                pipeline: None,
            })),
            directive(DirectiveKind::Output(OutputDirective {
                value: Expr::var("data"),
                sink: OutputSink::Stdout,
                format: Some(OutputFormat::Json),
            })),
        ];
        let result = eval_doc(doc).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&result.stdout).unwrap(),
            json!({"port": 8080})
        );
    }

    #[test]
    fn test_output_yaml_format() {
        let doc = vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "data".to_string(),
                value: Expr::Object(vec![("name".to_string(), Expr::string("ada"))]),
                pipeline: None,
            })),
            directive(DirectiveKind::Output(OutputDirective {
                value: Expr::var("data"),
                sink: OutputSink::Stdout,
                format: Some(OutputFormat::Yaml),
            })),
        ];
        let result = eval_doc(doc).unwrap();
        assert!(result.stdout.contains("name: ada"));
    }

    #[test]
    fn test_export_manifest_and_wildcard() {
        let doc = vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "a".to_string(),
                value: Expr::string("1"),
                pipeline: None,
            })),
            directive(DirectiveKind::Var(VarDirective {
                name: "b".to_string(),
                value: Expr::string("2"),
                pipeline: None,
            })),
            directive(DirectiveKind::Export(ExportDirective {
                names: vec!["a".to_string()],
                wildcard: false,
            })),
        ];
        let result = eval_doc(doc).unwrap();
        assert_eq!(result.exports, vec!["a".to_string()]);

        let doc = vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "a".to_string(),
                value: Expr::string("1"),
                pipeline: None,
            })),
            directive(DirectiveKind::Var(VarDirective {
                name: "b".to_string(),
                value: Expr::string("2"),
                pipeline: None,
            })),
            directive(DirectiveKind::Export(ExportDirective {
                names: vec![],
                wildcard: true,
            })),
        ];
        let result = eval_doc(doc).unwrap();
        assert_eq!(result.exports, vec!["a".to_string(), "b".to_string()]);
    }

    fn deny_guard(name: &str, scope: GuardScopeNode, op_kinds: Vec<&str>, labels: Vec<&str>) -> Node {
        directive(DirectiveKind::Guard(GuardDirective {
            name: name.to_string(),
            scope,
            op_kinds: op_kinds.into_iter().map(String::from).collect(),
            labels: labels.into_iter().map(String::from).collect(),
            rules: vec![GuardRuleNode {
                condition: None,
                action: GuardActionNode::Deny {
                    message: Some(Expr::string("blocked by policy")),
                },
            }],
        }))
    }

    #[test]
    fn test_guard_deny_on_run_is_not_an_error() {
        let doc = vec![
            deny_guard("noRuns", GuardScopeNode::PerOperation, vec!["run"], vec![]),
            directive(DirectiveKind::Run(RunDirective {
                command: CommandExpr {
                    segments: vec![TemplateSegment::text("echo hello")],
                },
                pipeline: None,
            })),
        ];
        // The command never executes and the denial is not an error.
        let result = eval_doc(doc).unwrap();
        assert_eq!(result.document, "");
    }

    #[test]
    fn test_guard_deny_on_output_is_not_an_error() {
        let doc = vec![
            deny_guard("noOutput", GuardScopeNode::PerOperation, vec!["output"], vec![]),
            directive(DirectiveKind::Var(VarDirective {
                name: "msg".to_string(),
                value: Expr::string("payload"),
                pipeline: None,
            })),
            directive(DirectiveKind::Output(OutputDirective {
                value: Expr::var("msg"),
                sink: OutputSink::Stdout,
                format: None,
            })),
        ];
        let result = eval_doc(doc).unwrap();
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn test_guard_deny_on_var_binding_skips_the_binding() {
        let (limits, hosts) = new_evaluator_parts();
        let evaluator = Evaluator::new(&limits, &hosts);
        let mut state = InterpreterState::new();

        let doc = Node::Document(vec![deny_guard(
            "noSecrets",
            GuardScopeNode::PerInput,
            vec![],
            vec!["secret"],
        )]);
        evaluator.evaluate_document(&mut state, &doc).unwrap();

        // Seed a secret-labelled value, then try to rebind it under the
        // per-input guard.
        let env = crate::env::environment::EnvId(0);
        let mut secret = VariableFactory::simple_text("token", "sk-1", VariableSource::default());
        secret.mx.add_label("secret");
        state.arena.define(env, secret).unwrap();

        let bind = Node::Document(vec![directive(DirectiveKind::Var(VarDirective {
            name: "copy".to_string(),
            value: Expr::var("token"),
            pipeline: None,
        }))]);
        evaluator.evaluate_document(&mut state, &bind).unwrap();
        assert!(state.arena.lookup(env, "copy").is_none());
    }

    #[test]
    fn test_import_binds_exports_as_imported() {
        let (limits, mut hosts) = new_evaluator_parts();
        let mut modules = StaticModules::new();
        modules.insert(
            "@tools/strings",
            vec![VariableFactory::simple_text(
                "greeting",
                "bonjour",
                VariableSource::directive("var", "quoted"),
            )],
        );
        hosts.modules = Some(Arc::new(modules));

        let doc = vec![
            directive(DirectiveKind::Import(ImportDirective {
                names: vec!["greeting".to_string()],
                source: "@tools/strings".to_string(),
            })),
            // Imported names are redefinable.
            directive(DirectiveKind::Var(VarDirective {
                name: "greeting".to_string(),
                value: Expr::string("hei"),
                pipeline: None,
            })),
            directive(DirectiveKind::Show(ShowDirective {
                value: Expr::var("greeting"),
                pipeline: None,
            })),
        ];
        let result = eval_doc_with(doc, &limits, &hosts).unwrap();
        assert_eq!(result.document, "hei\n");
    }

    #[test]
    fn test_import_missing_export_fails() {
        let (limits, mut hosts) = new_evaluator_parts();
        hosts.modules = Some(Arc::new(StaticModules::new()));

        let doc = vec![directive(DirectiveKind::Import(ImportDirective {
            names: vec!["ghost".to_string()],
            source: "@tools/none".to_string(),
        }))];
        let err = eval_doc_with(doc, &limits, &hosts).unwrap_err();
        assert_eq!(err.to_string(), "Cannot resolve module: @tools/none");
    }

    #[test]
    fn test_env_directive_captures_shadow() {
        let (limits, hosts) = new_evaluator_parts();
        let evaluator = Evaluator::new(&limits, &hosts);
        let mut state = InterpreterState::new();
        let doc = Node::Document(vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "helper".to_string(),
                value: Expr::number(9),
                pipeline: None,
            })),
            directive(DirectiveKind::Env(EnvDirective {
                language: "js".to_string(),
                names: vec!["helper".to_string()],
            })),
        ]);
        evaluator.evaluate_document(&mut state, &doc).unwrap();
        assert_eq!(state.shadow_envs["js"]["helper"], json!(9));
    }

    #[test]
    fn test_template_var_is_not_pre_interpolated() {
        let (limits, hosts) = new_evaluator_parts();
        let evaluator = Evaluator::new(&limits, &hosts);
        let mut state = InterpreterState::new();
        let doc = Node::Document(vec![
            directive(DirectiveKind::Var(VarDirective {
                name: "who".to_string(),
                value: Expr::string("world"),
                pipeline: None,
            })),
            directive(DirectiveKind::Var(VarDirective {
                name: "tpl".to_string(),
                value: Expr::Template(vec![
                    TemplateSegment::text("hi "),
                    TemplateSegment::var("who"),
                ]),
                pipeline: None,
            })),
        ]);
        evaluator.evaluate_document(&mut state, &doc).unwrap();

        let tpl = state.arena.lookup(crate::env::environment::EnvId(0), "tpl").unwrap();
        assert_eq!(tpl.kind, crate::env::variable::VariableKind::Template);
        assert!(matches!(
            tpl.value,
            crate::env::variable::VariableValue::Template(_)
        ));
    }

    #[test]
    fn test_var_from_code_is_retryable() {
        let (limits, mut hosts) = new_evaluator_parts();
        hosts.code = Some(crate::interpreter::test_support::RecordingCodeRunner::replying(
            json!("out"),
        ));
        let evaluator = Evaluator::new(&limits, &hosts);
        let mut state = InterpreterState::new();
        let doc = Node::Document(vec![directive(DirectiveKind::Var(VarDirective {
            name: "result".to_string(),
            value: Expr::Code(CodeExpr {
                language: "js".to_string(),
                segments: vec![TemplateSegment::text("1 + 1")],
            }),
            pipeline: None,
        }))]);
        evaluator.evaluate_document(&mut state, &doc).unwrap();

        let var = state
            .arena
            .lookup(crate::env::environment::EnvId(0), "result")
            .unwrap();
        assert!(var.internal.is_retryable);
        assert!(var.internal.source_function.is_some());
    }
}
