//! Interpreter Types
//!
//! The mutable interpreter state threaded through every evaluator, the host
//! interface bundle, execution limits, and the evaluation result shape.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::context::ContextManager;
use crate::env::environment::EnvArena;
use crate::exec::{CommandExecutor, CommandProvider, CommandSafety, CodeRunner, GuardApprover};
use crate::env::variable::Variable;
use crate::interpreter::errors::{LimitKind, MlldError};
use crate::interpreter::fs_bridge::SyncFileSystem;
use crate::pipeline::events::EventBus;
use crate::policy::{GuardRegistry, PolicyEnforcer};

/// Execution limits guarding against runaway documents.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Maximum evaluation nesting depth
    pub max_eval_depth: u32,
    /// Maximum number of directives evaluated per document
    pub max_directive_count: u64,
    /// Maximum iterations of a single `for`/`loop`
    pub max_loop_iterations: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_eval_depth: 500,
            max_directive_count: 100_000,
            max_loop_iterations: 100_000,
        }
    }
}

/// Project-relative path roots carried by the environment.
#[derive(Debug, Clone)]
pub struct PathContext {
    pub project_root: String,
    pub file_directory: String,
    pub invocation_directory: String,
}

impl Default for PathContext {
    fn default() -> Self {
        Self {
            project_root: "/".to_string(),
            file_directory: "/".to_string(),
            invocation_directory: "/".to_string(),
        }
    }
}

/// Names exported by the evaluated module.
#[derive(Debug, Clone, Default)]
pub struct ExportManifest {
    pub names: BTreeSet<String>,
    /// `export *`: the manifest is forgone in favor of auto-export
    pub wildcard: bool,
}

impl ExportManifest {
    pub fn add(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn exports(&self, name: &str) -> bool {
        self.wildcard || self.names.contains(name)
    }
}

/// Module resolution seam; registry/lockfile logic lives behind it.
pub trait ModuleResolver: Send + Sync {
    /// Exported variables of a module, or None if unknown.
    fn resolve(&self, source: &str) -> Option<Vec<Variable>>;
}

/// Static module map used by tests and embedders.
#[derive(Default)]
pub struct StaticModules {
    modules: HashMap<String, Vec<Variable>>,
}

impl StaticModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, exports: Vec<Variable>) {
        self.modules.insert(name.into(), exports);
    }
}

impl ModuleResolver for StaticModules {
    fn resolve(&self, source: &str) -> Option<Vec<Variable>> {
        self.modules.get(source).cloned()
    }
}

/// Output routing seam for `output ... to @resolver/path`.
pub trait ResolverSink: Send + Sync {
    fn route(&self, target: &str, content: &str) -> Result<(), MlldError>;
}

/// Host-provided collaborators, immutable for the life of an evaluation.
#[derive(Clone, Default)]
pub struct HostInterfaces {
    pub command: Option<Arc<dyn CommandExecutor>>,
    pub code: Option<Arc<dyn CodeRunner>>,
    pub providers: HashMap<String, Arc<dyn CommandProvider>>,
    pub keychain: Option<Arc<dyn crate::policy::Keychain>>,
    pub approver: Option<Arc<dyn GuardApprover>>,
    pub modules: Option<Arc<dyn ModuleResolver>>,
    pub resolver_sink: Option<Arc<dyn ResolverSink>>,
    pub fs: Option<Arc<dyn SyncFileSystem>>,
    pub bus: EventBus,
    pub safety: CommandSafety,
}

impl HostInterfaces {
    pub fn fs(&self) -> Result<Arc<dyn SyncFileSystem>, MlldError> {
        self.fs.clone().ok_or(MlldError::HostUnavailable("filesystem"))
    }

    pub fn command(&self) -> Result<Arc<dyn CommandExecutor>, MlldError> {
        self.command
            .clone()
            .ok_or(MlldError::HostUnavailable("command executor"))
    }

    pub fn code(&self) -> Result<Arc<dyn CodeRunner>, MlldError> {
        self.code.clone().ok_or(MlldError::HostUnavailable("code runner"))
    }
}

/// Output assembled during evaluation: the rendered document plus the
/// stream and environment sinks fed by `output`.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutput {
    pub body: String,
    pub stdout: String,
    pub stderr: String,
    pub env_vars: HashMap<String, String>,
}

impl DocumentOutput {
    pub fn append_body(&mut self, text: &str) {
        self.body.push_str(text);
        if !text.ends_with('\n') {
            self.body.push('\n');
        }
    }
}

/// Complete interpreter state for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct InterpreterState {
    // ---- Scopes ----
    pub arena: EnvArena,
    // ---- Contexts & policy ----
    pub ctx: ContextManager,
    pub policy: PolicyEnforcer,
    pub guards: GuardRegistry,
    // ---- Module surface ----
    pub exports: ExportManifest,
    // ---- Shadow environments captured by `env` ----
    pub shadow_envs: crate::env::variable::ShadowEnvs,
    // ---- Output ----
    pub doc: DocumentOutput,
    // ---- Execution tracking ----
    /// Command-reference call stack for cycle detection
    pub call_stack: Vec<String>,
    /// Provider selected by the active with-clause `using:` map
    pub active_provider: Option<String>,
    pub eval_depth: u32,
    pub directive_count: u64,
    /// Counter used to mint pipeline ids
    pub pipeline_counter: u64,
    // ---- Paths ----
    pub cwd: String,
    pub path_context: PathContext,
}

impl InterpreterState {
    pub fn new() -> Self {
        Self {
            cwd: "/".to_string(),
            ..Default::default()
        }
    }

    /// Enter a nested evaluation, enforcing the depth limit.
    pub fn enter(&mut self, limits: &ExecutionLimits) -> Result<(), MlldError> {
        self.eval_depth += 1;
        if u64::from(self.eval_depth) > u64::from(limits.max_eval_depth) {
            self.eval_depth -= 1;
            return Err(MlldError::Limit {
                kind: LimitKind::Depth,
                limit: u64::from(limits.max_eval_depth),
            });
        }
        Ok(())
    }

    pub fn leave(&mut self) {
        self.eval_depth = self.eval_depth.saturating_sub(1);
    }

    /// Count a directive against the document limit.
    pub fn count_directive(&mut self, limits: &ExecutionLimits) -> Result<(), MlldError> {
        self.directive_count += 1;
        if self.directive_count > limits.max_directive_count {
            return Err(MlldError::Limit {
                kind: LimitKind::Directives,
                limit: limits.max_directive_count,
            });
        }
        Ok(())
    }

    pub fn next_pipeline_id(&mut self) -> String {
        self.pipeline_counter += 1;
        format!("pipe-{}", self.pipeline_counter)
    }
}

/// Result of evaluating a document.
#[derive(Debug, Clone, Default)]
pub struct EvaluationResult {
    pub document: String,
    pub stdout: String,
    pub stderr: String,
    pub env_vars: HashMap<String, String>,
    pub exports: Vec<String>,
}

/// The value produced by evaluating one node, if any. Directives that only
/// bind names produce no value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutcome {
    pub value: Option<crate::values::StructuredValue>,
}

impl EvalOutcome {
    pub fn none() -> Self {
        Self { value: None }
    }

    pub fn value(value: crate::values::StructuredValue) -> Self {
        Self { value: Some(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_limit() {
        let limits = ExecutionLimits {
            max_eval_depth: 2,
            ..Default::default()
        };
        let mut state = InterpreterState::new();
        assert!(state.enter(&limits).is_ok());
        assert!(state.enter(&limits).is_ok());
        let err = state.enter(&limits).unwrap_err();
        assert!(matches!(err, MlldError::Limit { kind: LimitKind::Depth, .. }));
        state.leave();
        state.leave();
        assert_eq!(state.eval_depth, 0);
    }

    #[test]
    fn test_directive_count_limit() {
        let limits = ExecutionLimits {
            max_directive_count: 1,
            ..Default::default()
        };
        let mut state = InterpreterState::new();
        assert!(state.count_directive(&limits).is_ok());
        assert!(state.count_directive(&limits).is_err());
    }

    #[test]
    fn test_pipeline_ids_are_sequential() {
        let mut state = InterpreterState::new();
        assert_eq!(state.next_pipeline_id(), "pipe-1");
        assert_eq!(state.next_pipeline_id(), "pipe-2");
    }

    #[test]
    fn test_export_manifest() {
        let mut manifest = ExportManifest::default();
        manifest.add("a");
        assert!(manifest.exports("a"));
        assert!(!manifest.exports("b"));
        manifest.wildcard = true;
        assert!(manifest.exports("b"));
    }

    #[test]
    fn test_document_output_appends_newline() {
        let mut doc = DocumentOutput::default();
        doc.append_body("hello");
        doc.append_body("world\n");
        assert_eq!(doc.body, "hello\nworld\n");
    }
}
