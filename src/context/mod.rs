//! Operation Contexts
//!
//! A stack of operation frames pushed on entry into every directive or
//! executable invocation and popped on exit. The ambient `@ctx` object user
//! code sees is built on demand from the top of the stack, the active
//! security snapshot, and (in pipelines) the pipeline snapshot.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::values::{SecurityDescriptor, StructuredValue};

/// Prior attempt of a retried stage; its hint is visible as
/// `@ctx.pipe.tries[].hint`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TryRecord {
    pub hint: Option<String>,
}

/// Pipeline snapshot present only in pipeline contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    /// Stage index in the executing pipeline
    pub stage: usize,
    /// Current attempt number for this stage, 1-based
    pub try_count: u32,
    /// Prior attempts of this stage
    pub tries: Vec<TryRecord>,
    /// Hint carried by the most recent retry
    pub hint: Option<String>,
    /// The stage's input value
    pub input: Value,
    /// Output of the previous stage, if any
    pub last_output: Option<Value>,
}

/// Guard frame active while guard rules evaluate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuardFrame {
    /// Attempt number visible as `@ctx.guard.try`, 1-based
    pub try_count: u32,
    /// Denial reason, populated in the denied context
    pub reason: Option<String>,
    /// The value under observation, visible as `@ctx.output` / `@output`
    pub output: Option<StructuredValue>,
}

/// Reason recorded when evaluation enters the denied context.
#[derive(Debug, Clone, PartialEq)]
pub struct DeniedInfo {
    pub reason: String,
}

/// One frame of the operation stack.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationContext {
    /// Operation kind: "var", "exe", "show", "run", "output", ...
    pub op_type: String,
    /// Operation name where one exists (executable name, variable name)
    pub name: Option<String>,
    /// Labels attached to the operation itself
    pub labels: BTreeSet<String>,
    /// Inherited try counter for nested invocations
    pub try_count: u32,
    /// Exec nesting depth
    pub exec_depth: u32,
    /// Executable type for exec frames ("command", "code", ...)
    pub executable_type: Option<String>,
    /// Denied-context marker; branches can catch it
    pub denied: Option<DeniedInfo>,
    pub pipeline: Option<PipelineSnapshot>,
    pub guard: Option<GuardFrame>,
    /// Security snapshot active for this frame
    pub security: SecurityDescriptor,
}

impl OperationContext {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            name: None,
            labels: BTreeSet::new(),
            try_count: 1,
            exec_depth: 0,
            executable_type: None,
            denied: None,
            pipeline: None,
            guard: None,
            security: SecurityDescriptor::new(),
        }
    }

    pub fn named(op_type: impl Into<String>, name: impl Into<String>) -> Self {
        let mut ctx = Self::new(op_type);
        ctx.name = Some(name.into());
        ctx
    }
}

/// Stack of operation contexts; per-invocation, never shared across
/// pipelines.
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    stack: Vec<OperationContext>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_operation(&mut self, ctx: OperationContext) {
        self.stack.push(ctx);
    }

    pub fn pop_operation(&mut self) -> Option<OperationContext> {
        self.stack.pop()
    }

    pub fn current(&self) -> Option<&OperationContext> {
        self.stack.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut OperationContext> {
        self.stack.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Exec nesting depth of the innermost exec frame.
    pub fn exec_depth(&self) -> u32 {
        self.stack
            .iter()
            .rev()
            .find(|c| c.op_type == "exe")
            .map(|c| c.exec_depth)
            .unwrap_or(0)
    }

    /// True when the nearest frame carries a denied marker.
    pub fn is_denied(&self) -> bool {
        self.stack.iter().rev().any(|c| c.denied.is_some())
    }

    /// Denial reason from the nearest denied frame.
    pub fn denied_reason(&self) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .find_map(|c| c.denied.as_ref().map(|d| d.reason.as_str()))
    }

    /// Guard frame of the nearest frame that has one.
    pub fn guard_frame(&self) -> Option<&GuardFrame> {
        self.stack.iter().rev().find_map(|c| c.guard.as_ref())
    }

    /// Pipeline snapshot of the nearest pipeline frame.
    pub fn pipeline_snapshot(&self) -> Option<&PipelineSnapshot> {
        self.stack.iter().rev().find_map(|c| c.pipeline.as_ref())
    }

    /// Security snapshot of the nearest frame that carries one.
    pub fn active_security(&self) -> SecurityDescriptor {
        self.stack
            .iter()
            .rev()
            .find(|c| !c.security.is_empty())
            .map(|c| c.security.clone())
            .unwrap_or_default()
    }

    /// Materialize `@ctx` from the active security snapshot.
    pub fn build_ctx(&self) -> Value {
        self.build_ctx_object(&self.active_security())
    }

    /// Materialize the ambient `@ctx` object for user code.
    pub fn build_ctx_object(&self, security: &SecurityDescriptor) -> Value {
        let mut obj = Map::new();

        if let Some(top) = self.current() {
            obj.insert(
                "op".to_string(),
                json!({
                    "type": top.op_type,
                    "name": top.name,
                }),
            );
            obj.insert("try".to_string(), json!(top.try_count));
        }

        obj.insert(
            "labels".to_string(),
            Value::Array(security.labels.iter().map(|l| json!(l)).collect()),
        );
        obj.insert(
            "taint".to_string(),
            Value::Array(security.taint.iter().map(|t| json!(t)).collect()),
        );
        obj.insert(
            "sources".to_string(),
            Value::Array(security.sources.iter().map(|s| json!(s)).collect()),
        );

        obj.insert("denied".to_string(), json!(self.is_denied()));

        let mut guard_obj = Map::new();
        if let Some(frame) = self.guard_frame() {
            guard_obj.insert("try".to_string(), json!(frame.try_count));
            if let Some(reason) = &frame.reason {
                guard_obj.insert("reason".to_string(), json!(reason));
            }
            if let Some(output) = &frame.output {
                obj.insert("output".to_string(), output.typed.clone());
            }
        }
        if let Some(reason) = self.denied_reason() {
            guard_obj.insert("reason".to_string(), json!(reason));
        }
        if !guard_obj.is_empty() {
            obj.insert("guard".to_string(), Value::Object(guard_obj));
        }

        if let Some(pipe) = self.pipeline_snapshot() {
            let tries: Vec<Value> = pipe
                .tries
                .iter()
                .map(|t| json!({ "hint": t.hint }))
                .collect();
            obj.insert(
                "pipe".to_string(),
                json!({
                    "stage": pipe.stage,
                    "try": pipe.try_count,
                    "tries": tries,
                    "hint": pipe.hint,
                    "input": pipe.input,
                    "lastOutput": pipe.last_output,
                }),
            );
        }

        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_pop() {
        let mut cm = ContextManager::new();
        assert!(cm.current().is_none());

        cm.push_operation(OperationContext::named("exe", "greet"));
        assert_eq!(cm.current().unwrap().op_type, "exe");
        cm.pop_operation();
        assert!(cm.current().is_none());
    }

    #[test]
    fn test_ctx_object_basics() {
        let mut cm = ContextManager::new();
        cm.push_operation(OperationContext::named("show", "msg"));

        let mut sec = SecurityDescriptor::with_label("secret");
        sec.add_taint("src:stdin");

        let ctx = cm.build_ctx_object(&sec);
        assert_eq!(ctx["op"]["type"], "show");
        assert_eq!(ctx["labels"], json!(["secret"]));
        assert_eq!(ctx["taint"], json!(["src:stdin"]));
        assert_eq!(ctx["denied"], json!(false));
        assert!(ctx.get("pipe").is_none());
    }

    #[test]
    fn test_pipe_present_only_in_pipeline_contexts() {
        let mut cm = ContextManager::new();
        let mut op = OperationContext::new("exe");
        op.pipeline = Some(PipelineSnapshot {
            stage: 1,
            try_count: 2,
            tries: vec![TryRecord {
                hint: Some("need ok".to_string()),
            }],
            hint: Some("need ok".to_string()),
            input: json!("bad"),
            last_output: None,
        });
        cm.push_operation(op);

        let ctx = cm.build_ctx_object(&SecurityDescriptor::new());
        assert_eq!(ctx["pipe"]["stage"], json!(1));
        assert_eq!(ctx["pipe"]["try"], json!(2));
        assert_eq!(ctx["pipe"]["tries"][0]["hint"], json!("need ok"));
        assert_eq!(ctx["pipe"]["input"], json!("bad"));
    }

    #[test]
    fn test_denied_context_surfaces_reason() {
        let mut cm = ContextManager::new();
        let mut op = OperationContext::new("exe");
        op.denied = Some(DeniedInfo {
            reason: "Secrets cannot be displayed".to_string(),
        });
        cm.push_operation(op);
        // A nested frame still sees the denial.
        cm.push_operation(OperationContext::new("when"));

        assert!(cm.is_denied());
        let ctx = cm.build_ctx_object(&SecurityDescriptor::new());
        assert_eq!(ctx["denied"], json!(true));
        assert_eq!(ctx["guard"]["reason"], json!("Secrets cannot be displayed"));
    }

    #[test]
    fn test_guard_frame_exposes_output_and_try() {
        let mut cm = ContextManager::new();
        let mut op = OperationContext::new("exe");
        op.guard = Some(GuardFrame {
            try_count: 3,
            reason: None,
            output: Some(StructuredValue::from_text("bad")),
        });
        cm.push_operation(op);

        let ctx = cm.build_ctx_object(&SecurityDescriptor::new());
        assert_eq!(ctx["guard"]["try"], json!(3));
        assert_eq!(ctx["output"], json!("bad"));
    }
}
