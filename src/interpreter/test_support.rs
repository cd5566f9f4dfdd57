//! Test Support
//!
//! Shared fixtures for interpreter tests: an in-memory filesystem, scripted
//! command/code hosts, and document-evaluation helpers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::ast::types::Node;
use crate::env::variable::TransformerImpl;
use crate::exec::{
    CodeOutcome, CodeRequest, CodeRunner, CommandExecutor, CommandOutcome, CommandRequest,
};
use crate::fs::InMemoryFs;
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::types::{EvaluationResult, ExecutionLimits, HostInterfaces, InterpreterState};

/// Command host that understands `echo` and otherwise replies with the
/// command line itself.
pub struct EchoCommandExecutor;

impl CommandExecutor for EchoCommandExecutor {
    fn execute(&self, request: &CommandRequest) -> Result<CommandOutcome, MlldError> {
        let output = match request.command.strip_prefix("echo ") {
            Some(rest) => format!("{}\n", rest.trim_matches('\'')),
            None => format!("{}\n", request.command),
        };
        Ok(CommandOutcome {
            output,
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        })
    }
}

/// Command host scripted with a closure.
pub struct ClosureCommandExecutor<F>(pub F);

impl<F> CommandExecutor for ClosureCommandExecutor<F>
where
    F: Fn(&CommandRequest) -> Result<CommandOutcome, MlldError> + Send + Sync,
{
    fn execute(&self, request: &CommandRequest) -> Result<CommandOutcome, MlldError> {
        (self.0)(request)
    }
}

/// Code host that records requests and replies with a canned value.
pub struct RecordingCodeRunner {
    pub reply: Value,
    pub requests: Mutex<Vec<CodeRequest>>,
}

impl RecordingCodeRunner {
    pub fn replying(reply: Value) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }
}

impl CodeRunner for RecordingCodeRunner {
    fn run(&self, request: &CodeRequest) -> Result<CodeOutcome, MlldError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CodeOutcome {
            output: String::new(),
            value: Some(self.reply.clone()),
        })
    }
}

/// Default limits + hosts for engine tests.
pub fn new_evaluator_parts() -> (ExecutionLimits, HostInterfaces) {
    let hosts = HostInterfaces {
        command: Some(Arc::new(EchoCommandExecutor)),
        fs: Some(Arc::new(InMemoryFs::new())),
        ..Default::default()
    };
    (ExecutionLimits::default(), hosts)
}

/// Evaluate a document with default parts.
pub fn eval_doc(nodes: Vec<Node>) -> Result<EvaluationResult, MlldError> {
    let (limits, hosts) = new_evaluator_parts();
    eval_doc_with(nodes, &limits, &hosts)
}

/// Evaluate a document with explicit parts.
pub fn eval_doc_with(
    nodes: Vec<Node>,
    limits: &ExecutionLimits,
    hosts: &HostInterfaces,
) -> Result<EvaluationResult, MlldError> {
    let evaluator = Evaluator::new(limits, hosts);
    let mut state = InterpreterState::new();
    evaluator.evaluate_document(&mut state, &Node::Document(nodes))
}

/// A transformer that counts invocations and replies from a script, one
/// entry per try. Used to model flaky upstream producers.
pub fn scripted_transformer(replies: Vec<&str>) -> TransformerImpl {
    let replies: Vec<String> = replies.into_iter().map(|s| s.to_string()).collect();
    let counter = Arc::new(Mutex::new(0usize));
    TransformerImpl::new(move |_args| {
        let mut count = counter.lock().unwrap();
        let index = (*count).min(replies.len() - 1);
        *count += 1;
        Ok(crate::values::StructuredValue::from_text(replies[index].clone()))
    })
}

/// A transformer that upcases its first argument.
pub fn upper_transformer() -> TransformerImpl {
    TransformerImpl::new(|args| {
        let text = args.first().map(|a| a.text.clone()).unwrap_or_default();
        Ok(crate::values::StructuredValue::from_text(text.to_uppercase()))
    })
}

/// A transformer that replies with a fixed string, ignoring input.
pub fn const_transformer(reply: &str) -> TransformerImpl {
    let reply = reply.to_string();
    TransformerImpl::new(move |_args| {
        Ok(crate::values::StructuredValue::from_text(reply.clone()))
    })
}
