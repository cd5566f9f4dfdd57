//! Interpreter Errors
//!
//! Error taxonomy for the evaluation engine. Most variants are terminal
//! failures surfaced to the caller; `Return` is a control-flow signal caught
//! at exe-block boundaries, mirroring how shells model return/break as typed
//! signals rather than ad-hoc state.
//!
//! A guard denial is NOT an error: denial flips evaluation into the `denied`
//! context (see the context manager) so `when`/`if` branches can catch it.

use std::time::Duration;

use thiserror::Error;

use crate::ast::types::Position;
use crate::values::StructuredValue;

/// The type of execution limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Depth,
    Directives,
    Iterations,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Depth => write!(f, "depth"),
            LimitKind::Directives => write!(f, "directives"),
            LimitKind::Iterations => write!(f, "iterations"),
        }
    }
}

/// Control-flow signal for `return` inside an exe block.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSignal {
    pub value: StructuredValue,
}

/// Details carried by command/code execution failures.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionDetails {
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    pub duration: Option<Duration>,
    pub stderr: Option<String>,
    pub working_directory: Option<String>,
    pub directive_type: Option<String>,
}

/// One failed branch of a parallel stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelStageError {
    pub index: usize,
    pub key: String,
    pub message: String,
}

/// Unified error type for the interpreter core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MlldError {
    // ---- ParseOrShape ----
    #[error("Unknown node type: {0}")]
    UnknownNode(String),

    // ---- Resolution ----
    #[error("Variable '{0}' is not defined")]
    UnknownVariable(String),
    #[error("Variable '{0}' is already defined and cannot be redefined")]
    AlreadyDefined(String),
    #[error("Variable '{0}' is not executable")]
    NotExecutable(String),
    #[error("Cannot access field {field} of {value_type}")]
    FieldAccess { field: String, value_type: String },
    #[error("Circular command reference detected: {0}")]
    CircularReference(String),
    #[error("Cannot resolve module: {0}")]
    UnresolvedModule(String),
    #[error("Module '{module}' does not export '{name}'")]
    MissingExport { module: String, name: String },

    // ---- Validation ----
    #[error("The \"none\" keyword can only appear as the last condition(s) in a when block")]
    NonePlacement,
    #[error("The 'none' keyword cannot be used with operators")]
    NoneWithOperators,
    #[error("Failed to evaluate condition expression")]
    ConditionFailed,
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("foreach requires collections of equal length: {0} vs {1}")]
    ForeachLengthMismatch(usize, usize),
    #[error("for loop requires an array, got {0}")]
    ForNotIterable(String),

    // ---- Execution ----
    #[error("{message}")]
    Execution {
        message: String,
        details: ExecutionDetails,
    },
    #[error("Command payload exceeds the configured cap of {cap} bytes ({actual} bytes); split the input or raise the cap")]
    OversizedPayload { cap: usize, actual: usize },
    #[error("No {0} host is configured for this session")]
    HostUnavailable(&'static str),

    // ---- Policy / security ----
    #[error("Security: Exec command blocked - {0}")]
    SecurityBlocked(String),
    #[error("Keychain access requires service and account")]
    KeychainPolicy,
    #[error("Parallel for block cannot mutate outer variable @{0}.")]
    IsolationViolation(String),

    // ---- Pipeline ----
    #[error("Pipeline exceeded 100 iterations")]
    PipelineIterationCap,
    #[error("Pipeline failed at stage {stage}: {message}")]
    PipelineStageFailed { stage: usize, message: String },
    #[error("Pipeline aborted: {0}")]
    PipelineAborted(String),
    #[error("Pipeline retry target {from} is ahead of stage {stage}")]
    RetryAheadOfStage { from: usize, stage: usize },
    #[error("{} parallel branch(es) failed: {}", .0.len(), format_branches(.0))]
    ParallelBranches(Vec<ParallelStageError>),

    // ---- Limits ----
    #[error("maximum {kind} limit ({limit}) exceeded")]
    Limit { kind: LimitKind, limit: u64 },

    // ---- Control flow (internal) ----
    #[error("return outside of an exe block")]
    Return(ReturnSignal),

    // ---- Position wrapper ----
    #[error("{source}")]
    At {
        line: usize,
        column: usize,
        directive: String,
        #[source]
        source: Box<MlldError>,
    },
}

fn format_branches(branches: &[ParallelStageError]) -> String {
    branches
        .iter()
        .map(|b| format!("[{}:{}] {}", b.index, b.key, b.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl MlldError {
    /// Attach a source position and directive kind, once.
    pub fn at(self, pos: Position, directive: &str) -> MlldError {
        match self {
            MlldError::At { .. } | MlldError::Return(_) => self,
            other => MlldError::At {
                line: pos.line,
                column: pos.column,
                directive: directive.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Strip the position wrapper, if any.
    pub fn root(&self) -> &MlldError {
        match self {
            MlldError::At { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn execution(message: impl Into<String>, details: ExecutionDetails) -> MlldError {
        MlldError::Execution {
            message: message.into(),
            details,
        }
    }

    /// True for the internal return signal (never user-visible).
    pub fn is_return(&self) -> bool {
        matches!(self, MlldError::Return(_))
    }
}
