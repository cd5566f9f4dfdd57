//! Host Execution Interfaces
//!
//! Commands and code run outside the interpreter; the engine talks to the
//! host through these sync traits. This module also owns the command
//! safelist (shell metacharacters are rejected unless explicitly enabled)
//! and the payload caps applied before anything reaches a host.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use lazy_static::lazy_static;
use serde_json::Value;

use crate::env::variable::ShadowEnvs;
use crate::interpreter::errors::{ExecutionDetails, MlldError};

// Payload limits applied before dispatching to a host executor.
pub const MAX_COMMAND_LENGTH: usize = 100_000; // assembled command line
pub const MAX_ENV_PAYLOAD: usize = 1_000_000; // injected environment variables

lazy_static! {
    /// Shell metacharacters rejected unless `allow_metacharacters` is set.
    static ref SHELL_METACHARACTERS: Vec<&'static str> =
        vec![";", "&&", "||", ">", "<", "|"];
}

/// Configuration for command validation and payload limits.
#[derive(Debug, Clone)]
pub struct CommandSafety {
    /// Permit `; && || > < |` in command lines
    pub allow_metacharacters: bool,
    /// When present, the command word must be on this list
    pub allowed_commands: Option<HashSet<String>>,
    /// Alias map applied to the command word before validation
    pub process_aliases: HashMap<String, String>,
    pub max_command_length: usize,
    pub max_env_payload: usize,
}

impl Default for CommandSafety {
    fn default() -> Self {
        Self {
            allow_metacharacters: false,
            allowed_commands: None,
            process_aliases: HashMap::new(),
            max_command_length: MAX_COMMAND_LENGTH,
            max_env_payload: MAX_ENV_PAYLOAD,
        }
    }
}

impl CommandSafety {
    /// Resolve a process alias for the command word, if configured.
    pub fn resolve_alias<'a>(&'a self, word: &'a str) -> &'a str {
        self.process_aliases
            .get(word)
            .map(|s| s.as_str())
            .unwrap_or(word)
    }
}

/// Validate an assembled command line against the safety configuration.
pub fn validate_command(command: &str, safety: &CommandSafety) -> Result<(), MlldError> {
    if command.len() > safety.max_command_length {
        return Err(MlldError::OversizedPayload {
            cap: safety.max_command_length,
            actual: command.len(),
        });
    }

    if !safety.allow_metacharacters {
        for meta in SHELL_METACHARACTERS.iter() {
            if command.contains(meta) {
                return Err(MlldError::SecurityBlocked(format!(
                    "shell metacharacter '{}' is not enabled",
                    meta
                )));
            }
        }
    }

    if let Some(allowed) = &safety.allowed_commands {
        let word = command.split_whitespace().next().unwrap_or("");
        let word = safety.resolve_alias(word);
        if !allowed.contains(word) {
            return Err(MlldError::SecurityBlocked(format!(
                "command '{}' is not on the safelist",
                word
            )));
        }
    }

    Ok(())
}

/// Validate the total size of environment variables injected into a command.
pub fn validate_env_payload(
    vars: &HashMap<String, String>,
    safety: &CommandSafety,
) -> Result<(), MlldError> {
    let total: usize = vars.iter().map(|(k, v)| k.len() + v.len()).sum();
    if total > safety.max_env_payload {
        return Err(MlldError::OversizedPayload {
            cap: safety.max_env_payload,
            actual: total,
        });
    }
    Ok(())
}

/// A command dispatched to the host.
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    pub command: String,
    pub working_directory: String,
    pub env_vars: HashMap<String, String>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

/// Result of a host command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub output: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }
}

/// Host interface for command execution.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, request: &CommandRequest) -> Result<CommandOutcome, MlldError>;
}

/// A code snippet dispatched to a host language runtime.
#[derive(Debug, Clone, Default)]
pub struct CodeRequest {
    pub language: String,
    pub source: String,
    /// Arguments passed by name
    pub args: HashMap<String, Value>,
    /// Captured shadow environments, keyed by language (reserved field)
    pub shadow: ShadowEnvs,
    pub timeout: Option<Duration>,
}

/// Result of a host code execution.
#[derive(Debug, Clone, Default)]
pub struct CodeOutcome {
    pub output: String,
    /// Set when the runtime already produced a structured value
    pub value: Option<Value>,
}

/// Host interface for code execution.
pub trait CodeRunner: Send + Sync {
    fn run(&self, request: &CodeRequest) -> Result<CodeOutcome, MlldError>;
}

/// Request handed to an external provider selected via the with-clause
/// `using:` map.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub command: String,
    pub working_directory: String,
    pub vars: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
}

/// External command provider.
pub trait CommandProvider: Send + Sync {
    fn run(&self, request: &ProviderRequest) -> Result<CommandOutcome, MlldError>;
}

/// Host approval prompt for guard `prompt` decisions.
pub trait GuardApprover: Send + Sync {
    fn approve(&self, guard_name: &str, reason: &str) -> bool;
}

/// Build the execution error raised for a non-zero exit.
pub fn exit_failure(
    request: &CommandRequest,
    outcome: &CommandOutcome,
    directive_type: &str,
) -> MlldError {
    MlldError::execution(
        format!(
            "Command failed with exit code {}: {}",
            outcome.exit_code, request.command
        ),
        ExecutionDetails {
            command: Some(request.command.clone()),
            exit_code: Some(outcome.exit_code),
            duration: Some(outcome.duration),
            stderr: Some(outcome.stderr.clone()),
            working_directory: Some(request.working_directory.clone()),
            directive_type: Some(directive_type.to_string()),
        },
    )
}
