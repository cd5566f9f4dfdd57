//! Pipeline Executor
//!
//! A deterministic state machine over the stage list. Each step executes a
//! stage against its upstream output, advances on success, rewinds on a
//! retry signal (clearing downstream outputs), and terminates with either a
//! completed value or a stage error. Lifecycle events stream to the bus;
//! they are informational only.

use serde_json::Value;

use crate::ast::types::{PipelineStage, PipelineStageEntry};
use crate::context::{DeniedInfo, PipelineSnapshot};
use crate::env::environment::EnvId;
use crate::env::variable::Variable;
use crate::interpreter::errors::{MlldError, ParallelStageError};
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::types::InterpreterState;
use crate::pipeline::events::{PipelineEvent, PipelineEventType};
use crate::pipeline::state::{PipelineState, StageOutcome};
use crate::policy::GuardDecision;
use crate::values::{SecurityDescriptor, StructuredValue};

/// Global cap on state-machine steps, guarding runaway retry loops.
pub const MAX_PIPELINE_ITERATIONS: u32 = 100;

/// The upstream producer, re-executed to satisfy retry-from-0.
pub struct SyntheticSource {
    pub exe: Variable,
    pub args: Vec<StructuredValue>,
}

impl Evaluator<'_> {
    /// Drive a pipeline to completion.
    pub fn run_pipeline(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        stages: &[PipelineStage],
        input: StructuredValue,
        source: Option<&SyntheticSource>,
    ) -> Result<StructuredValue, MlldError> {
        let pipeline_id = state.next_pipeline_id();
        let bus = self.hosts.bus.clone();
        bus.emit(PipelineEvent::new(
            PipelineEventType::PipelineStart,
            &pipeline_id,
        ));

        let mut pstate = PipelineState::new(input, stages.len());
        let mut stage = 0usize;

        while stage < stages.len() {
            pstate.iterations += 1;
            if pstate.iterations > MAX_PIPELINE_ITERATIONS {
                bus.emit(
                    PipelineEvent::new(PipelineEventType::PipelineAbort, &pipeline_id)
                        .message("iteration cap exceeded"),
                );
                return Err(MlldError::PipelineIterationCap);
            }

            let stage_input = pstate.input_for(stage);
            bus.emit(
                PipelineEvent::new(PipelineEventType::StageStart, &pipeline_id).stage(stage),
            );

            match self.run_stage(state, env, &stages[stage], &stage_input, &pstate, stage) {
                Ok(StageOutcome::Value(output)) => {
                    bus.emit(
                        PipelineEvent::new(PipelineEventType::StageSuccess, &pipeline_id)
                            .stage(stage),
                    );
                    pstate.record_output(stage, output);
                    stage += 1;
                }
                Ok(StageOutcome::Retry { from, hint }) => {
                    bus.emit(
                        PipelineEvent::new(PipelineEventType::StageFailure, &pipeline_id)
                            .stage(stage)
                            .message(hint.clone().unwrap_or_else(|| "retry".to_string())),
                    );
                    let target = from.unwrap_or(stage.saturating_sub(1));
                    if target > stage {
                        bus.emit(
                            PipelineEvent::new(PipelineEventType::PipelineAbort, &pipeline_id)
                                .message("retry target ahead of stage"),
                        );
                        return Err(MlldError::RetryAheadOfStage {
                            from: target,
                            stage,
                        });
                    }
                    pstate.record_retry(stage, target, stage_input, hint);
                    if target == 0 {
                        if let Some(source) = source {
                            pstate.source_attempts += 1;
                            pstate.initial_input =
                                self.reinvoke_source(state, env, source, &pstate)?;
                        }
                    }
                    stage = target;
                }
                Err(err) => {
                    let message = err.to_string();
                    bus.emit(
                        PipelineEvent::new(PipelineEventType::StageFailure, &pipeline_id)
                            .stage(stage)
                            .message(message.clone()),
                    );
                    bus.emit(
                        PipelineEvent::new(PipelineEventType::PipelineAbort, &pipeline_id)
                            .message(message.clone()),
                    );
                    // Host cancellation propagates as an abort, not a stage
                    // failure.
                    if matches!(err.root(), MlldError::PipelineAborted(_)) {
                        return Err(err);
                    }
                    return Err(MlldError::PipelineStageFailed {
                        stage: stage + 1,
                        message,
                    });
                }
            }
        }

        bus.emit(PipelineEvent::new(
            PipelineEventType::PipelineComplete,
            &pipeline_id,
        ));

        let output = match stages.len() {
            0 => pstate.initial_input.clone(),
            n => pstate.stage_outputs[n - 1]
                .clone()
                .unwrap_or_else(|| pstate.initial_input.clone()),
        };
        Ok(output)
    }

    /// Re-execute the upstream producer with an incremented try counter.
    fn reinvoke_source(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        source: &SyntheticSource,
        pstate: &PipelineState,
    ) -> Result<StructuredValue, MlldError> {
        let mut op = self.exec_context(state, &source.exe, &source.args, pstate.source_attempts + 1);
        op.pipeline = Some(PipelineSnapshot {
            stage: 0,
            try_count: pstate.source_attempts + 1,
            tries: Vec::new(),
            hint: pstate.hint_for(0),
            input: pstate.initial_input.typed.clone(),
            last_output: None,
        });
        state.ctx.push_operation(op);
        let result = self.execute_executable(state, env, &source.exe, &source.args);
        state.ctx.pop_operation();
        result
    }

    fn run_stage(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        stage: &PipelineStage,
        input: &StructuredValue,
        pstate: &PipelineState,
        stage_index: usize,
    ) -> Result<StageOutcome, MlldError> {
        match stage {
            PipelineStage::Single(entry) => {
                self.run_stage_entry(state, env, entry, input, pstate, stage_index, None)
            }
            PipelineStage::Parallel(entries) => {
                self.run_parallel_stage(state, env, entries, input, pstate, stage_index)
            }
        }
    }

    /// A parallel stage receives its input once, fans out to every branch,
    /// and returns an array-shaped value preserving declaration order. A
    /// retry from any branch re-runs the entire group.
    fn run_parallel_stage(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        entries: &[PipelineStageEntry],
        input: &StructuredValue,
        pstate: &PipelineState,
        stage_index: usize,
    ) -> Result<StageOutcome, MlldError> {
        let mut outputs: Vec<Value> = Vec::with_capacity(entries.len());
        let mut descriptor = SecurityDescriptor::new();
        let mut failures: Vec<ParallelStageError> = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            // Each branch gets a deep-cloned input.
            let branch_input = input.clone();
            match self.run_stage_entry(
                state,
                env,
                entry,
                &branch_input,
                pstate,
                stage_index,
                Some(index),
            ) {
                Ok(StageOutcome::Value(value)) => {
                    descriptor.merge(&value.descriptor);
                    outputs.push(value.typed);
                }
                Ok(StageOutcome::Retry { from, hint }) => {
                    return Ok(StageOutcome::Retry { from, hint });
                }
                Err(err) => failures.push(ParallelStageError {
                    index,
                    key: entry.name.clone(),
                    message: err.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(MlldError::ParallelBranches(failures));
        }

        Ok(StageOutcome::Value(
            StructuredValue::from_json(Value::Array(outputs)).with_descriptor(descriptor),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn run_stage_entry(
        &self,
        state: &mut InterpreterState,
        env: EnvId,
        entry: &PipelineStageEntry,
        input: &StructuredValue,
        pstate: &PipelineState,
        stage_index: usize,
        branch: Option<usize>,
    ) -> Result<StageOutcome, MlldError> {
        let exe = state
            .arena
            .lookup(env, &entry.name)
            .cloned()
            .ok_or_else(|| MlldError::UnknownVariable(entry.name.clone()))?;
        let def = exe
            .as_executable()
            .cloned()
            .ok_or_else(|| MlldError::NotExecutable(entry.name.clone()))?;

        // Static args first; the stage input fills the next unbound
        // parameter slot.
        let mut args = Vec::with_capacity(entry.args.len() + 1);
        for arg in &entry.args {
            args.push(self.evaluate_expr(state, env, arg)?);
        }
        if args.len() < def.params.len() {
            args.push(input.clone());
        }

        let attempt = pstate.attempt_number(stage_index);
        let mut op = self.exec_context(state, &exe, &args, attempt);
        op.pipeline = Some(PipelineSnapshot {
            stage: stage_index + 1,
            try_count: attempt,
            tries: pstate.tries_for(stage_index),
            hint: pstate.hint_for(stage_index),
            input: input.typed.clone(),
            last_output: if stage_index == 0 {
                None
            } else {
                pstate.stage_outputs[stage_index - 1]
                    .as_ref()
                    .map(|v| v.typed.clone())
            },
        });
        if let Some(branch) = branch {
            op.name = Some(format!("{}[{}]", entry.name, branch));
        }
        state.ctx.push_operation(op);

        let result = (|| {
            match self.evaluate_operation_guards(state, env, "exe", input, attempt)? {
                GuardDecision::Allow => {}
                GuardDecision::Deny { reason } => {
                    // Denial is a context, not an error: the denied-aware
                    // body runs and its value becomes the stage output.
                    if let Some(top) = state.ctx.current_mut() {
                        top.denied = Some(DeniedInfo { reason });
                    }
                    let output = self.execute_denied_body(state, env, &exe, &args)?;
                    return Ok(StageOutcome::Value(output));
                }
                GuardDecision::Retry { hint } => {
                    return Ok(StageOutcome::Retry { from: None, hint });
                }
                GuardDecision::Prompt => {}
            }
            let output = self.execute_executable(state, env, &exe, &args)?;
            Ok(interpret_stage_output(output))
        })();

        state.ctx.pop_operation();
        result
    }
}

/// A stage may answer with an explicit retry signal object
/// (`{ "value": "retry", "hint"?, "from"? }`).
fn interpret_stage_output(output: StructuredValue) -> StageOutcome {
    if let Value::Object(map) = &output.typed {
        if map.get("value").and_then(Value::as_str) == Some("retry") {
            return StageOutcome::Retry {
                from: map.get("from").and_then(Value::as_u64).map(|v| v as usize),
                hint: map
                    .get("hint")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
            };
        }
    }
    StageOutcome::Value(output)
}
