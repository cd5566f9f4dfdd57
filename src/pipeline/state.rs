//! Pipeline State
//!
//! Between stages, the executor maintains the initial input, the outputs of
//! completed stages (truncated on retry), the per-stage retry history, and
//! per-stage attempt context. The executor's state machine is the sole
//! mutator of this state.

use std::collections::HashMap;

use crate::context::TryRecord;
use crate::values::StructuredValue;

/// A stage returns either a value or a retry signal.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Value(StructuredValue),
    Retry {
        /// Target stage; defaults to the issuing stage's upstream
        from: Option<usize>,
        hint: Option<String>,
    },
}

/// Attempt bookkeeping for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptContext {
    /// Attempts made so far (the running attempt is `attempts + 1`)
    pub attempts: u32,
    /// Hint carried into the current attempt
    pub hint: Option<String>,
}

/// Mutable inter-stage state owned by one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub initial_input: StructuredValue,
    /// Output of each completed stage, by index
    pub stage_outputs: Vec<Option<StructuredValue>>,
    /// Prior attempt values per stage
    pub retry_history: HashMap<usize, Vec<StructuredValue>>,
    pub attempt_context: HashMap<usize, AttemptContext>,
    /// Total state-machine steps, bounded by the global iteration cap
    pub iterations: u32,
    /// Times the synthetic source has been re-executed for retry-from-0
    pub source_attempts: u32,
}

impl PipelineState {
    pub fn new(initial_input: StructuredValue, stage_count: usize) -> Self {
        Self {
            initial_input,
            stage_outputs: vec![None; stage_count],
            retry_history: HashMap::new(),
            attempt_context: HashMap::new(),
            iterations: 0,
            source_attempts: 0,
        }
    }

    /// Input for a stage: the previous stage's output, else the initial
    /// input.
    pub fn input_for(&self, stage: usize) -> StructuredValue {
        if stage == 0 {
            return self.initial_input.clone();
        }
        self.stage_outputs[stage - 1]
            .clone()
            .unwrap_or_else(|| self.initial_input.clone())
    }

    /// Record a successful stage output.
    pub fn record_output(&mut self, stage: usize, output: StructuredValue) {
        self.stage_outputs[stage] = Some(output);
    }

    /// Record a retry issued while `stage` was executing: remember the
    /// attempt, clear outputs from the target stage onward, and seed the
    /// target's next attempt with the hint.
    pub fn record_retry(
        &mut self,
        stage: usize,
        target: usize,
        attempted: StructuredValue,
        hint: Option<String>,
    ) {
        self.retry_history.entry(stage).or_default().push(attempted);

        let entry = self.attempt_context.entry(stage).or_default();
        entry.attempts += 1;
        entry.hint = hint.clone();

        for output in self.stage_outputs.iter_mut().skip(target) {
            *output = None;
        }

        if target != stage {
            let target_entry = self.attempt_context.entry(target).or_default();
            target_entry.hint = hint;
        }
    }

    /// Current attempt number for a stage, 1-based.
    pub fn attempt_number(&self, stage: usize) -> u32 {
        self.attempt_context
            .get(&stage)
            .map(|a| a.attempts + 1)
            .unwrap_or(1)
    }

    /// Hint seeded for the stage's current attempt.
    pub fn hint_for(&self, stage: usize) -> Option<String> {
        self.attempt_context.get(&stage).and_then(|a| a.hint.clone())
    }

    /// Prior attempts of a stage, as `@ctx.pipe.tries` records.
    pub fn tries_for(&self, stage: usize) -> Vec<TryRecord> {
        let attempts = self
            .attempt_context
            .get(&stage)
            .map(|a| a.attempts)
            .unwrap_or(0);
        let hint = self.attempt_context.get(&stage).and_then(|a| a.hint.clone());
        (0..attempts)
            .map(|_| TryRecord { hint: hint.clone() })
            .collect()
    }
}
