//! Pipeline Layer
//!
//! Stage state machine, inter-stage retry state, and the stream bus.

pub mod events;
pub mod executor;
pub mod state;

pub use events::{CollectingSink, EventBus, EventSink, PipelineEvent, PipelineEventType};
pub use executor::{SyntheticSource, MAX_PIPELINE_ITERATIONS};
pub use state::{AttemptContext, PipelineState, StageOutcome};
