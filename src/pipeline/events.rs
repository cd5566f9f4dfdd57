//! Pipeline Stream Events
//!
//! The executor emits lifecycle events to an opaque bus. Events are
//! informational: consumers may drop them and they never affect semantics.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Event types emitted by the pipeline executor, and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEventType {
    PipelineStart,
    StageStart,
    StageSuccess,
    StageFailure,
    PipelineComplete,
    PipelineAbort,
}

impl PipelineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineEventType::PipelineStart => "PIPELINE_START",
            PipelineEventType::StageStart => "STAGE_START",
            PipelineEventType::StageSuccess => "STAGE_SUCCESS",
            PipelineEventType::StageFailure => "STAGE_FAILURE",
            PipelineEventType::PipelineComplete => "PIPELINE_COMPLETE",
            PipelineEventType::PipelineAbort => "PIPELINE_ABORT",
        }
    }
}

impl fmt::Display for PipelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub event_type: PipelineEventType,
    pub pipeline_id: String,
    pub timestamp: DateTime<Utc>,
    /// Stage index for stage-scoped events
    pub stage: Option<usize>,
    pub message: Option<String>,
}

impl PipelineEvent {
    pub fn new(event_type: PipelineEventType, pipeline_id: impl Into<String>) -> Self {
        Self {
            event_type,
            pipeline_id: pipeline_id.into(),
            timestamp: Utc::now(),
            stage: None,
            message: None,
        }
    }

    pub fn stage(mut self, stage: usize) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Consumer of pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Fan-out bus over registered sinks.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&self, event: PipelineEvent) {
        for sink in &self.sinks {
            sink.emit(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus({} sinks)", self.sinks.len())
    }
}

/// Test sink that records every event it sees.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<PipelineEventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(PipelineEventType::PipelineStart.as_str(), "PIPELINE_START");
        assert_eq!(PipelineEventType::StageSuccess.as_str(), "STAGE_SUCCESS");
        assert_eq!(PipelineEventType::PipelineAbort.as_str(), "PIPELINE_ABORT");
    }

    #[test]
    fn test_bus_fans_out() {
        let sink = CollectingSink::new();
        let mut bus = EventBus::new();
        bus.subscribe(sink.clone());

        bus.emit(PipelineEvent::new(PipelineEventType::PipelineStart, "pipe-1"));
        bus.emit(
            PipelineEvent::new(PipelineEventType::StageStart, "pipe-1")
                .stage(0)
                .message("upper"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, PipelineEventType::PipelineStart);
        assert_eq!(events[1].stage, Some(0));
        assert_eq!(events[1].message.as_deref(), Some("upper"));
    }

    #[test]
    fn test_bus_without_sinks_drops_events() {
        let bus = EventBus::new();
        bus.emit(PipelineEvent::new(PipelineEventType::PipelineComplete, "pipe-2"));
    }
}
