//! Ordered stage execution for one event.

use super::StageSpec;
use crate::core::{EventRecord, Vote};
use crate::errors::ProcessingError;
use crate::events::{EventSink, NoOpEventSink};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// An ordered, validated sequence of configured stages.
///
/// Built through [`super::PipelineBuilder`], which guarantees stage names are
/// unique. The pipeline is immutable and cheap to share between event tasks.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    stages: Arc<[StageSpec]>,
    sink: Arc<dyn EventSink>,
}

impl Pipeline {
    pub(super) fn new(name: String, stages: Vec<StageSpec>) -> Self {
        Self {
            name,
            stages: stages.into(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Checks if a stage with this name is part of the pipeline.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s.name == stage)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage on one event, in order.
    ///
    /// Returns the votes cast, in stage order. Execution stops at the first
    /// failing stage; mutations made by earlier stages stay on the record.
    ///
    /// # Errors
    ///
    /// Returns a `ProcessingError` naming the failing stage and event index.
    pub async fn run_one_event(
        &self,
        event: &mut EventRecord,
    ) -> Result<Vec<Vote>, ProcessingError> {
        let mut votes = Vec::new();

        for spec in self.stages.iter() {
            let started = Instant::now();
            let result = spec.runner.execute(event).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(verdict) => {
                    debug!(
                        stage = %spec.name,
                        event_index = event.index,
                        verdict = %verdict,
                        duration_ms,
                        "Stage completed"
                    );
                    self.sink.emit(
                        "stage.completed",
                        Some(serde_json::json!({
                            "stage": &spec.name,
                            "event_index": event.index,
                            "verdict": verdict.to_string(),
                            "duration_ms": duration_ms,
                        })),
                    );
                    if let Some(keep) = verdict.vote() {
                        votes.push(Vote::new(&spec.name, keep));
                    }
                }
                Err(failure) => {
                    warn!(
                        stage = %spec.name,
                        event_index = event.index,
                        error = %failure,
                        "Stage failed"
                    );
                    self.sink.emit(
                        "stage.failed",
                        Some(serde_json::json!({
                            "stage": &spec.name,
                            "event_index": event.index,
                            "error": failure.message,
                            "duration_ms": duration_ms,
                        })),
                    );
                    return Err(ProcessingError::new(&spec.name, event.index, failure.message));
                }
            }
        }

        Ok(votes)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}
