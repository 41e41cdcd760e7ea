//! Run controller: prepares a process and drives events through it.

use super::RunSummary;
use crate::cancellation::CancellationToken;
use crate::config::{ProcessConfig, RunConfig};
use crate::core::{EventRecord, SkimDecision};
use crate::errors::{ConfigurationError, ProcessingError, SkimflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{FailureCollector, FailureMode, Pipeline, PipelineBuilder, SkimPolicy, StageSpec};
use crate::registry::{LibraryCatalog, LoadedLibraries};
use crate::store::{EventReader, OutputLayout, OutputSet, SourcedEvent};
use chrono::Utc;
use futures::stream::FuturesOrdered;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns a process configuration and the catalog its libraries come from.
pub struct RunController {
    config: ProcessConfig,
    catalog: Arc<LibraryCatalog>,
    sink: Arc<dyn EventSink>,
}

impl RunController {
    /// Creates a controller.
    #[must_use]
    pub fn new(config: ProcessConfig, catalog: Arc<LibraryCatalog>) -> Self {
        Self {
            config,
            catalog,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink for run, stage and event notifications.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the process configuration.
    #[must_use]
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Renders a human-readable dump of the process.
    #[must_use]
    pub fn describe(&self) -> String {
        self.config.describe()
    }

    /// Performs every fatal configuration check.
    ///
    /// Validates the run configuration, loads libraries, resolves and
    /// configures every stage, builds the pipeline and validates the skim
    /// policy. No file is opened and no event is read.
    ///
    /// # Errors
    ///
    /// Returns the first configuration-class error found.
    pub fn prepare(&self) -> Result<PreparedRun, SkimflowError> {
        if self.config.workers == 0 {
            return Err(ConfigurationError::run_config("workers must be at least 1").into());
        }

        let run_config = self.config.run_config();
        let layout = run_config.validate()?;
        let libraries = self.catalog.load(&run_config.libraries)?;

        let mut builder = PipelineBuilder::new(&self.config.name).event_sink(Arc::clone(&self.sink));
        for declaration in self.config.ordered_stages()? {
            let factory = libraries.resolve(&declaration.name, &declaration.implementation)?;
            let spec = StageSpec::configure(
                &declaration.name,
                &declaration.implementation,
                declaration.parameters,
                &factory,
            )?;
            debug!(
                stage = %spec.name,
                implementation = %spec.implementation,
                parameters = %spec.parameters,
                "Configured stage"
            );
            builder.add_stage_spec(spec);
        }
        let pipeline = builder.build()?;
        self.config.skim.validate(&pipeline)?;

        info!(
            process = %self.config.name,
            stages = pipeline.len(),
            libraries = ?libraries.names(),
            voters = ?self.config.skim.voters,
            default = %self.config.skim.default,
            "Process prepared"
        );

        Ok(PreparedRun {
            process: self.config.name.clone(),
            run_config,
            layout,
            libraries,
            pipeline,
            skim: Arc::new(self.config.skim.clone()),
            failure_mode: self.config.failure_mode,
            workers: self.config.workers,
            sink: Arc::clone(&self.sink),
        })
    }

    /// Prepares and runs the process.
    ///
    /// # Errors
    ///
    /// See [`RunController::prepare`] and [`PreparedRun::run`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, SkimflowError> {
        self.prepare()?.run(cancel).await
    }
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("process", &self.config.name)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

struct EventOutcome {
    source: usize,
    event: EventRecord,
    decision: Result<SkimDecision, ProcessingError>,
}

/// One event running on its own task. Dropping it aborts the task.
struct EventTask {
    handle: JoinHandle<EventOutcome>,
    source: usize,
    index: u64,
}

impl Future for EventTask {
    type Output = EventOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<EventOutcome> {
        let (source, index) = (self.source, self.index);
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|err| EventOutcome {
                source,
                event: EventRecord::new(index),
                decision: Err(ProcessingError::new(
                    "<worker>",
                    index,
                    format!("event task did not complete: {err}"),
                )),
            })
        })
    }
}

impl Drop for EventTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A validated process, ready to read events.
pub struct PreparedRun {
    process: String,
    run_config: RunConfig,
    layout: OutputLayout,
    libraries: LoadedLibraries,
    pipeline: Pipeline,
    skim: Arc<SkimPolicy>,
    failure_mode: FailureMode,
    workers: usize,
    sink: Arc<dyn EventSink>,
}

impl PreparedRun {
    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    /// Returns the loaded libraries.
    #[must_use]
    pub fn libraries(&self) -> &LoadedLibraries {
        &self.libraries
    }

    /// Reads every input event, runs the pipeline on it, applies the skim
    /// policy and writes retained events.
    ///
    /// Up to `workers` events are in flight at once; results are applied
    /// strictly in input order. Cancellation is checked before each result is
    /// applied; once set, pending tasks are aborted and the outputs are
    /// closed on a record boundary.
    ///
    /// # Errors
    ///
    /// Returns `Processing` for a stage failure under `FailFast` (after
    /// closing the outputs), or any I/O or input decoding error.
    pub async fn run(self, cancel: &CancellationToken) -> Result<RunSummary, SkimflowError> {
        let mut summary = RunSummary::start(&self.process);
        let mut failures = FailureCollector::new(self.failure_mode);

        info!(
            run_id = %summary.run_id,
            process = %self.process,
            inputs = self.run_config.input_files.len(),
            outputs = self.run_config.output_files.len(),
            workers = self.workers,
            failure_mode = %self.failure_mode,
            "Run started"
        );
        self.sink.emit(
            "run.started",
            Some(serde_json::json!({
                "run_id": summary.run_id.to_string(),
                "process": &self.process,
                "stages": self.pipeline.stage_names(),
            })),
        );

        let mut outputs = OutputSet::create(self.layout, &self.run_config.output_files).await?;
        let mut reader = EventReader::new(self.run_config.input_files.clone());
        let mut in_flight: FuturesOrdered<EventTask> = FuturesOrdered::new();
        let mut exhausted = false;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            while !exhausted && in_flight.len() < self.workers {
                match reader.next_event().await {
                    Ok(Some(sourced)) => in_flight.push_back(self.spawn_event(sourced)),
                    Ok(None) => exhausted = true,
                    Err(err) => {
                        drop(in_flight);
                        outputs.finish().await?;
                        return Err(err);
                    }
                }
            }

            let next = tokio::select! {
                outcome = in_flight.next() => outcome,
                () = cancel.cancelled() => None,
            };
            let Some(outcome) = next else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }

            summary.processed += 1;
            let index = outcome.event.index;
            match outcome.decision {
                Ok(SkimDecision::Keep) => {
                    outputs.write(outcome.source, &outcome.event).await?;
                    summary.kept += 1;
                    debug!(event_index = index, "Event kept");
                    self.sink
                        .emit("event.kept", Some(serde_json::json!({ "index": index })));
                }
                Ok(SkimDecision::Drop) => {
                    summary.dropped += 1;
                    debug!(event_index = index, "Event dropped");
                    self.sink
                        .emit("event.dropped", Some(serde_json::json!({ "index": index })));
                }
                Err(err) => {
                    summary.failed += 1;
                    failures.record(&err);
                    self.sink.emit(
                        "event.failed",
                        Some(serde_json::json!({
                            "index": index,
                            "stage": &err.stage,
                            "error": &err.message,
                        })),
                    );
                    if failures.should_stop() {
                        warn!(error = %err, "Stopping run on first failure");
                        drop(in_flight);
                        outputs.finish().await?;
                        self.sink.emit(
                            "run.aborted",
                            Some(serde_json::json!({
                                "run_id": summary.run_id.to_string(),
                                "reason": err.to_string(),
                            })),
                        );
                        return Err(err.into());
                    }
                    warn!(error = %err, "Skipping failed event");
                }
            }
        }

        if cancel.is_cancelled() {
            let reason = cancel
                .reason()
                .unwrap_or_else(|| "cancelled".to_string());
            let discarded = in_flight.len();
            drop(in_flight);
            warn!(
                reason = %reason,
                applied = summary.processed,
                discarded,
                "Run aborted between events"
            );
            summary.aborted = Some(reason);
        }

        summary.failures = failures.into_failures();
        summary.outputs = outputs.finish().await?;
        summary.finished_at = Utc::now();

        let event_type = if summary.aborted.is_some() {
            "run.aborted"
        } else {
            "run.completed"
        };
        self.sink.emit(event_type, Some(serde_json::to_value(&summary)?));
        info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            kept = summary.kept,
            dropped = summary.dropped,
            failed = summary.failed,
            duration_ms = summary.duration_ms(),
            outcome = %summary.outcome(),
            "Run finished"
        );

        Ok(summary)
    }

    fn spawn_event(&self, sourced: SourcedEvent) -> EventTask {
        let SourcedEvent { source, mut event } = sourced;
        let index = event.index;
        let pipeline = self.pipeline.clone();
        let skim = Arc::clone(&self.skim);

        let handle = tokio::spawn(async move {
            let decision = pipeline
                .run_one_event(&mut event)
                .await
                .map(|votes| skim.decide(&votes));
            EventOutcome {
                source,
                event,
                decision,
            }
        });

        EventTask {
            handle,
            source,
            index,
        }
    }
}

impl std::fmt::Debug for PreparedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRun")
            .field("process", &self.process)
            .field("run_config", &self.run_config)
            .field("layout", &self.layout)
            .field("pipeline", &self.pipeline)
            .field("failure_mode", &self.failure_mode)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
