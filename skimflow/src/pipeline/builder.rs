//! Pipeline builder with validation.

use super::{Pipeline, StageSpec};
use crate::errors::{ConfigurationError, ConfigurationErrorKind};
use crate::events::EventSink;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

static STAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:\-]*$").expect("stage name pattern compiles")
});

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
    sink: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            sink: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    /// Appends a stage in place.
    pub fn add_stage_spec(&mut self, spec: StageSpec) {
        self.stages.push(spec);
    }

    /// Sets the event sink the built pipeline reports to.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// An empty pipeline is valid.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-005-INVALID_NAME` for a malformed stage name, or
    /// `CONFIG-001-DUPLICATE_STAGE` when two stages share a name.
    pub fn build(self) -> Result<Pipeline, ConfigurationError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.stages.len());

        for spec in &self.stages {
            if !STAGE_NAME.is_match(&spec.name) {
                return Err(ConfigurationError::new(
                    ConfigurationErrorKind::InvalidName,
                    format!("Invalid stage name '{}'", spec.name),
                )
                .with_stages(vec![spec.name.clone()])
                .with_fix_hint(
                    "Stage names start with a letter or underscore and contain only letters, digits, '_', '.', ':' or '-'.",
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigurationError::duplicate_stage(&spec.name));
            }
        }

        let pipeline = Pipeline::new(self.name, self.stages);
        Ok(match self.sink {
            Some(sink) => pipeline.with_event_sink(sink),
            None => pipeline,
        })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
