//! Failure tolerance for per-event processing errors.

use crate::errors::ProcessingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to handle a stage failing on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop the run on the first failure (default).
    #[default]
    FailFast,
    /// Exclude the failing event from the output, count it, and continue.
    SkipAndContinue,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::SkipAndContinue => write!(f, "skip_and_continue"),
        }
    }
}

/// Record of a stage failing on one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name.
    pub stage: String,
    /// Index of the event in the input stream.
    pub event_index: u64,
    /// Error message.
    pub error: String,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record stamped with the current time.
    #[must_use]
    pub fn new(stage: impl Into<String>, event_index: u64, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            event_index,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<&ProcessingError> for FailureRecord {
    fn from(err: &ProcessingError) -> Self {
        Self::new(&err.stage, err.event_index, &err.message)
    }
}

/// Collects failures during a run.
#[derive(Debug, Default)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    failures: Vec<FailureRecord>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            failures: Vec::new(),
        }
    }

    /// Records a failure.
    pub fn record(&mut self, err: &ProcessingError) {
        self.failures.push(FailureRecord::from(err));
    }

    /// Returns true if the run must stop after the failures seen so far.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.mode {
            FailureMode::FailFast => !self.failures.is_empty(),
            FailureMode::SkipAndContinue => false,
        }
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns all failures, in the order they were recorded.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Consumes the collector, returning its failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<FailureRecord> {
        self.failures
    }
}
