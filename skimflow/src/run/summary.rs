//! Run summary and exit classification.

use crate::pipeline::FailureRecord;
use crate::store::OutputSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Process exit code for a run with no failed events.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code for a fatal error.
pub const EXIT_FATAL: i32 = 1;
/// Process exit code for a run that completed with failed events.
pub const EXIT_FAILED_EVENTS: i32 = 2;
/// Process exit code for an aborted run.
pub const EXIT_ABORTED: i32 = 130;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every event was decided.
    Completed,
    /// The run finished but some events failed and were skipped.
    CompletedWithFailures,
    /// The run was cancelled between events.
    Aborted,
}

impl RunOutcome {
    /// Returns the process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Completed => EXIT_SUCCESS,
            Self::CompletedWithFailures => EXIT_FAILED_EVENTS,
            Self::Aborted => EXIT_ABORTED,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithFailures => write!(f, "completed with failures"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Counters and artifacts of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Process name.
    pub process: String,
    /// When event processing started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
    /// Events whose result was applied.
    pub processed: u64,
    /// Events written to the output.
    pub kept: u64,
    /// Events discarded by the skim policy.
    pub dropped: u64,
    /// Events excluded because a stage failed.
    pub failed: u64,
    /// One record per failed event.
    pub failures: Vec<FailureRecord>,
    /// What was written to each output file.
    pub outputs: Vec<OutputSummary>,
    /// Why the run was aborted, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunSummary {
    /// Creates an empty summary for a run starting now.
    #[must_use]
    pub fn start(process: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            process: process.into(),
            started_at: now,
            finished_at: now,
            processed: 0,
            kept: 0,
            dropped: 0,
            failed: 0,
            failures: Vec::new(),
            outputs: Vec::new(),
            aborted: None,
        }
    }

    /// Classifies the run.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        if self.aborted.is_some() {
            RunOutcome::Aborted
        } else if self.failed > 0 {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Completed
        }
    }

    /// Returns the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.outcome().exit_code()
    }

    /// Returns the wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} of '{}' {}", self.run_id, self.process, self.outcome())?;
        write!(
            f,
            "  processed: {}, kept: {}, dropped: {}, failed: {}",
            self.processed, self.kept, self.dropped, self.failed
        )?;
        if let Some(reason) = &self.aborted {
            write!(f, "\n  aborted: {reason}")?;
        }
        for failure in &self.failures {
            write!(
                f,
                "\n  failure: stage '{}' on event {}: {}",
                failure.stage, failure.event_index, failure.error
            )?;
        }
        for output in &self.outputs {
            write!(
                f,
                "\n  output: {} ({} events, sha256 {})",
                output.path.display(),
                output.events,
                output.sha256
            )?;
        }
        Ok(())
    }
}
