//! Testing utilities for skimflow pipelines.
//!
//! This module provides:
//! - Stand-in stages with scripted verdicts, failures and delays
//! - Event fixtures and NDJSON helpers

mod fixtures;
mod mocks;

pub use fixtures::{numbered_events, read_indices, write_events};
pub use mocks::{
    CancellingStage, FailingStage, RecordingStage, SlowStage, TraceStage, VotingStage,
};
