//! Run control.
//!
//! [`RunController::prepare`] performs every fatal check up front and yields a
//! [`PreparedRun`]; [`PreparedRun::run`] streams events through the pipeline
//! and produces a [`RunSummary`].

mod controller;
mod summary;

#[cfg(test)]
mod integration_tests;

pub use controller::{PreparedRun, RunController};
pub use summary::{
    RunOutcome, RunSummary, EXIT_ABORTED, EXIT_FAILED_EVENTS, EXIT_FATAL, EXIT_SUCCESS,
};
