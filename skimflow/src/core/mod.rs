//! Core domain model types for skimflow.
//!
//! This module contains the fundamental types used throughout the framework:
//! - The per-event record stages read and write
//! - Stage verdicts and skim decisions

mod event;
mod status;

pub use event::EventRecord;
pub use status::{SkimDecision, Verdict, Vote};
