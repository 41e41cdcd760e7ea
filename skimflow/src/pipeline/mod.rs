//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications
//! - Pipeline builder with validation
//! - Ordered per-event execution
//! - The skim policy
//! - Failure tolerance modes

mod builder;
mod failure_tolerance;
mod sequence;
mod skim;
mod spec;


pub use builder::PipelineBuilder;
pub use failure_tolerance::{FailureCollector, FailureMode, FailureRecord};
pub use sequence::Pipeline;
pub use skim::SkimPolicy;
pub use spec::StageSpec;
