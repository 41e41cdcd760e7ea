//! # Skimflow
//!
//! Ordered event-processing pipelines with a skim (retain/drop) policy.
//!
//! A process declares named stages, each resolved from a library by
//! implementation identifier and configured from a parameter bag. Every input
//! event flows through the stages in order; designated voter stages then
//! decide whether the event is written to the output.
//!
//! - **Stages**: configured once, executed once per event, optionally voting
//! - **Pipelines**: validated, ordered sequences of uniquely named stages
//! - **Skim policy**: a default decision OR-combined with voter verdicts
//! - **Run control**: fatal checks up front, order-preserving parallel runs,
//!   failure modes and cooperative cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skimflow::prelude::*;
//!
//! let config = ProcessConfig::load(Path::new("recon.toml"))?;
//! let controller = RunController::new(config, Arc::new(LibraryCatalog::builtin()));
//! let summary = controller.run(&CancellationToken::new()).await?;
//! std::process::exit(summary.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod params;
pub mod pipeline;
pub mod registry;
pub mod run;
pub mod stages;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{
        ConfigOverrides, ProcessConfig, RunConfig, StageDeclaration, StageTemplate,
    };
    pub use crate::core::{EventRecord, SkimDecision, Verdict, Vote};
    pub use crate::errors::{
        ConfigurationError, ConfigurationErrorKind, ContractErrorInfo, LibraryLoadError,
        ProcessingError, SkimflowError, StageFailure,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::params::{ParameterBag, ParameterError, ParameterValue, Scalar};
    pub use crate::pipeline::{
        FailureMode, FailureRecord, Pipeline, PipelineBuilder, SkimPolicy, StageSpec,
    };
    pub use crate::registry::{Library, LibraryCatalog, LoadedLibraries};
    pub use crate::run::{PreparedRun, RunController, RunOutcome, RunSummary};
    pub use crate::stages::{Stage, StageFactory};
}
