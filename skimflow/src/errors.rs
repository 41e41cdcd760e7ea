//! Error types for the skimflow framework.
//!
//! Configuration-class errors (`Configuration`, `MissingParameter`,
//! `InvalidParameter`, `UnresolvedImplementation`, `LibraryLoad`) are always
//! fatal and surface before the first event is read. `Processing` errors are
//! per-event and their severity is decided by the run's failure mode.

use crate::params::ParameterError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for skimflow operations.
#[derive(Debug, Error)]
pub enum SkimflowError {
    /// The process configuration is invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A stage requires a parameter its bag does not provide.
    #[error("Stage '{stage}' is missing required parameter '{key}'")]
    MissingParameter {
        /// The stage being configured.
        stage: String,
        /// The missing key.
        key: String,
    },

    /// A stage parameter has the wrong kind or an unusable value.
    #[error("Stage '{stage}' has invalid parameter '{key}': {reason}")]
    InvalidParameter {
        /// The stage being configured.
        stage: String,
        /// The offending key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No loaded library provides the stage's implementation.
    #[error("Stage '{stage}': implementation '{implementation}' is not provided by any loaded library")]
    UnresolvedImplementation {
        /// The stage being resolved.
        stage: String,
        /// The implementation identifier.
        implementation: String,
    },

    /// A declared library could not be loaded.
    #[error("{0}")]
    LibraryLoad(#[from] LibraryLoadError),

    /// A stage failed while processing an event.
    #[error("{0}")]
    Processing(#[from] ProcessingError),

    /// An input event line could not be decoded.
    #[error("Malformed event in {} at line {line}: {message}", path.display())]
    EventFormat {
        /// The input file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Decoder message.
        message: String,
    },

    /// An input or output file could not be opened, read or written.
    #[error("Cannot access {}: {source}", path.display())]
    FileAccess {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SkimflowError {
    /// Wraps an I/O error with the path it occurred on.
    #[must_use]
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Attributes a parameter lookup failure to the stage that performed it.
    #[must_use]
    pub fn from_parameter(stage: impl Into<String>, err: ParameterError) -> Self {
        let stage = stage.into();
        match err {
            ParameterError::KeyNotFound { key } => Self::MissingParameter { stage, key },
            ParameterError::TypeMismatch { key, expected, found } => Self::InvalidParameter {
                stage,
                key,
                reason: format!("expected {expected}, found {found}"),
            },
            ParameterError::InvalidValue { key, reason } => {
                Self::InvalidParameter { stage, key, reason }
            }
        }
    }

    /// Returns the stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::MissingParameter { stage, .. }
            | Self::InvalidParameter { stage, .. }
            | Self::UnresolvedImplementation { stage, .. } => Some(stage.as_str()),
            Self::Processing(err) => Some(err.stage.as_str()),
            Self::Configuration(err) => err.stages.first().map(String::as_str),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SkimflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONFIG-001-DUPLICATE_STAGE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Category of a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationErrorKind {
    /// Two stages share a name.
    DuplicateStageName,
    /// The run configuration (input/output files) is malformed.
    MalformedRunConfig,
    /// The sequence references a stage, or a stage references a template,
    /// that was never declared.
    UnknownStage,
    /// A skim voter is not part of the pipeline.
    UnknownVoter,
    /// A stage name does not satisfy the naming rules.
    InvalidName,
    /// The configuration document could not be parsed.
    Parse,
}

impl ConfigurationErrorKind {
    /// Returns the contract code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::DuplicateStageName => "CONFIG-001-DUPLICATE_STAGE",
            Self::MalformedRunConfig => "CONFIG-002-RUN_CONFIG",
            Self::UnknownStage => "CONFIG-003-UNKNOWN_STAGE",
            Self::UnknownVoter => "CONFIG-004-UNKNOWN_VOTER",
            Self::InvalidName => "CONFIG-005-INVALID_NAME",
            Self::Parse => "CONFIG-006-PARSE",
        }
    }
}

/// Error raised when the process configuration is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error category.
    pub kind: ConfigurationErrorKind,
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(kind: ConfigurationErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            error_info: ContractErrorInfo::new(kind.code(), message.clone()),
            message,
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.error_info = self.error_info.with_fix_hint(hint);
        self
    }

    /// Two stages in one pipeline share `name`.
    #[must_use]
    pub fn duplicate_stage(name: &str) -> Self {
        Self::new(
            ConfigurationErrorKind::DuplicateStageName,
            format!("Duplicate stage name '{name}'"),
        )
        .with_stages(vec![name.to_string()])
        .with_fix_hint("Give every stage instance a unique name.")
    }

    /// The sequence names a stage that has no declaration.
    #[must_use]
    pub fn unknown_stage(name: &str) -> Self {
        Self::new(
            ConfigurationErrorKind::UnknownStage,
            format!("Sequence references undeclared stage '{name}'"),
        )
        .with_stages(vec![name.to_string()])
        .with_fix_hint("Declare the stage under [[stages]] or remove it from the sequence.")
    }

    /// A stage declaration references a template that was never declared.
    #[must_use]
    pub fn unknown_template(stage: &str, template: &str) -> Self {
        Self::new(
            ConfigurationErrorKind::UnknownStage,
            format!("Stage '{stage}' references undeclared template '{template}'"),
        )
        .with_stages(vec![stage.to_string()])
        .with_fix_hint("Declare the template under [templates] or fix the name.")
    }

    /// A stage declaration names neither an implementation nor a template.
    #[must_use]
    pub fn missing_implementation(stage: &str) -> Self {
        Self::new(
            ConfigurationErrorKind::Parse,
            format!("Stage '{stage}' declares neither an implementation nor a template"),
        )
        .with_stages(vec![stage.to_string()])
    }

    /// A skim voter does not appear in the pipeline.
    #[must_use]
    pub fn unknown_voter(name: &str) -> Self {
        Self::new(
            ConfigurationErrorKind::UnknownVoter,
            format!("Skim voter '{name}' is not a stage in the pipeline"),
        )
        .with_stages(vec![name.to_string()])
        .with_fix_hint("Voters must name a stage that is part of the sequence.")
    }

    /// The run configuration's file lists are inconsistent.
    #[must_use]
    pub fn run_config(message: impl Into<String>) -> Self {
        Self::new(ConfigurationErrorKind::MalformedRunConfig, message)
    }

    /// The configuration document is unreadable.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ConfigurationErrorKind::Parse, message)
    }
}

/// Error raised when a declared library cannot be loaded.
#[derive(Debug, Clone, Error)]
#[error("Failed to load library '{library}': {reason}")]
pub struct LibraryLoadError {
    /// The library identifier.
    pub library: String,
    /// Why loading failed.
    pub reason: String,
}

impl LibraryLoadError {
    /// Creates a new library load error.
    #[must_use]
    pub fn new(library: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a stage implementation while processing one event.
///
/// The pipeline attaches the stage name and event index to produce a
/// [`ProcessingError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StageFailure {
    /// Implementation-provided message.
    pub message: String,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when a stage fails on a specific event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage}' failed on event {event_index}: {message}")]
pub struct ProcessingError {
    /// The failing stage.
    pub stage: String,
    /// Index of the event in the input stream.
    pub event_index: u64,
    /// Failure message.
    pub message: String,
}

impl ProcessingError {
    /// Creates a new processing error.
    #[must_use]
    pub fn new(stage: impl Into<String>, event_index: u64, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            event_index,
            message: message.into(),
        }
    }
}
