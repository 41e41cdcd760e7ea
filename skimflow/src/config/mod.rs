//! Process configuration.
//!
//! A process is declared in a TOML (`.toml`) or JSON file:
//!
//! ```toml
//! name = "recon"
//! libraries = ["libSkimCore.so"]
//! output_files = ["skim_events.ndjson"]
//! sequence = ["tag", "trigger"]
//! failure_mode = "fail_fast"
//! workers = 1
//!
//! [skim]
//! default = "drop"
//! voters = ["trigger"]
//!
//! [[stages]]
//! name = "tag"
//! implementation = "core::Tag"
//! [stages.parameters]
//! label = "recon"
//!
//! [[stages]]
//! name = "trigger"
//! implementation = "core::ThresholdVote"
//! [stages.parameters]
//! collection = "energies"
//! threshold = 1500.0
//! ```
//!
//! A stage can start from a named template and override single parameters:
//!
//! ```toml
//! [templates.simpleTrigger]
//! implementation = "core::ThresholdVote"
//! [templates.simpleTrigger.parameters]
//! collection = "energies"
//! threshold = 1000.0
//!
//! [[stages]]
//! name = "trigger"
//! template = "simpleTrigger"
//! [stages.parameters]
//! threshold = 1500.0
//! ```
//!
//! Values from the file can be overridden from the command line through
//! [`ConfigOverrides`].

mod run_config;

pub use run_config::RunConfig;

use crate::errors::{ConfigurationError, SkimflowError};
use crate::params::ParameterBag;
use crate::pipeline::{FailureMode, SkimPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Output file used when neither the configuration nor the command line
/// names one.
pub const DEFAULT_OUTPUT_FILE: &str = "skim_events.ndjson";

fn default_name() -> String {
    "process".to_string()
}

fn default_workers() -> usize {
    1
}

/// Reusable stage defaults: an implementation and its default parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageTemplate {
    /// Implementation identifier.
    pub implementation: String,
    /// Default parameters, overridden key by key by the declaration.
    #[serde(default)]
    pub parameters: ParameterBag,
}

impl StageTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(implementation: impl Into<String>, parameters: ParameterBag) -> Self {
        Self {
            implementation: implementation.into(),
            parameters,
        }
    }
}

/// One stage instance declared in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDeclaration {
    /// Unique stage name.
    pub name: String,
    /// Implementation identifier, resolved against the loaded libraries.
    /// Empty when it comes from the template.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub implementation: String,
    /// Template the stage starts from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Stage parameters.
    #[serde(default)]
    pub parameters: ParameterBag,
}

impl StageDeclaration {
    /// Creates a declaration with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            template: None,
            parameters: ParameterBag::new(),
        }
    }

    /// Creates a declaration that takes its implementation and default
    /// parameters from `template`.
    #[must_use]
    pub fn from_template(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: String::new(),
            template: Some(template.into()),
            parameters: ParameterBag::new(),
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterBag) -> Self {
        self.parameters = parameters;
        self
    }
}

/// The complete declaration of a skim process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Process name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Library identifiers to load.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Input files. Usually supplied on the command line.
    #[serde(default)]
    pub input_files: Vec<PathBuf>,
    /// Output files.
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
    /// Execution order by stage name. Defaults to declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<String>>,
    /// What to do when a stage fails on an event.
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Number of events processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Skim policy.
    #[serde(default)]
    pub skim: SkimPolicy,
    /// Named stage templates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates: BTreeMap<String, StageTemplate>,
    /// Stage declarations.
    #[serde(default)]
    pub stages: Vec<StageDeclaration>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new(default_name())
    }
}

impl ProcessConfig {
    /// Creates an empty process.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            libraries: Vec::new(),
            input_files: Vec::new(),
            output_files: Vec::new(),
            sequence: None,
            failure_mode: FailureMode::default(),
            workers: default_workers(),
            skim: SkimPolicy::default(),
            templates: BTreeMap::new(),
            stages: Vec::new(),
        }
    }

    /// Loads a configuration file. `.toml` files are parsed as TOML,
    /// anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns `FileAccess` if the file cannot be read, or a
    /// `CONFIG-006-PARSE` configuration error if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, SkimflowError> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| SkimflowError::file_access(path, err))?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };

        parsed.map_err(|err| {
            SkimflowError::Configuration(ConfigurationError::parse(format!(
                "{}: {}",
                path.display(),
                err.message
            )))
        })
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a `CONFIG-006-PARSE` error.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content).map_err(|err| ConfigurationError::parse(err.to_string()))
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a `CONFIG-006-PARSE` error.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(content).map_err(|err| ConfigurationError::parse(err.to_string()))
    }

    /// Adds a stage declaration.
    #[must_use]
    pub fn with_stage(mut self, stage: StageDeclaration) -> Self {
        self.stages.push(stage);
        self
    }

    /// Adds a named template.
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, template: StageTemplate) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    /// Looks up a declaration by name.
    #[must_use]
    pub fn declaration(&self, name: &str) -> Option<&StageDeclaration> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn sequence_names(&self) -> Vec<&str> {
        match &self.sequence {
            Some(sequence) => sequence.iter().map(String::as_str).collect(),
            None => self.stages.iter().map(|s| s.name.as_str()).collect(),
        }
    }

    /// Applies the declaration's template, if any.
    ///
    /// The result carries a concrete implementation and the template's
    /// parameters overridden by the declaration's own.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-003-UNKNOWN_STAGE` for an undeclared template, or
    /// `CONFIG-006-PARSE` when there is neither an implementation nor a
    /// template.
    pub fn resolve(
        &self,
        declaration: &StageDeclaration,
    ) -> Result<StageDeclaration, ConfigurationError> {
        let Some(template_name) = &declaration.template else {
            if declaration.implementation.is_empty() {
                return Err(ConfigurationError::missing_implementation(&declaration.name));
            }
            return Ok(declaration.clone());
        };
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| ConfigurationError::unknown_template(&declaration.name, template_name))?;

        let implementation = if declaration.implementation.is_empty() {
            template.implementation.clone()
        } else {
            declaration.implementation.clone()
        };
        let mut parameters = template.parameters.clone();
        for (key, value) in declaration.parameters.iter() {
            parameters.set(key, value.clone());
        }

        Ok(StageDeclaration {
            name: declaration.name.clone(),
            implementation,
            template: Some(template_name.clone()),
            parameters,
        })
    }

    /// Resolves the sequence against the declarations and applies templates.
    ///
    /// Declared stages missing from an explicit sequence are skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-001-DUPLICATE_STAGE` if two declarations share a name,
    /// `CONFIG-003-UNKNOWN_STAGE` if the sequence names an undeclared stage
    /// or a stage names an undeclared template, or the errors of
    /// [`ProcessConfig::resolve`].
    pub fn ordered_stages(&self) -> Result<Vec<StageDeclaration>, ConfigurationError> {
        let mut declared: HashSet<&str> = HashSet::with_capacity(self.stages.len());
        for stage in &self.stages {
            if !declared.insert(stage.name.as_str()) {
                return Err(ConfigurationError::duplicate_stage(&stage.name));
            }
        }

        let names = self.sequence_names();
        let ordered = names
            .iter()
            .map(|name| {
                self.declaration(name)
                    .ok_or_else(|| ConfigurationError::unknown_stage(name))
                    .and_then(|declaration| self.resolve(declaration))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for stage in &self.stages {
            if !names.contains(&stage.name.as_str()) {
                warn!(stage = %stage.name, "Stage is declared but not in the sequence; it will not run");
            }
        }

        Ok(ordered)
    }

    /// Returns the run configuration, filling in the default output file.
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        let output_files = if self.output_files.is_empty() {
            vec![PathBuf::from(DEFAULT_OUTPUT_FILE)]
        } else {
            self.output_files.clone()
        };
        RunConfig {
            input_files: self.input_files.clone(),
            output_files,
            libraries: self.libraries.clone(),
        }
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if !overrides.input_files.is_empty() {
            self.input_files.clone_from(&overrides.input_files);
        }
        if let Some(output) = &overrides.output {
            self.output_files = vec![output.clone()];
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if overrides.skip_failures {
            self.failure_mode = FailureMode::SkipAndContinue;
        }
    }

    /// Renders a human-readable dump of the process.
    #[must_use]
    pub fn describe(&self) -> String {
        let run = self.run_config();
        let mut out = String::new();

        let _ = writeln!(out, "Process '{}'", self.name);
        let _ = writeln!(out, "  libraries: {}", join_or_none(&self.libraries));
        let _ = writeln!(out, "  sequence:");
        let names = self.sequence_names();
        if names.is_empty() {
            let _ = writeln!(out, "    (empty)");
        }
        for (position, name) in names.iter().enumerate() {
            match self.declaration(name) {
                Some(declared) => {
                    let stage = self.resolve(declared).unwrap_or_else(|_| declared.clone());
                    let voter = if self.skim.is_voter(name) { " [voter]" } else { "" };
                    let origin = match &stage.template {
                        Some(template) => format!(", template {template}"),
                        None => String::new(),
                    };
                    let _ = writeln!(
                        out,
                        "    {}. {} ({}{}){} {}",
                        position + 1,
                        stage.name,
                        stage.implementation,
                        origin,
                        voter,
                        stage.parameters
                    );
                }
                None => {
                    let _ = writeln!(out, "    {}. {} (undeclared)", position + 1, name);
                }
            }
        }
        let _ = writeln!(
            out,
            "  skim: default = {}, voters = [{}]",
            self.skim.default,
            self.skim.voters.join(", ")
        );
        let _ = writeln!(
            out,
            "  failure mode: {}, workers: {}",
            self.failure_mode, self.workers
        );
        let _ = writeln!(out, "  input files: {}", join_paths(&run.input_files));
        let _ = write!(out, "  output files: {}", join_paths(&run.output_files));
        out
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    let items: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    join_or_none(&items)
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replaces the input file list when non-empty.
    pub input_files: Vec<PathBuf>,
    /// Replaces the output file list with a single file.
    pub output: Option<PathBuf>,
    /// Replaces the worker count.
    pub workers: Option<usize>,
    /// Switches the failure mode to skip-and-continue.
    pub skip_failures: bool,
}
