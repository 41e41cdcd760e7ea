//! Input/output files and libraries of one run.

use crate::errors::ConfigurationError;
use crate::store::OutputLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The files and libraries a run uses. Immutable once the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Input event files, read in order.
    pub input_files: Vec<PathBuf>,
    /// Output event files.
    pub output_files: Vec<PathBuf>,
    /// Library identifiers to load, in order.
    pub libraries: Vec<String>,
}

impl RunConfig {
    /// Checks the file lists and returns how outputs map onto inputs.
    ///
    /// A single output collects every input. Otherwise there must be exactly
    /// one output per input.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-002-RUN_CONFIG` if the lists are inconsistent.
    pub fn validate(&self) -> Result<OutputLayout, ConfigurationError> {
        if self.input_files.is_empty() {
            return Err(ConfigurationError::run_config("No input files given")
                .with_fix_hint("Pass an input file on the command line or set input_files."));
        }

        match self.output_files.len() {
            0 => Err(ConfigurationError::run_config("No output files given")
                .with_fix_hint("Set output_files or pass --output.")),
            1 => Ok(OutputLayout::Shared),
            n if n == self.input_files.len() => Ok(OutputLayout::PerInput),
            n => Err(ConfigurationError::run_config(format!(
                "{n} output files for {} input files",
                self.input_files.len()
            ))
            .with_fix_hint("Give either one output file or one output file per input file.")),
        }
    }
}
