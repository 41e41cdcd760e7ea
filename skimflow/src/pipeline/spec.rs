//! Stage specifications.

use crate::errors::SkimflowError;
use crate::params::ParameterBag;
use crate::stages::{Stage, StageFactory};
use std::sync::Arc;

/// A configured stage instance, ready to be placed in a pipeline.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The implementation identifier the stage was resolved from.
    pub implementation: String,
    /// The parameters the stage was configured with.
    pub parameters: ParameterBag,
    /// The configured stage.
    pub runner: Arc<dyn Stage>,
}

impl StageSpec {
    /// Wraps an already-configured stage.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            implementation: String::new(),
            parameters: ParameterBag::new(),
            runner,
        }
    }

    /// Builds a stage from its factory and configures it.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` or `InvalidParameter` if the stage rejects
    /// its parameters.
    pub fn configure(
        name: impl Into<String>,
        implementation: impl Into<String>,
        parameters: ParameterBag,
        factory: &StageFactory,
    ) -> Result<Self, SkimflowError> {
        let name = name.into();
        let mut stage = factory();
        stage
            .configure(&parameters)
            .map_err(|err| SkimflowError::from_parameter(&name, err))?;

        Ok(Self {
            name,
            implementation: implementation.into(),
            parameters,
            runner: Arc::from(stage),
        })
    }
}
