//! Skim policy: the per-event retain/drop decision.

use super::Pipeline;
use crate::core::{SkimDecision, Vote};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Default decision plus the stages whose votes can override it.
///
/// Voters are OR-combined: one `true` vote keeps the event. If at least one
/// voter voted and none voted `true`, the event is dropped. If no voter
/// voted, the default applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkimPolicy {
    /// Decision used when no voter casts a vote.
    #[serde(default)]
    pub default: SkimDecision,
    /// Names of the voting stages, in declaration order.
    #[serde(default)]
    pub voters: Vec<String>,
}

impl SkimPolicy {
    /// Creates a policy with no voters.
    #[must_use]
    pub fn new(default: SkimDecision) -> Self {
        Self {
            default,
            voters: Vec::new(),
        }
    }

    /// Creates a policy that keeps events unless a voter says otherwise.
    #[must_use]
    pub fn default_keep() -> Self {
        Self::new(SkimDecision::Keep)
    }

    /// Creates a policy that drops events unless a voter keeps them.
    #[must_use]
    pub fn default_drop() -> Self {
        Self::new(SkimDecision::Drop)
    }

    /// Adds a voter stage. Adding the same stage twice has no effect.
    #[must_use]
    pub fn consider(mut self, stage: impl Into<String>) -> Self {
        let stage = stage.into();
        if !self.is_voter(&stage) {
            self.voters.push(stage);
        }
        self
    }

    /// Checks if a stage is a voter.
    #[must_use]
    pub fn is_voter(&self, stage: &str) -> bool {
        self.voters.iter().any(|v| v == stage)
    }

    /// Decides the fate of one event from the votes its stages cast.
    ///
    /// Votes from stages that are not voters are ignored.
    #[must_use]
    pub fn decide(&self, votes: &[Vote]) -> SkimDecision {
        let mut any_voted = false;
        for vote in votes.iter().filter(|v| self.is_voter(&v.stage)) {
            if vote.keep {
                return SkimDecision::Keep;
            }
            any_voted = true;
        }

        if any_voted {
            SkimDecision::Drop
        } else {
            self.default
        }
    }

    /// Checks that every voter is a stage of `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-004-UNKNOWN_VOTER` for the first voter not found.
    pub fn validate(&self, pipeline: &Pipeline) -> Result<(), ConfigurationError> {
        match self.voters.iter().find(|v| !pipeline.contains(v)) {
            Some(voter) => Err(ConfigurationError::unknown_voter(voter)),
            None => Ok(()),
        }
    }
}
