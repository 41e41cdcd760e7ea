//! Stage verdicts and skim decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The result of a stage processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No opinion on retention.
    Proceed,
    /// An opinion on retention: `true` asks to keep the event.
    Vote(bool),
}

impl Verdict {
    /// Returns the vote, if any.
    #[must_use]
    pub const fn vote(self) -> Option<bool> {
        match self {
            Self::Proceed => None,
            Self::Vote(keep) => Some(keep),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => write!(f, "proceed"),
            Self::Vote(true) => write!(f, "vote(keep)"),
            Self::Vote(false) => write!(f, "vote(drop)"),
        }
    }
}

/// A vote cast by a named stage for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The voting stage.
    pub stage: String,
    /// Whether the stage asked to keep the event.
    pub keep: bool,
}

impl Vote {
    /// Creates a new vote.
    #[must_use]
    pub fn new(stage: impl Into<String>, keep: bool) -> Self {
        Self {
            stage: stage.into(),
            keep,
        }
    }
}

/// Whether an event is retained in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkimDecision {
    /// Write the event to the output.
    #[default]
    Keep,
    /// Discard the event.
    Drop,
}

impl fmt::Display for SkimDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => write!(f, "keep"),
            Self::Drop => write!(f, "drop"),
        }
    }
}
