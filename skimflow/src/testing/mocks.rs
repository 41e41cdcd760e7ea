//! Stand-in stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::core::{EventRecord, Verdict};
use crate::errors::StageFailure;
use crate::params::{ParameterBag, ParameterError};
use crate::stages::Stage;

/// Appends a label to the `trace` collection and counts its calls.
#[derive(Debug)]
pub struct TraceStage {
    label: String,
    call_count: Mutex<usize>,
}

impl TraceStage {
    /// Creates a new trace stage.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for TraceStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        *self.call_count.lock() += 1;
        event.append("trace", serde_json::Value::String(self.label.clone()));
        Ok(Verdict::Proceed)
    }
}

type IndexPredicate = Box<dyn Fn(u64) -> bool + Send + Sync>;

enum VoteRule {
    Fixed(Verdict),
    ByIndex(IndexPredicate),
}

/// Returns a fixed verdict, or votes by event index.
pub struct VotingStage {
    rule: VoteRule,
}

impl VotingStage {
    /// Always returns `verdict`.
    #[must_use]
    pub fn new(verdict: Verdict) -> Self {
        Self {
            rule: VoteRule::Fixed(verdict),
        }
    }

    /// Votes `keep(index)` for every event.
    #[must_use]
    pub fn keep_if<F>(keep: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        Self {
            rule: VoteRule::ByIndex(Box::new(keep)),
        }
    }
}

impl fmt::Debug for VotingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            VoteRule::Fixed(verdict) => f.debug_tuple("VotingStage").field(verdict).finish(),
            VoteRule::ByIndex(_) => f.debug_tuple("VotingStage").field(&"by_index").finish(),
        }
    }
}

#[async_trait]
impl Stage for VotingStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        Ok(match &self.rule {
            VoteRule::Fixed(verdict) => *verdict,
            VoteRule::ByIndex(keep) => Verdict::Vote(keep(event.index)),
        })
    }
}

/// Fails on every event, or only on selected event indices.
#[derive(Debug)]
pub struct FailingStage {
    error: String,
    indices: Option<HashSet<u64>>,
}

impl FailingStage {
    /// Fails on every event.
    #[must_use]
    pub fn always(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            indices: None,
        }
    }

    /// Fails only on the given event indices.
    #[must_use]
    pub fn on_indices(indices: impl IntoIterator<Item = u64>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            indices: Some(indices.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        let fails = self
            .indices
            .as_ref()
            .map_or(true, |indices| indices.contains(&event.index));
        if fails {
            Err(StageFailure::new(&self.error))
        } else {
            Ok(Verdict::Proceed)
        }
    }
}

/// Sleeps before returning, so that later events finish first.
///
/// The delay for event `i` is `step * (3 - i % 4)`.
#[derive(Debug)]
pub struct SlowStage {
    step: Duration,
}

impl SlowStage {
    /// Creates a slow stage with a delay step in milliseconds.
    #[must_use]
    pub fn with_step_ms(ms: u64) -> Self {
        Self {
            step: Duration::from_millis(ms),
        }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        let factor = 3 - u32::try_from(event.index % 4).unwrap_or(0);
        tokio::time::sleep(self.step * factor).await;
        Ok(Verdict::Proceed)
    }
}

/// Records the index of every event it sees.
///
/// Clones share one log, so a library factory can hand out clones and the
/// test can read what every instance saw.
#[derive(Debug, Default, Clone)]
pub struct RecordingStage {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the indices seen, in call order.
    #[must_use]
    pub fn seen(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        self.seen.lock().push(event.index);
        Ok(Verdict::Proceed)
    }
}

/// Cancels a token when it reaches a given event index.
#[derive(Debug)]
pub struct CancellingStage {
    token: CancellationToken,
    at_index: u64,
}

impl CancellingStage {
    /// Creates a stage that cancels `token` while processing event `at_index`.
    #[must_use]
    pub fn new(token: CancellationToken, at_index: u64) -> Self {
        Self { token, at_index }
    }
}

#[async_trait]
impl Stage for CancellingStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        if event.index == self.at_index {
            self.token.cancel(format!("cancelled at event {}", event.index));
        }
        Ok(Verdict::Proceed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_trace_stage() {
        let stage = TraceStage::new("a");
        let mut event = EventRecord::new(0);

        stage.execute(&mut event).await.unwrap();
        stage.execute(&mut event).await.unwrap();

        assert_eq!(stage.call_count(), 2);
        assert_eq!(event.get("trace"), Some(&json!(["a", "a"])));
    }

    #[tokio::test]
    async fn test_voting_stage_by_index() {
        let stage = VotingStage::keep_if(|i| i % 2 == 0);

        assert_eq!(stage.execute(&mut EventRecord::new(4)).await.unwrap(), Verdict::Vote(true));
        assert_eq!(stage.execute(&mut EventRecord::new(5)).await.unwrap(), Verdict::Vote(false));
    }

    #[tokio::test]
    async fn test_failing_stage_on_indices() {
        let stage = FailingStage::on_indices([2], "bad");

        assert!(stage.execute(&mut EventRecord::new(1)).await.is_ok());
        let err = stage.execute(&mut EventRecord::new(2)).await.unwrap_err();
        assert_eq!(err.message, "bad");
    }

    #[tokio::test]
    async fn test_recording_stage() {
        let stage = RecordingStage::new();
        stage.execute(&mut EventRecord::new(7)).await.unwrap();
        stage.execute(&mut EventRecord::new(3)).await.unwrap();

        assert_eq!(stage.seen(), vec![7, 3]);
    }

    #[tokio::test]
    async fn test_recording_stage_clones_share_log() {
        let stage = RecordingStage::new();
        let clone = stage.clone();

        clone.execute(&mut EventRecord::new(2)).await.unwrap();

        assert_eq!(stage.seen(), vec![2]);
    }

    #[tokio::test]
    async fn test_cancelling_stage() {
        let token = CancellationToken::new();
        let stage = CancellingStage::new(token.clone(), 1);

        stage.execute(&mut EventRecord::new(0)).await.unwrap();
        assert!(!token.is_cancelled());

        stage.execute(&mut EventRecord::new(1)).await.unwrap();
        assert!(token.is_cancelled());
    }
}
