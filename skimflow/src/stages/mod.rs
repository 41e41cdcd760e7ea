//! Stage trait and implementations.
//!
//! Stages are the fundamental units of work in a skimflow pipeline. A stage is
//! constructed by a factory, configured once from its [`ParameterBag`], and then
//! executed once per event.

pub mod builtin;

use crate::core::{EventRecord, Verdict};
use crate::errors::StageFailure;
use crate::params::{ParameterBag, ParameterError};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// `configure` is called exactly once before the first event. Required
/// parameters must be read there so that a missing key is reported before any
/// event is processed. After configuration the stage is shared immutably
/// between events, which may be processed concurrently.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Reads the stage's parameters.
    fn configure(&mut self, params: &ParameterBag) -> Result<(), ParameterError>;

    /// Processes one event.
    ///
    /// # Returns
    ///
    /// `Verdict::Proceed` for stages with no opinion on retention, or
    /// `Verdict::Vote` for stages that take part in the skim decision.
    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure>;
}

/// Factory function type for creating unconfigured stages.
pub type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// A simple function-based stage with no parameters.
pub struct FnStage<F>
where
    F: Fn(&mut EventRecord) -> Result<Verdict, StageFailure> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut EventRecord) -> Result<Verdict, StageFailure> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut EventRecord) -> Result<Verdict, StageFailure> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut EventRecord) -> Result<Verdict, StageFailure> + Send + Sync,
{
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        (self.func)(event)
    }
}

/// A no-op stage.
#[derive(Debug, Clone, Default)]
pub struct NoOpStage;

#[async_trait]
impl Stage for NoOpStage {
    fn configure(&mut self, _params: &ParameterBag) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn execute(&self, _event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        Ok(Verdict::Proceed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("mark", |event: &mut EventRecord| {
            event.put("marked", serde_json::json!(true));
            Ok(Verdict::Vote(true))
        });

        let mut event = EventRecord::new(0);
        let verdict = stage.execute(&mut event).await.unwrap();

        assert_eq!(verdict, Verdict::Vote(true));
        assert_eq!(event.get("marked"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let mut stage = NoOpStage;
        stage.configure(&ParameterBag::new()).unwrap();

        let mut event = EventRecord::new(0);
        assert_eq!(stage.execute(&mut event).await.unwrap(), Verdict::Proceed);
        assert!(event.collections.is_empty());
    }
}
