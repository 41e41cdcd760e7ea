//! Event store: NDJSON input and output.
//!
//! One [`crate::core::EventRecord`] per line, `{"index": n, "collections": {...}}`.

mod reader;
mod writer;

pub use reader::{EventReader, SourcedEvent};
pub use writer::{EventWriter, OutputSummary};

use crate::core::EventRecord;
use crate::errors::{ConfigurationError, SkimflowError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How output files map onto input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Every retained event goes to the single output file.
    Shared,
    /// Retained events go to the output at the same position as their input.
    PerInput,
}

/// The open output files of a run.
#[derive(Debug)]
pub struct OutputSet {
    layout: OutputLayout,
    writers: Vec<EventWriter>,
}

impl OutputSet {
    /// Opens every output file.
    ///
    /// # Errors
    ///
    /// Returns `FileAccess` if any file cannot be created.
    pub async fn create(layout: OutputLayout, paths: &[PathBuf]) -> Result<Self, SkimflowError> {
        let mut writers = Vec::with_capacity(paths.len());
        for path in paths {
            writers.push(EventWriter::create(path).await?);
        }
        Ok(Self { layout, writers })
    }

    /// Writes an event read from input file `source`.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` or `FileAccess` on failure.
    pub async fn write(&mut self, source: usize, event: &EventRecord) -> Result<(), SkimflowError> {
        let slot = match self.layout {
            OutputLayout::Shared => 0,
            OutputLayout::PerInput => source,
        };
        match self.writers.get_mut(slot) {
            Some(writer) => writer.write(event).await,
            None => Err(ConfigurationError::run_config(format!(
                "no output file for input file #{source}"
            ))
            .into()),
        }
    }

    /// Closes every output file.
    ///
    /// # Errors
    ///
    /// Returns `FileAccess` if a file cannot be synced.
    pub async fn finish(self) -> Result<Vec<OutputSummary>, SkimflowError> {
        let mut summaries = Vec::with_capacity(self.writers.len());
        for writer in self.writers {
            summaries.push(writer.finish().await?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_input_routing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("a.ndjson"), dir.path().join("b.ndjson")];

        let mut outputs = OutputSet::create(OutputLayout::PerInput, &paths).await.unwrap();
        outputs.write(0, &EventRecord::new(0)).await.unwrap();
        outputs.write(1, &EventRecord::new(1)).await.unwrap();
        outputs.write(1, &EventRecord::new(2)).await.unwrap();
        let summaries = outputs.finish().await.unwrap();

        let counts: Vec<u64> = summaries.iter().map(|s| s.events).collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_shared_routing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("all.ndjson")];

        let mut outputs = OutputSet::create(OutputLayout::Shared, &paths).await.unwrap();
        outputs.write(0, &EventRecord::new(0)).await.unwrap();
        outputs.write(3, &EventRecord::new(1)).await.unwrap();
        let summaries = outputs.finish().await.unwrap();

        assert_eq!(summaries[0].events, 2);
    }
}
