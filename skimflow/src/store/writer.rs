//! NDJSON event writer.

use crate::core::EventRecord;
use crate::errors::SkimflowError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// What was written to one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSummary {
    /// The output file.
    pub path: PathBuf,
    /// Number of events written.
    pub events: u64,
    /// Hex SHA-256 of the file content.
    pub sha256: String,
}

/// Writes retained events to one NDJSON file.
///
/// Each record is serialized to one complete line and written with a single
/// blocking `write_all` on the blocking pool. The async file type would split
/// lines larger than its internal buffer into several writes; a blocking
/// write hands the whole line to the OS at once, so the file ends on a record
/// boundary between writes.
pub struct EventWriter {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    hasher: Sha256,
    events: u64,
}

impl EventWriter {
    /// Creates (or truncates) the output file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `FileAccess` if the file cannot be created.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SkimflowError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SkimflowError::file_access(parent, err))?;
        }
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|err| SkimflowError::file_access(&path, err))?
            .into_std()
            .await;
        debug!(path = %path.display(), "Opened output file");

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
            hasher: Sha256::new(),
            events: 0,
        })
    }

    /// Returns the output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of events written so far.
    #[must_use]
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` or `FileAccess` on failure.
    pub async fn write(&mut self, event: &EventRecord) -> Result<(), SkimflowError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let line = self
            .blocking(move |file| file.write_all(&line).map(|()| line))
            .await?;

        self.hasher.update(&line);
        self.events += 1;
        Ok(())
    }

    /// Runs a file operation on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, SkimflowError>
    where
        F: FnOnce(&mut File) -> std::io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || op(&mut file.lock()))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result)
            .map_err(|err| SkimflowError::file_access(&self.path, err))
    }

    /// Syncs the file to disk and returns what was written.
    ///
    /// # Errors
    ///
    /// Returns `FileAccess` if the final sync fails.
    pub async fn finish(self) -> Result<OutputSummary, SkimflowError> {
        self.blocking(|file| file.sync_all()).await?;
        let summary = OutputSummary {
            sha256: hex::encode(self.hasher.finalize()),
            path: self.path,
            events: self.events,
        };
        debug!(path = %summary.path.display(), events = summary.events, "Closed output file");
        Ok(summary)
    }
}

impl std::fmt::Debug for EventWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("path", &self.path)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_lines_and_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.ndjson");

        let mut writer = EventWriter::create(&path).await.unwrap();
        writer
            .write(&EventRecord::new(0).with_collection("x", json!(1)))
            .await
            .unwrap();
        writer.write(&EventRecord::new(4)).await.unwrap();
        assert_eq!(writer.events(), 2);
        let summary = writer.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "{\"index\":0,\"collections\":{\"x\":1}}\n{\"index\":4,\"collections\":{}}\n"
        );
        assert_eq!(summary.events, 2);
        assert_eq!(summary.sha256, hex::encode(Sha256::digest(content.as_bytes())));
    }

    #[tokio::test]
    async fn test_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");

        let summary = EventWriter::create(&path).await.unwrap().finish().await.unwrap();

        assert_eq!(summary.events, 0);
        assert_eq!(std::fs::read(&path).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_large_record_is_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let hits: Vec<u64> = (0..1_000_000).collect();
        let big = EventRecord::new(1).with_collection("hits", json!(hits));

        let mut writer = EventWriter::create(&path).await.unwrap();
        writer.write(&EventRecord::new(0)).await.unwrap();
        writer.write(&big).await.unwrap();
        let summary = writer.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.len() > 4 * 1024 * 1024);
        assert!(content.ends_with('\n'));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let decoded: EventRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(decoded, big);
        assert_eq!(summary.sha256, hex::encode(Sha256::digest(content.as_bytes())));
    }

    #[tokio::test]
    async fn test_create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        std::fs::write(&path, "stale\n").unwrap();

        EventWriter::create(&path).await.unwrap().finish().await.unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().is_empty());
    }
}
