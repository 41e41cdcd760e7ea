//! NDJSON event reader over one or more input files.

use crate::core::EventRecord;
use crate::errors::SkimflowError;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// An event together with the input file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedEvent {
    /// Position of the source file in the input list.
    pub source: usize,
    /// The event, with its index reassigned to the stream position.
    pub event: EventRecord,
}

struct OpenFile {
    source: usize,
    path: PathBuf,
    reader: BufReader<File>,
    line: usize,
}

/// Streams events from a list of NDJSON files, in order.
///
/// Event indices are assigned by position in the concatenated stream; any
/// `index` present in the input is ignored. Blank lines are skipped. A last
/// line without a newline terminator that fails to decode is treated as a
/// truncated write and ignored with a warning; any other undecodable line is
/// an error.
pub struct EventReader {
    files: Vec<PathBuf>,
    next_file: usize,
    current: Option<OpenFile>,
    next_index: u64,
}

impl EventReader {
    /// Creates a reader over `files`. Files are opened lazily.
    #[must_use]
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            next_file: 0,
            current: None,
            next_index: 0,
        }
    }

    /// Returns the number of events read so far.
    #[must_use]
    pub fn events_read(&self) -> u64 {
        self.next_index
    }

    /// Reads the next event, or `None` once every file is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `FileAccess` if a file cannot be opened or read, and
    /// `EventFormat` for an undecodable line.
    pub async fn next_event(&mut self) -> Result<Option<SourcedEvent>, SkimflowError> {
        loop {
            if self.current.is_none() && !self.open_next().await? {
                return Ok(None);
            }
            let Some(open) = self.current.as_mut() else {
                continue;
            };

            let mut buf = String::new();
            let read = open
                .reader
                .read_line(&mut buf)
                .await
                .map_err(|err| SkimflowError::file_access(&open.path, err))?;
            if read == 0 {
                debug!(path = %open.path.display(), lines = open.line, "Input file exhausted");
                self.current = None;
                continue;
            }
            open.line += 1;

            let terminated = buf.ends_with('\n');
            let text = buf.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<EventRecord>(text) {
                Ok(mut event) => {
                    event.index = self.next_index;
                    self.next_index += 1;
                    return Ok(Some(SourcedEvent {
                        source: open.source,
                        event,
                    }));
                }
                Err(err) if !terminated => {
                    warn!(
                        path = %open.path.display(),
                        line = open.line,
                        error = %err,
                        "Ignoring truncated final line"
                    );
                }
                Err(err) => {
                    return Err(SkimflowError::EventFormat {
                        path: open.path.clone(),
                        line: open.line,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    async fn open_next(&mut self) -> Result<bool, SkimflowError> {
        let Some(path) = self.files.get(self.next_file).cloned() else {
            return Ok(false);
        };
        let file = File::open(&path)
            .await
            .map_err(|err| SkimflowError::file_access(&path, err))?;
        debug!(path = %path.display(), source = self.next_file, "Opened input file");

        self.current = Some(OpenFile {
            source: self.next_file,
            path,
            reader: BufReader::new(file),
            line: 0,
        });
        self.next_file += 1;
        Ok(true)
    }
}

impl std::fmt::Debug for EventReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReader")
            .field("files", &self.files)
            .field("next_file", &self.next_file)
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    async fn read_all(reader: &mut EventReader) -> Vec<SourcedEvent> {
        let mut events = Vec::new();
        while let Some(event) = reader.next_event().await.unwrap() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_reads_and_reindexes_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ndjson");
        let b = dir.path().join("b.ndjson");
        write(&a, "{\"index\":99,\"collections\":{\"x\":1}}\n\n{\"collections\":{\"x\":2}}\n");
        write(&b, "{\"collections\":{\"x\":3}}\n");

        let mut reader = EventReader::new(vec![a, b]);
        let events = read_all(&mut reader).await;

        let summary: Vec<(usize, u64, serde_json::Value)> = events
            .iter()
            .map(|e| (e.source, e.event.index, e.event.get("x").cloned().unwrap()))
            .collect();
        assert_eq!(
            summary,
            vec![(0, 0, json!(1)), (0, 1, json!(2)), (1, 2, json!(3))]
        );
        assert_eq!(reader.events_read(), 3);
    }

    #[tokio::test]
    async fn test_ignores_truncated_final_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.ndjson");
        write(&path, "{\"collections\":{}}\n{\"collections\":{\"x\":");

        let mut reader = EventReader::new(vec![path]);
        let events = read_all(&mut reader).await;

        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_accepts_complete_unterminated_final_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.ndjson");
        write(&path, "{\"collections\":{}}\n{\"collections\":{}}");

        let mut reader = EventReader::new(vec![path]);
        assert_eq!(read_all(&mut reader).await.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_line_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.ndjson");
        write(&path, "{\"collections\":{}}\nnot json\n{\"collections\":{}}\n");

        let mut reader = EventReader::new(vec![path.clone()]);
        assert!(reader.next_event().await.unwrap().is_some());
        let err = reader.next_event().await.unwrap_err();

        assert!(matches!(
            err,
            SkimflowError::EventFormat { path: ref p, line: 2, .. } if *p == path
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let mut reader = EventReader::new(vec![PathBuf::from("/nonexistent/in.ndjson")]);
        let err = reader.next_event().await.unwrap_err();
        assert!(matches!(err, SkimflowError::FileAccess { .. }));
    }

    #[tokio::test]
    async fn test_empty_input_list() {
        let mut reader = EventReader::new(Vec::new());
        assert!(reader.next_event().await.unwrap().is_none());
    }
}
