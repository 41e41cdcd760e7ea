//! Event fixtures for run tests.

use std::io::Write;
use std::path::Path;

use crate::core::EventRecord;

/// Builds `count` events whose `energies` collection is `[i, 2i]`.
#[must_use]
pub fn numbered_events(count: u64) -> Vec<EventRecord> {
    (0..count)
        .map(|i| {
            EventRecord::new(i).with_collection("energies", serde_json::json!([i, 2 * i]))
        })
        .collect()
}

/// Writes events to `path` as NDJSON, one record per line.
///
/// # Errors
///
/// Returns any I/O or serialization error.
pub fn write_events(path: &Path, events: &[EventRecord]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for event in events {
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
    }
    file.flush()
}

/// Reads the `index` field of every line in an NDJSON file.
///
/// # Errors
///
/// Returns any I/O or decoding error.
pub fn read_indices(path: &Path) -> std::io::Result<Vec<u64>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .map(|line| {
            serde_json::from_str::<EventRecord>(line)
                .map(|event| event.index)
                .map_err(std::io::Error::from)
        })
        .collect()
}
