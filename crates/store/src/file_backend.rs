//! File-based event store: JSON-lines, one `Event` per line.
//!
//! The CLI keeps sessions under `<config dir>/sessions/<name>.jsonl`.
//!
//! The full log is rewritten on every store, through a sibling temp file and
//! a rename, so a crash mid-write leaves the previous log intact.

use async_trait::async_trait;
use foldline_core::error::PersistenceError;
use foldline_core::event::Event;
use foldline_core::store::EventStore;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A JSONL event store at a fixed path.
pub struct FileEventStore {
    path: PathBuf,
}

impl FileEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Parse a JSONL event log.
///
/// Unlike a memory file, a corrupted event log cannot be skipped over: every
/// later state depends on every earlier event.
pub fn parse_jsonl(content: &str) -> Result<Vec<Event>, PersistenceError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Event>(line)
                .map_err(|e| PersistenceError::Load(format!("line {}: {e}", n + 1)))
        })
        .collect()
}

#[async_trait]
impl EventStore for FileEventStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn store_events(&self, events: &[Event]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PersistenceError::Storage(format!("Failed to create session directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for event in events {
            let line = serde_json::to_string(event).map_err(|e| {
                PersistenceError::Storage(format!("Failed to serialize event: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to write session file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to replace session file: {e}")))?;

        debug!(path = %self.path.display(), count = events.len(), "Event log persisted");
        Ok(())
    }

    async fn load_events(&self) -> Result<Vec<Event>, PersistenceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::Load(e.to_string())),
        };
        let events = parse_jsonl(&content)?;
        debug!(path = %self.path.display(), count = events.len(), "Event log loaded");
        Ok(events)
    }
}
