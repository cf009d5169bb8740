//! Conversation log
//!
//! Append-only record of what the user said and what the assistant answered.
//! The file-backed log keeps a single JSON array and rewrites it on every
//! append, so concurrent writers race and the last one wins.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Who produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// One line of conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sender: Sender,
    pub message: String,
}

impl LogEntry {
    /// Entry for something the user said or typed
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            message: message.into(),
        }
    }

    /// Entry for an assistant answer
    #[must_use]
    pub fn ai(message: impl Into<String>) -> Self {
        Self {
            sender: Sender::Ai,
            message: message.into(),
        }
    }
}

/// Insertion-ordered conversation record
pub trait ConversationLog: Send + 'static {
    /// Append an entry
    ///
    /// # Errors
    ///
    /// Returns error if the entry cannot be persisted
    fn append(&mut self, entry: LogEntry) -> Result<()>;

    /// All entries in insertion order
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be read
    fn entries(&self) -> Result<Vec<LogEntry>>;
}

/// Log kept in memory only
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    entries: Vec<LogEntry>,
}

impl MemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationLog for MemoryLog {
    fn append(&mut self, entry: LogEntry) -> Result<()> {
        self.entries.push(entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LogEntry>> {
        Ok(self.entries.clone())
    }
}

/// Log stored as a JSON array of `{sender, message}` objects
///
/// The file is read once, on first use; later appends rewrite it from the
/// entries held in memory.
#[derive(Debug, Clone)]
pub struct JsonFileLog {
    path: PathBuf,
    cache: Option<Vec<LogEntry>>,
}

impl JsonFileLog {
    /// Open (or lazily create) the log at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: None,
        }
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<LogEntry>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "conversation log is corrupt, starting fresh"
                );
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, entries: &[LogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(entries)?)?;
        Ok(())
    }
}

impl ConversationLog for JsonFileLog {
    fn append(&mut self, entry: LogEntry) -> Result<()> {
        let mut entries = match self.cache.take() {
            Some(entries) => entries,
            None => self.read()?,
        };
        entries.push(entry);

        let written = self.write(&entries);
        tracing::trace!(
            path = %self.path.display(),
            entries = entries.len(),
            "conversation log written"
        );
        self.cache = Some(entries);
        written
    }

    fn entries(&self) -> Result<Vec<LogEntry>> {
        match &self.cache {
            Some(entries) => Ok(entries.clone()),
            None => self.read(),
        }
    }
}
