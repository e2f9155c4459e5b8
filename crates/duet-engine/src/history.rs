//! Persistent history mirror.
//!
//! Append-only JSON log of finalized exchanges, kept in a single file slot.
//! The mirror is write-only from the session's point of view: it is read
//! once on open so appends extend what is already on disk, but it is never
//! used to rebuild the live timeline.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::message::Message;

/// Default file name of the history slot.
pub const DEFAULT_HISTORY_FILE: &str = "chatbot_history.json";

/// Current schema version for the history file.
const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Error type for history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Refusing to persist pending message {0}")]
    Pending(String),
}

/// On-disk format with schema versioning.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    schema_version: u32,
    messages: Vec<Message>,
}

/// Durable mirror of completed exchanges.
#[derive(Debug)]
pub struct HistoryMirror {
    path: PathBuf,
    messages: Vec<Message>,
    degraded: bool,
}

impl HistoryMirror {
    /// Open the slot at `path`.
    ///
    /// A missing file starts an empty history. An unreadable, corrupted or
    /// newer-schema file is logged and also treated as empty; opening never
    /// fails.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let messages = match load_messages(&path) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable history file");
                Vec::new()
            }
        };
        debug!(path = %path.display(), entries = messages.len(), "Opened history");
        Self {
            path,
            messages,
            degraded: false,
        }
    }

    /// Append one finalized user/bot pair and persist.
    ///
    /// Both entries are kept in memory even when the write fails; the mirror
    /// is then flagged as degraded and the next successful append catches up.
    pub fn append_exchange(&mut self, user: Message, bot: Message) -> Result<(), HistoryError> {
        for message in [&user, &bot] {
            if message.loading {
                return Err(HistoryError::Pending(message.id.to_string()));
            }
        }

        self.messages.push(user);
        self.messages.push(bot);

        match self.persist() {
            Ok(()) => {
                self.degraded = false;
                Ok(())
            }
            Err(e) => {
                self.degraded = true;
                Err(e)
            }
        }
    }

    /// All mirrored entries in submission order.
    pub fn entries(&self) -> &[Message] {
        &self.messages
    }

    /// Number of mirrored entries.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been mirrored yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the last write failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Path of the history slot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = HistoryFile {
            schema_version: CURRENT_SCHEMA_VERSION,
            messages: self.messages.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        atomic_write(&self.path, json.as_bytes())?;
        Ok(())
    }
}

fn load_messages(path: &Path) -> Result<Vec<Message>, HistoryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: HistoryFile = serde_json::from_str(&content)?;
    if file.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(HistoryError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "unsupported schema version {} (max supported: {CURRENT_SCHEMA_VERSION})",
                file.schema_version
            ),
        )));
    }

    // Loading entries can only come from a hand-edited file.
    Ok(file.messages.into_iter().filter(|m| !m.loading).collect())
}

/// Write content atomically using temp file + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let pid = std::process::id();

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_HISTORY_FILE);
    let tmp_path = path.with_file_name(format!("{file_name}.{timestamp}.{pid}.tmp"));

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }

    result
}
