//! # Durable Ledger Storage
//!
//! Newline-delimited JSON, one canonical (RFC 8785) entry per line,
//! append-only. An append is complete only after the line (including its
//! trailing `\n`) has been written and `sync_data` has returned. A failed
//! append truncates the file back to its length before the write.
//!
//! ## Incomplete tails
//!
//! A crash mid-write leaves either a final segment without a trailing
//! newline or a final line that does not parse. Both are reported as
//! `LoadedLog::incomplete_tail`; a malformed line followed by further
//! records is not a torn write and is reported as a chain integrity failure.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use govgate_core::CanonicalBytes;

use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// The result of reading durable storage.
#[derive(Debug, Clone, Default)]
pub struct LoadedLog {
    /// Parsed entries in storage order.
    pub entries: Vec<LedgerEntry>,
    /// 1-based line number of a torn final record, if any.
    pub incomplete_tail: Option<usize>,
}

/// Durable backing store for the hash chain.
pub trait LedgerStorage: Send + Sync + std::fmt::Debug {
    /// Persist one entry. Must not return until the entry is durable.
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Read every stored entry.
    fn load(&self) -> Result<LoadedLog, LedgerError>;

    /// Human-readable location, used in logs and reports.
    fn location(&self) -> String;
}

/// Parse JSONL text into entries, detecting a torn tail.
pub fn parse_jsonl(text: &str) -> Result<LoadedLog, LedgerError> {
    let mut log = LoadedLog::default();
    let terminated = text.is_empty() || text.ends_with('\n');
    let lines: Vec<(usize, &str)> = text
        .split('\n')
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let last = lines.len();
    for (pos, (line_no, line)) in lines.into_iter().enumerate() {
        let is_last = pos + 1 == last;
        if is_last && !terminated {
            log.incomplete_tail = Some(line_no);
            break;
        }
        match serde_json::from_str::<LedgerEntry>(line) {
            Ok(entry) => log.entries.push(entry),
            Err(_) if is_last => {
                log.incomplete_tail = Some(line_no);
            }
            Err(e) => {
                return Err(LedgerError::ChainIntegrity {
                    index: log.entries.len() as u64,
                    reason: format!("line {line_no} is not a valid ledger entry: {e}"),
                });
            }
        }
    }
    Ok(log)
}

/// Render an entry as one canonical JSONL line (with trailing newline).
pub fn to_jsonl_line(entry: &LedgerEntry) -> Result<String, LedgerError> {
    let mut line = CanonicalBytes::new(entry)?.to_text();
    line.push('\n');
    Ok(line)
}

// ---------------------------------------------------------------------------
// JsonlFileStorage
// ---------------------------------------------------------------------------

/// File-backed JSONL storage with a synchronous flush per append.
#[derive(Debug)]
pub struct JsonlFileStorage {
    path: PathBuf,
    file: File,
}

impl JsonlFileStorage {
    /// Open (creating if missing) the ledger file at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(LedgerError::Write)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(LedgerError::Write)?;
        Ok(Self { path, file })
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut the file back to `len` bytes after a failed append.
    fn rollback(&mut self, len: u64) {
        match self.file.set_len(len).and_then(|()| self.file.sync_data()) {
            Ok(()) => tracing::warn!(path = %self.path.display(), len, "partial ledger write rolled back"),
            Err(e) => tracing::error!(
                path = %self.path.display(),
                len,
                error = %e,
                "partial ledger write could not be rolled back"
            ),
        }
    }
}

impl LedgerStorage for JsonlFileStorage {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let line = to_jsonl_line(entry)?;
        let committed = self.file.metadata().map_err(LedgerError::Write)?.len();
        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            self.rollback(committed);
            return Err(LedgerError::Write(e));
        }
        Ok(())
    }

    fn load(&self) -> Result<LoadedLog, LedgerError> {
        let mut text = String::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut text))
            .map_err(LedgerError::Read)?;
        parse_jsonl(&text)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Non-durable storage holding JSONL text in memory.
///
/// Used for tests and ephemeral deployments. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    text: String,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with raw JSONL text (which may be corrupt).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The raw JSONL text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl LedgerStorage for MemoryStorage {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.text.push_str(&to_jsonl_line(entry)?);
        Ok(())
    }

    fn load(&self) -> Result<LoadedLog, LedgerError> {
        parse_jsonl(&self.text)
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
