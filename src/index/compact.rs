//! A compact, file-backed index of backups for one partition.
//!
//! The reconciliation path needs a cheap local answer to "which backups
//! do we already know about, and where do they sit in the log" without
//! re-listing the remote store. This index keeps fixed-size entries
//! sorted by checkpoint id in a single preallocated file:
//!
//! ```text
//! version: i32 (big endian)
//! entry count: i32 (big endian)
//! entries: entry count * 24 bytes, sorted by checkpoint id
//! zero-filled preallocated space
//! ```
//!
//! The zero-filled tail doubles as a corruption tripwire: any non-zero
//! byte after the last entry means a writer died mid-update or the file
//! was tampered with, and opening reports exactly how far the intact
//! prefix reaches.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

const VERSION: i32 = 1;
const HEADER_LEN: u64 = 8;
const ENTRY_LEN: usize = 24;
const MIN_CAPACITY: usize = 64;

/// One indexed backup: its checkpoint id and the log positions needed
/// for contiguity checks during restore planning.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IndexedBackup {
    pub checkpoint_id: i64,
    pub first_log_position: i64,
    pub checkpoint_position: i64,
}

impl IndexedBackup {
    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.checkpoint_id.to_be_bytes());
        buf.extend_from_slice(&self.first_log_position.to_be_bytes());
        buf.extend_from_slice(&self.checkpoint_position.to_be_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        let read_i64 =
            |offset: usize| i64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        Self {
            checkpoint_id: read_i64(0),
            first_log_position: read_i64(8),
            checkpoint_position: read_i64(16),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompactIndexError {
    #[error("Unsupported backup index version: {0}")]
    UnsupportedVersion(i32),
    #[error("Corrupt backup index: negative number of entries: {0}")]
    NegativeEntryCount(i32),
    #[error("Corrupt backup index: file too small for header ({size} bytes)")]
    MissingHeader { size: u64 },
    #[error("Corrupt backup index: expected size for {entries} entries, but file is too small ({size} bytes)")]
    Truncated { entries: i32, size: u64 },
    #[error(
        "Corrupt backup index: non-zero bytes found at {offset} {}",
        match last_valid {
            Some(entry) => format!("after last valid entry {}", entry.checkpoint_id),
            None => "and no valid entries found".to_owned(),
        }
    )]
    TrailingGarbage {
        offset: u64,
        /// Last entry that decoded cleanly before the garbage, usable
        /// for partial recovery.
        last_valid: Option<IndexedBackup>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Sorted on-disk index of [`IndexedBackup`] entries.
pub struct CompactBackupIndex {
    file: File,
    path: PathBuf,
    entries: Vec<IndexedBackup>,
    /// Entry slots the file currently has room for.
    capacity: usize,
}

impl std::fmt::Debug for CompactBackupIndex {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("CompactBackupIndex")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl CompactBackupIndex {
    /// Open an index file, creating and preallocating it if absent.
    ///
    /// A leftover temporary file from an interrupted rewrite is removed
    /// first.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CompactIndexError> {
        let path = path.as_ref().to_path_buf();

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!("{file_name}.tmp"));
        match fs::remove_file(&tmp) {
            Ok(()) => debug!(path = %tmp.display(), "removed leftover temporary index file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if !path.exists() {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?;
            file.write_all(&VERSION.to_be_bytes())?;
            file.write_all(&0i32.to_be_bytes())?;
            file.set_len(HEADER_LEN + (MIN_CAPACITY * ENTRY_LEN) as u64)?;
            file.sync_all()?;
            return Ok(Self {
                file,
                path,
                entries: Vec::new(),
                capacity: MIN_CAPACITY,
            });
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let size = bytes.len() as u64;
        if size < HEADER_LEN {
            return Err(CompactIndexError::MissingHeader { size });
        }

        let version = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if version != VERSION {
            return Err(CompactIndexError::UnsupportedVersion(version));
        }
        let count = i32::from_be_bytes(bytes[4..8].try_into().unwrap());
        if count < 0 {
            return Err(CompactIndexError::NegativeEntryCount(count));
        }
        let data_end = HEADER_LEN as usize + count as usize * ENTRY_LEN;
        if bytes.len() < data_end {
            return Err(CompactIndexError::Truncated {
                entries: count,
                size,
            });
        }

        let entries: Vec<IndexedBackup> = bytes[HEADER_LEN as usize..data_end]
            .chunks_exact(ENTRY_LEN)
            .map(IndexedBackup::read_from)
            .collect();

        if let Some(garbage) = bytes[data_end..].iter().position(|byte| *byte != 0) {
            return Err(CompactIndexError::TrailingGarbage {
                offset: (data_end + garbage) as u64,
                last_valid: entries.last().copied(),
            });
        }

        let capacity = (bytes.len() - HEADER_LEN as usize) / ENTRY_LEN;
        Ok(Self {
            file,
            path,
            entries,
            capacity,
        })
    }

    /// Insert a backup, keeping entries sorted by checkpoint id.
    ///
    /// An entry with the same checkpoint id already present wins; the
    /// new one is discarded.
    pub fn add(&mut self, backup: IndexedBackup) -> Result<(), CompactIndexError> {
        match self
            .entries
            .binary_search_by_key(&backup.checkpoint_id, |entry| entry.checkpoint_id)
        {
            Ok(_) => Ok(()),
            Err(position) => {
                let previous_len = self.entries.len();
                self.entries.insert(position, backup);
                self.persist(previous_len)
            }
        }
    }

    /// Remove the entry for a checkpoint id. No-op if absent.
    pub fn remove(&mut self, checkpoint_id: i64) -> Result<(), CompactIndexError> {
        match self
            .entries
            .binary_search_by_key(&checkpoint_id, |entry| entry.checkpoint_id)
        {
            Ok(position) => {
                let previous_len = self.entries.len();
                self.entries.remove(position);
                self.persist(previous_len)
            }
            Err(_) => Ok(()),
        }
    }

    /// Binary search for one checkpoint id.
    pub fn by_checkpoint_id(&self, checkpoint_id: i64) -> Option<IndexedBackup> {
        self.entries
            .binary_search_by_key(&checkpoint_id, |entry| entry.checkpoint_id)
            .ok()
            .map(|position| self.entries[position])
    }

    /// All entries in checkpoint order, as a snapshot: mutations after
    /// this call do not show up in the returned iterator.
    pub fn all(&self) -> impl Iterator<Item = IndexedBackup> {
        self.entries.clone().into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Force written entries to durable storage.
    pub fn flush(&mut self) -> Result<(), CompactIndexError> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Rewrite header and entries. The vacated slots of a shrinking
    /// update are zeroed so the preallocated tail stays a reliable
    /// corruption tripwire.
    fn persist(&mut self, previous_len: usize) -> Result<(), CompactIndexError> {
        if self.entries.len() > self.capacity {
            self.capacity = (self.capacity * 2).max(self.entries.len());
            self.file
                .set_len(HEADER_LEN + (self.capacity * ENTRY_LEN) as u64)?;
        }

        let mut buf = Vec::with_capacity(HEADER_LEN as usize + self.entries.len() * ENTRY_LEN);
        buf.extend_from_slice(&VERSION.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as i32).to_be_bytes());
        for entry in &self.entries {
            entry.write_to(&mut buf);
        }
        let vacated = previous_len.saturating_sub(self.entries.len());
        buf.resize(buf.len() + vacated * ENTRY_LEN, 0);

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }
}
