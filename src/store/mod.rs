//! The backup store abstraction.
//!
//! Remote store implementations (object storage, shared filesystems)
//! live outside this crate; this module defines the interface the range
//! subsystem consumes plus an in-memory implementation used as a test
//! double and for embedders that keep everything local.
//!
//! Store operations are asynchronous and may be retried by the caller.
//! Range index updates must only happen after the corresponding store
//! operation is durably confirmed, never before.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::model::BackupDescriptor;
use crate::model::BackupIdentifier;
use crate::model::BackupIdentifierWildcard;
use crate::model::BackupRangeMarker;
use crate::model::BackupStatus;
use crate::model::BackupStatusCode;

pub(crate) mod in_mem;

pub use in_mem::InMemBackupStore;

/// A set of backup content files, keyed by their logical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFileSet(BTreeMap<String, PathBuf>);

impl NamedFileSet {
    pub fn new(files: BTreeMap<String, PathBuf>) -> Self {
        Self(files)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.0.get(name).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One complete backup as handed to the store: identity, metadata and
/// the snapshot/segment files that make up its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub id: BackupIdentifier,
    pub descriptor: BackupDescriptor,
    pub snapshot: NamedFileSet,
    pub segments: NamedFileSet,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backup {id} does not exist in the store")]
    NotFound { id: BackupIdentifier },
    #[error("backup store i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent storage for backups and their range markers.
///
/// Status queries report absence through
/// [`BackupStatusCode::DoesNotExist`] rather than an error, since "not
/// there" is an expected answer during reconciliation.
#[allow(async_fn_in_trait)]
pub trait BackupStore {
    /// Persist a backup. Overwrites any previous backup with the same
    /// identifier.
    async fn save(&self, backup: Backup) -> Result<(), StoreError>;

    /// The verified status of one backup.
    async fn get_status(&self, id: BackupIdentifier) -> Result<BackupStatus, StoreError>;

    /// Statuses of all backups matching the wildcard.
    async fn list(
        &self,
        wildcard: &BackupIdentifierWildcard,
    ) -> Result<Vec<BackupStatus>, StoreError>;

    /// Delete a backup's content and manifest. Deleting an absent
    /// backup succeeds.
    async fn delete(&self, id: BackupIdentifier) -> Result<(), StoreError>;

    /// Fetch a backup's content into `target_dir` and return it.
    async fn restore(&self, id: BackupIdentifier, target_dir: &Path)
        -> Result<Backup, StoreError>;

    /// Mark an in-progress backup as failed, recording the reason.
    async fn mark_failed(
        &self,
        id: BackupIdentifier,
        reason: &str,
    ) -> Result<BackupStatusCode, StoreError>;

    /// All range markers persisted for one partition, unordered.
    async fn range_markers(&self, partition_id: i32)
        -> Result<Vec<BackupRangeMarker>, StoreError>;

    /// Persist a range marker for one partition.
    async fn store_range_marker(
        &self,
        partition_id: i32,
        marker: BackupRangeMarker,
    ) -> Result<(), StoreError>;

    /// Remove a range marker. Removing an absent marker succeeds.
    async fn delete_range_marker(
        &self,
        partition_id: i32,
        marker: BackupRangeMarker,
    ) -> Result<(), StoreError>;
}
