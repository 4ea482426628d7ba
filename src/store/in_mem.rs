//! In-memory implementation of the backup store.
//!
//! Backs resolver and reconciliation tests, and serves embedders that
//! want the full store surface without remote storage. All state lives
//! behind one async mutex; no lock is ever held across a store I/O
//! await point.

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::Mutex;

use crate::model::BackupIdentifier;
use crate::model::BackupIdentifierWildcard;
use crate::model::BackupRangeMarker;
use crate::model::BackupStatus;
use crate::model::BackupStatusCode;

use super::Backup;
use super::BackupStore;
use super::StoreError;

#[derive(Debug, Clone)]
struct StoredBackup {
    backup: Backup,
    code: BackupStatusCode,
    failure_reason: Option<String>,
}

impl StoredBackup {
    fn status(&self) -> BackupStatus {
        let timestamp = self.backup.descriptor.checkpoint_timestamp;
        BackupStatus {
            id: self.backup.id,
            descriptor: Some(self.backup.descriptor.clone()),
            code: self.code,
            failure_reason: self.failure_reason.clone(),
            created: Some(timestamp),
            last_modified: Some(timestamp),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    backups: HashMap<BackupIdentifier, StoredBackup>,
    markers: HashMap<i32, Vec<BackupRangeMarker>>,
}

/// A [`BackupStore`] keeping everything in process memory.
#[derive(Debug, Default)]
pub struct InMemBackupStore {
    state: Mutex<State>,
}

impl InMemBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackupStore for InMemBackupStore {
    async fn save(&self, backup: Backup) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.backups.insert(
            backup.id,
            StoredBackup {
                backup,
                code: BackupStatusCode::Completed,
                failure_reason: None,
            },
        );
        Ok(())
    }

    async fn get_status(&self, id: BackupIdentifier) -> Result<BackupStatus, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .backups
            .get(&id)
            .map(StoredBackup::status)
            .unwrap_or_else(|| BackupStatus::not_found(id)))
    }

    async fn list(
        &self,
        wildcard: &BackupIdentifierWildcard,
    ) -> Result<Vec<BackupStatus>, StoreError> {
        let state = self.state.lock().await;
        let mut statuses: Vec<_> = state
            .backups
            .values()
            .filter(|stored| wildcard.matches(&stored.backup.id))
            .map(StoredBackup::status)
            .collect();
        statuses.sort_by_key(|status| status.id);
        Ok(statuses)
    }

    async fn delete(&self, id: BackupIdentifier) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.backups.remove(&id);
        Ok(())
    }

    async fn restore(
        &self,
        id: BackupIdentifier,
        _target_dir: &Path,
    ) -> Result<Backup, StoreError> {
        let state = self.state.lock().await;
        state
            .backups
            .get(&id)
            .map(|stored| stored.backup.clone())
            .ok_or(StoreError::NotFound { id })
    }

    async fn mark_failed(
        &self,
        id: BackupIdentifier,
        reason: &str,
    ) -> Result<BackupStatusCode, StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .backups
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        stored.code = BackupStatusCode::Failed;
        stored.failure_reason = Some(reason.to_owned());
        Ok(BackupStatusCode::Failed)
    }

    async fn range_markers(
        &self,
        partition_id: i32,
    ) -> Result<Vec<BackupRangeMarker>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .markers
            .get(&partition_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn store_range_marker(
        &self,
        partition_id: i32,
        marker: BackupRangeMarker,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.markers.entry(partition_id).or_default().push(marker);
        Ok(())
    }

    async fn delete_range_marker(
        &self,
        partition_id: i32,
        marker: BackupRangeMarker,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(markers) = state.markers.get_mut(&partition_id) {
            markers.retain(|existing| *existing != marker);
        }
        Ok(())
    }
}
