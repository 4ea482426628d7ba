//! Metadata describing a single backup and its verified status.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::id::BackupIdentifier;

/// Why a checkpoint was taken.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Scheduled,
    Manual,
}

/// Metadata persisted alongside a backup's content.
///
/// `previous_backup` and `next_backup` stitch backups into chains:
/// checkpoints are created linearly by a single writer per partition, so
/// `previous_backup` is known and correct as soon as it is determinable,
/// while `next_backup` only becomes known once a later backup exists.
/// The range index relies on that asymmetry; it is the caller's
/// responsibility, not validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    pub previous_backup: Option<BackupIdentifier>,
    pub next_backup: Option<BackupIdentifier>,
    pub snapshot_id: Option<String>,
    pub first_log_position: Option<i64>,
    pub checkpoint_position: i64,
    pub partition_count: i32,
    pub broker_version: String,
    pub checkpoint_timestamp: DateTime<Utc>,
    pub checkpoint_kind: CheckpointKind,
}

/// Lifecycle state of a backup as reported by the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatusCode {
    DoesNotExist,
    InProgress,
    Completed,
    Failed,
}

/// The verified status of one backup, as returned by status and list
/// queries against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupStatus {
    pub id: BackupIdentifier,
    pub descriptor: Option<BackupDescriptor>,
    pub code: BackupStatusCode,
    pub failure_reason: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl BackupStatus {
    /// Status reported for a backup the store knows nothing about.
    pub fn not_found(id: BackupIdentifier) -> Self {
        Self {
            id,
            descriptor: None,
            code: BackupStatusCode::DoesNotExist,
            failure_reason: None,
            created: None,
            last_modified: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.code != BackupStatusCode::DoesNotExist
    }

    /// Encode as the JSON manifest stored next to the backup content.
    pub fn to_manifest_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a stored JSON manifest.
    pub fn from_manifest_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[test]
fn manifest_json_round_trips() {
    use chrono::TimeZone;

    let status = BackupStatus {
        id: BackupIdentifier::new(1, 2, 3),
        descriptor: Some(BackupDescriptor {
            previous_backup: Some(BackupIdentifier::new(1, 2, 2)),
            next_backup: None,
            snapshot_id: Some("snapshot-3".to_owned()),
            first_log_position: Some(31),
            checkpoint_position: 42,
            partition_count: 3,
            broker_version: "8.7.0".to_owned(),
            checkpoint_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            checkpoint_kind: CheckpointKind::Scheduled,
        }),
        code: BackupStatusCode::Completed,
        failure_reason: None,
        created: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        last_modified: Some(Utc.timestamp_opt(1_700_000_100, 0).unwrap()),
    };

    let json = status.to_manifest_json().unwrap();
    let decoded = BackupStatus::from_manifest_json(&json).unwrap();

    assert_eq!(decoded, status);
}
