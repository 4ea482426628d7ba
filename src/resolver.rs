//! Restore planning on top of the range subsystem.
//!
//! Answers the operator-facing questions: which checkpoint can every
//! partition be restored to, where must replay start so no exported
//! data is lost, and is the backup chain actually unbroken. Everything
//! works off range markers and backup statuses, never backup content.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::interval::Interval;
use crate::model::BackupIdentifierWildcard;
use crate::model::BackupRange;
use crate::model::BackupStatus;
use crate::model::BackupStatusCode;
use crate::ranges;
use crate::store::BackupStore;
use crate::store::StoreError;

/// Everything needed to restore one partition: where replay must start,
/// the nominal range backing it and the verified statuses of the
/// backups involved.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRestoreInfo {
    pub partition_id: i32,
    pub safe_start: i64,
    pub range: BackupRange,
    pub backups: Vec<BackupStatus>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No backup range found for partition {partition_id}")]
    NoRange { partition_id: i32 },
    #[error("No safe start checkpoint found for partition {partition_id}")]
    NoSafeStart { partition_id: i32 },
    #[error("No common checkpoint found across all partitions")]
    NoCommonCheckpoint,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One or more partitions cannot reach the requested global checkpoint.
/// Collects every partition's failure rather than stopping at the
/// first, so an operator sees the whole picture at once.
#[derive(Debug, Error)]
#[error("Cannot restore to global checkpoint {global_checkpoint}. {}", failures.join("; "))]
pub struct ReachabilityError {
    pub global_checkpoint: i64,
    pub failures: Vec<String>,
}

/// The most recent backup created at or before `timestamp`.
pub fn find_latest_backup_before(
    timestamp: DateTime<Utc>,
    backups: &[BackupStatus],
) -> Option<&BackupStatus> {
    backups
        .iter()
        .filter(|status| status.created.is_some_and(|created| created <= timestamp))
        .max_by_key(|status| (status.created, status.id.checkpoint_id))
}

/// The latest checkpoint that does not lose exported data: the largest
/// checkpoint whose position is at or below `exported_position`.
pub fn find_safe_start_checkpoint(
    exported_position: i64,
    backups: &[BackupStatus],
) -> Option<i64> {
    backups
        .iter()
        .filter_map(|status| {
            let descriptor = status.descriptor.as_ref()?;
            (descriptor.checkpoint_position <= exported_position)
                .then_some(status.id.checkpoint_id)
        })
        .max()
}

/// The highest checkpoint id for which every partition has a backup.
pub fn compute_global_checkpoint_id(
    restore_infos: &[PartitionRestoreInfo],
) -> Result<i64, ResolveError> {
    let mut infos = restore_infos.iter();
    let first = infos.next().ok_or(ResolveError::NoCommonCheckpoint)?;
    let mut common: BTreeSet<i64> = first
        .backups
        .iter()
        .map(|status| status.id.checkpoint_id)
        .collect();
    for info in infos {
        let checkpoints: BTreeSet<i64> = info
            .backups
            .iter()
            .map(|status| status.id.checkpoint_id)
            .collect();
        common = common.intersection(&checkpoints).copied().collect();
    }
    common
        .into_iter()
        .next_back()
        .ok_or(ResolveError::NoCommonCheckpoint)
}

/// Check that every partition can actually be restored to
/// `global_checkpoint`: its safe start must not lie beyond it, its
/// nominal range must be complete and cover `[safe_start,
/// global_checkpoint]`, backups must exist in that window, and the log
/// positions of consecutive backups must join without gaps.
pub fn validate_global_checkpoint_reachability(
    global_checkpoint: i64,
    safe_start_by_partition: &BTreeMap<i32, i64>,
    backups_by_partition: &BTreeMap<i32, Vec<BackupStatus>>,
    ranges_by_partition: &BTreeMap<i32, BackupRange>,
) -> Result<(), ReachabilityError> {
    let mut failures = Vec::new();

    for (&partition_id, range) in ranges_by_partition {
        let Some(&safe_start) = safe_start_by_partition.get(&partition_id) else {
            failures.push(format!(
                "Partition {partition_id}: no safe start checkpoint known"
            ));
            continue;
        };
        if safe_start > global_checkpoint {
            failures.push(format!(
                "Partition {partition_id}: safe start checkpoint {safe_start} is beyond global checkpoint {global_checkpoint}"
            ));
            continue;
        }

        if let BackupRange::Incomplete { deleted, .. } = range {
            let ids: Vec<String> = deleted.iter().map(i64::to_string).collect();
            failures.push(format!(
                "Partition {partition_id}: has deletions [{}] in backup range [{}, {}]",
                ids.join(", "),
                range.start(),
                range.end(),
            ));
            continue;
        }

        if range.start() > safe_start {
            failures.push(format!(
                "Partition {partition_id}: backup range [{}, {}] does not cover required range [{safe_start}, {global_checkpoint}]",
                range.start(),
                range.end(),
            ));
            failures.push(format!(
                "Partition {partition_id}: first backup at checkpoint {} is after safe start {safe_start}",
                range.start(),
            ));
        }
        if range.end() < global_checkpoint {
            failures.push(format!(
                "Partition {partition_id}: last backup at checkpoint {} is before global checkpoint {global_checkpoint}",
                range.end(),
            ));
        }

        let backups = backups_by_partition
            .get(&partition_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let required = Interval::new(safe_start, global_checkpoint);
        if !backups
            .iter()
            .any(|status| required.contains(&status.id.checkpoint_id))
        {
            failures.push(format!(
                "Partition {partition_id} has no backups in range [{safe_start}, {global_checkpoint}]"
            ));
        }

        failures.extend(log_position_gaps(partition_id, backups));
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReachabilityError {
            global_checkpoint,
            failures,
        })
    }
}

/// Consecutive backups must join without a hole: each backup has to
/// start exactly one log position after the previous backup's
/// checkpoint position. Backups without a recorded first log position
/// predate that field and are skipped.
fn log_position_gaps(partition_id: i32, backups: &[BackupStatus]) -> Vec<String> {
    let mut positioned: Vec<(i64, i64, Option<i64>)> = backups
        .iter()
        .filter_map(|status| {
            let descriptor = status.descriptor.as_ref()?;
            Some((
                status.id.checkpoint_id,
                descriptor.checkpoint_position,
                descriptor.first_log_position,
            ))
        })
        .collect();
    positioned.sort_by_key(|(checkpoint_id, ..)| *checkpoint_id);

    positioned
        .windows(2)
        .filter_map(|pair| {
            let (previous_id, previous_position, _) = pair[0];
            let (checkpoint_id, _, first_log_position) = pair[1];
            let actual = first_log_position?;
            let expected = previous_position + 1;
            (actual != expected).then(|| {
                format!(
                    "Partition {partition_id}: has gap in log positions - backup {previous_id} ends at position {previous_position}, but backup {checkpoint_id} starts at position {actual} (expected {expected})"
                )
            })
        })
        .collect()
}

/// Resolves restore information per partition against a backup store.
#[derive(Debug)]
pub struct BackupRangeResolver<S> {
    store: S,
}

impl<S: BackupStore> BackupRangeResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Gather everything needed to restore one partition within the
    /// requested time interval.
    ///
    /// The returned backup list is anchored at the latest backup taken
    /// at or before `from` even when that backup precedes the safe
    /// start, so a restore always has a full snapshot to begin from.
    pub async fn get_information_per_partition(
        &self,
        partition_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        last_exported_position: i64,
    ) -> Result<PartitionRestoreInfo, ResolveError> {
        let markers = self.store.range_markers(partition_id).await?;
        let nominal_ranges = ranges::from_markers(markers);

        let mut backups: Vec<BackupStatus> = self
            .store
            .list(&BackupIdentifierWildcard::of_partition(partition_id))
            .await?
            .into_iter()
            .filter(|status| status.code == BackupStatusCode::Completed)
            .collect();
        backups.sort_by_key(|status| status.id.checkpoint_id);

        let latest = find_latest_backup_before(to, &backups)
            .ok_or(ResolveError::NoRange { partition_id })?;
        let latest_checkpoint = latest.id.checkpoint_id;
        let range = nominal_ranges
            .into_iter()
            .find(|range| range.contains(latest_checkpoint))
            .ok_or(ResolveError::NoRange { partition_id })?;

        let in_range: Vec<BackupStatus> = backups
            .into_iter()
            .filter(|status| range.contains(status.id.checkpoint_id))
            .collect();

        let safe_start = find_safe_start_checkpoint(last_exported_position, &in_range)
            .ok_or(ResolveError::NoSafeStart { partition_id })?;

        let anchor = find_latest_backup_before(from, &in_range)
            .map(|status| status.id.checkpoint_id)
            .unwrap_or_else(|| range.start());
        let backups: Vec<BackupStatus> = in_range
            .into_iter()
            .filter(|status| {
                anchor <= status.id.checkpoint_id && status.id.checkpoint_id <= latest_checkpoint
            })
            .collect();

        debug!(
            partition_id,
            safe_start,
            anchor,
            latest = latest_checkpoint,
            backups = backups.len(),
            "resolved partition restore info"
        );
        Ok(PartitionRestoreInfo {
            partition_id,
            safe_start,
            range,
            backups,
        })
    }
}
