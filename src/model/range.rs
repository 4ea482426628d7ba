//! Range value types produced by marker reconstruction and status
//! queries.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use super::descriptor::BackupStatus;

/// A nominally contiguous span of checkpoint ids, as declared by the
/// persisted markers.
///
/// "Nominal" because this only reflects what the markers claim; whether
/// every backup in the span still exists and is restorable is a separate,
/// verified question answered by [`BackupRangeStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupRange {
    /// Every checkpoint between `start` and `end` is covered.
    Complete { start: i64, end: i64 },
    /// The span is bounded but deletions punched holes into it.
    Incomplete {
        start: i64,
        end: i64,
        deleted: BTreeSet<i64>,
    },
}

impl BackupRange {
    pub fn start(&self) -> i64 {
        match self {
            Self::Complete { start, .. } | Self::Incomplete { start, .. } => *start,
        }
    }

    pub fn end(&self) -> i64 {
        match self {
            Self::Complete { end, .. } | Self::Incomplete { end, .. } => *end,
        }
    }

    pub fn contains(&self, checkpoint_id: i64) -> bool {
        self.start() <= checkpoint_id && checkpoint_id <= self.end()
    }
}

/// Effective completeness of a nominal range, after verifying the
/// backups it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupRangeStatus {
    Complete {
        start: i64,
        end: i64,
    },
    Incomplete {
        start: i64,
        end: i64,
        /// Checkpoint ids the nominal range covers but that are no
        /// longer backed by a restorable backup.
        missing: BTreeSet<i64>,
        /// Verified status of the backup at `start`.
        first: BackupStatus,
        /// Verified status of the backup at `end`.
        last: BackupStatus,
    },
}

#[test]
fn range_status_carries_missing_ids_and_endpoint_statuses() {
    use crate::model::BackupIdentifier;

    let first = BackupStatus::not_found(BackupIdentifier::new(1, 1, 1));
    let last = BackupStatus::not_found(BackupIdentifier::new(1, 1, 5));

    let status = BackupRangeStatus::Incomplete {
        start: 1,
        end: 5,
        missing: BTreeSet::from([2, 3]),
        first: first.clone(),
        last: last.clone(),
    };

    match status {
        BackupRangeStatus::Incomplete {
            missing,
            first: range_first,
            last: range_last,
            ..
        } => {
            assert_eq!(missing, BTreeSet::from([2, 3]));
            assert_eq!(range_first, first);
            assert_eq!(range_last, last);
        }
        BackupRangeStatus::Complete { .. } => panic!("expected an incomplete range status"),
    }
}

#[test]
fn range_accessors_cover_both_variants() {
    let complete = BackupRange::Complete { start: 3, end: 9 };
    assert_eq!(complete.start(), 3);
    assert_eq!(complete.end(), 9);
    assert!(complete.contains(3));
    assert!(complete.contains(9));
    assert!(!complete.contains(10));

    let incomplete = BackupRange::Incomplete {
        start: 1,
        end: 5,
        deleted: BTreeSet::from([3]),
    };
    assert_eq!(incomplete.start(), 1);
    assert_eq!(incomplete.end(), 5);
    assert!(incomplete.contains(3));
}
