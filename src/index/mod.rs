//! The in-memory index of contiguous backup ranges.
//!
//! One [`RangeIndex`] instance tracks one partition. The backup
//! management layer inserts a backup after its remote upload is durably
//! confirmed and removes it after a confirmed delete; the index folds
//! those point updates into maximal gap-free ranges, merging neighbours
//! on insert and splitting on interior removal.
//!
//! The index is a plain synchronous structure with no interior locking.
//! Checkpoints for a partition are produced by a single writer, so
//! confining each instance to that writer (or an external mutex) is the
//! expected usage.

use std::collections::BTreeMap;
use std::fmt::Display;

use thiserror::Error;
use tracing::debug;

use crate::model::BackupDescriptor;
use crate::model::BackupIdentifier;

pub mod compact;

/// A maximal run of backups known, by direct descriptor linkage, to have
/// no gaps.
///
/// Immutable: merge and split operations replace ranges rather than
/// mutating them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Range {
    first: BackupIdentifier,
    last: BackupIdentifier,
}

impl Range {
    fn new(first: BackupIdentifier, last: BackupIdentifier) -> Self {
        debug_assert!(first.checkpoint_id <= last.checkpoint_id);
        Self { first, last }
    }

    pub fn first_backup(&self) -> BackupIdentifier {
        self.first
    }

    pub fn last_backup(&self) -> BackupIdentifier {
        self.last
    }

    pub fn contains(&self, checkpoint_id: i64) -> bool {
        self.first.checkpoint_id <= checkpoint_id && checkpoint_id <= self.last.checkpoint_id
    }
}

impl Display for Range {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "[{}, {}]",
            self.first.checkpoint_id, self.last.checkpoint_id
        )
    }
}

/// A descriptor contradicted what the index already knows. The failed
/// operation did not modify the index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeIndexError {
    #[error("descriptor links for backup {id} do not bracket it: previous/next span {claimed} is inverted")]
    InvertedLinks { id: BackupIdentifier, claimed: Range },
    #[error("backup {id} is tracked in {tracked} but its descriptor claims the wider span {claimed}")]
    ConflictingSpan {
        id: BackupIdentifier,
        tracked: Range,
        claimed: Range,
    },
    #[error("cannot remove backup {id}: it is the only backup of {tracked} but its descriptor still links to a neighbour")]
    SingletonWithLinks { id: BackupIdentifier, tracked: Range },
    #[error("cannot remove backup {id} from {tracked}: its descriptor is missing the {side} link")]
    MissingLink {
        id: BackupIdentifier,
        tracked: Range,
        side: &'static str,
    },
    #[error("cannot remove backup {id} from {tracked}: linked {side} backup {linked} is inconsistent with the range")]
    LinkOutsideRange {
        id: BackupIdentifier,
        tracked: Range,
        side: &'static str,
        linked: BackupIdentifier,
    },
}

/// Disjoint contiguous ranges of backups, indexed both by first and by
/// last backup.
///
/// Invariants: ranges never overlap and are never adjacent (adjacent
/// ranges are merged eagerly), and every tracked backup belongs to
/// exactly one range. Both orderings always hold the same range set;
/// they are only ever mutated together.
#[derive(Debug, Default)]
pub struct RangeIndex {
    by_first: BTreeMap<i64, Range>,
    by_last: BTreeMap<i64, Range>,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly persisted backup.
    ///
    /// The descriptor's `previous_backup`, when present, is trusted to
    /// be correct; `next_backup` is usually still unknown for a fresh
    /// backup. Singleton ranges are allowed so that stores tracking
    /// disjoint partial knowledge can be merged later.
    ///
    /// Re-adding a backup with an identical descriptor is a no-op, as is
    /// a descriptor claiming strictly less than the index already knows.
    /// A descriptor claiming a span that extends outside the range
    /// already containing the backup is a data-integrity error.
    pub fn add(
        &mut self,
        id: BackupIdentifier,
        descriptor: &BackupDescriptor,
    ) -> Result<(), RangeIndexError> {
        let first = descriptor.previous_backup.unwrap_or(id);
        let last = descriptor.next_backup.unwrap_or(id);
        if first.checkpoint_id > last.checkpoint_id {
            return Err(RangeIndexError::InvertedLinks {
                id,
                claimed: Range { first, last },
            });
        }
        let added = Range::new(first, last);

        if let Some(tracked) = self.lookup(id.checkpoint_id).copied() {
            if tracked == added {
                return Ok(());
            }
            if added.first.checkpoint_id < tracked.first.checkpoint_id
                || added.last.checkpoint_id > tracked.last.checkpoint_id
            {
                return Err(RangeIndexError::ConflictingSpan {
                    id,
                    tracked,
                    claimed: added,
                });
            }
            // The tracked range subsumes the claimed span.
            return Ok(());
        }

        let left = self
            .by_last
            .range(..=added.first.checkpoint_id)
            .next_back()
            .map(|(_, range)| *range)
            .filter(|range| range.last == added.first);
        let right = self
            .by_first
            .range(added.last.checkpoint_id..)
            .next()
            .map(|(_, range)| *range)
            .filter(|range| range.first == added.last);

        match (left, right) {
            (Some(left), Some(right)) => {
                let merged = Range::new(left.first, right.last);
                debug!(%left, %right, %merged, "merging adjacent backup ranges");
                self.delete_range(&left);
                self.delete_range(&right);
                self.insert_range(merged);
            }
            (Some(left), None) => {
                self.delete_range(&left);
                self.insert_range(Range::new(left.first, added.last));
            }
            (None, Some(right)) => {
                self.delete_range(&right);
                self.insert_range(Range::new(added.first, right.last));
            }
            (None, None) => self.insert_range(added),
        }
        Ok(())
    }

    /// Stop tracking a deleted backup.
    ///
    /// Unlike [`RangeIndex::add`], removal trusts both descriptor links
    /// and validates them against the containing range: removing the
    /// first, last or an interior backup shrinks or splits the range at
    /// the linked neighbours. Removing an untracked backup is a no-op.
    pub fn remove(
        &mut self,
        id: BackupIdentifier,
        descriptor: &BackupDescriptor,
    ) -> Result<(), RangeIndexError> {
        let Some(tracked) = self.lookup(id.checkpoint_id).copied() else {
            return Ok(());
        };
        let checkpoint_id = id.checkpoint_id;
        let is_first = tracked.first.checkpoint_id == checkpoint_id;
        let is_last = tracked.last.checkpoint_id == checkpoint_id;

        if is_first && is_last {
            if descriptor.previous_backup.is_some() || descriptor.next_backup.is_some() {
                return Err(RangeIndexError::SingletonWithLinks { id, tracked });
            }
            self.delete_range(&tracked);
        } else if is_first {
            let next = self.linked_next(id, &tracked, descriptor)?;
            self.delete_range(&tracked);
            self.insert_range(Range::new(next, tracked.last));
        } else if is_last {
            let previous = self.linked_previous(id, &tracked, descriptor)?;
            self.delete_range(&tracked);
            self.insert_range(Range::new(tracked.first, previous));
        } else {
            let previous = self.linked_previous(id, &tracked, descriptor)?;
            let next = self.linked_next(id, &tracked, descriptor)?;
            debug!(range = %tracked, checkpoint_id, "splitting backup range");
            self.delete_range(&tracked);
            self.insert_range(Range::new(tracked.first, previous));
            self.insert_range(Range::new(next, tracked.last));
        }
        Ok(())
    }

    /// The range containing the given checkpoint, if any.
    pub fn lookup(&self, checkpoint_id: i64) -> Option<&Range> {
        self.by_first
            .range(..=checkpoint_id)
            .next_back()
            .map(|(_, range)| range)
            .filter(|range| range.contains(checkpoint_id))
    }

    /// All ranges, oldest first. Useful for retention and cleanup.
    pub fn ascending_ranges(&self) -> impl Iterator<Item = &Range> + '_ {
        self.by_first.values()
    }

    /// All ranges, most recent first. Useful for restore planning, where
    /// the best candidate is the newest complete range.
    pub fn descending_ranges(&self) -> impl Iterator<Item = &Range> + '_ {
        self.by_last.values().rev()
    }

    pub fn len(&self) -> usize {
        self.by_first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_first.is_empty()
    }

    fn linked_previous(
        &self,
        id: BackupIdentifier,
        tracked: &Range,
        descriptor: &BackupDescriptor,
    ) -> Result<BackupIdentifier, RangeIndexError> {
        let previous = descriptor
            .previous_backup
            .ok_or(RangeIndexError::MissingLink {
                id,
                tracked: *tracked,
                side: "previous",
            })?;
        if previous.checkpoint_id < tracked.first.checkpoint_id
            || previous.checkpoint_id >= id.checkpoint_id
        {
            return Err(RangeIndexError::LinkOutsideRange {
                id,
                tracked: *tracked,
                side: "previous",
                linked: previous,
            });
        }
        Ok(previous)
    }

    fn linked_next(
        &self,
        id: BackupIdentifier,
        tracked: &Range,
        descriptor: &BackupDescriptor,
    ) -> Result<BackupIdentifier, RangeIndexError> {
        let next = descriptor.next_backup.ok_or(RangeIndexError::MissingLink {
            id,
            tracked: *tracked,
            side: "next",
        })?;
        if next.checkpoint_id > tracked.last.checkpoint_id
            || next.checkpoint_id <= id.checkpoint_id
        {
            return Err(RangeIndexError::LinkOutsideRange {
                id,
                tracked: *tracked,
                side: "next",
                linked: next,
            });
        }
        Ok(next)
    }

    /// Both orderings change together or not at all; all validation must
    /// happen before the first call to either of these.
    fn insert_range(&mut self, range: Range) {
        self.by_first.insert(range.first.checkpoint_id, range);
        self.by_last.insert(range.last.checkpoint_id, range);
    }

    fn delete_range(&mut self, range: &Range) {
        self.by_first.remove(&range.first.checkpoint_id);
        self.by_last.remove(&range.last.checkpoint_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::model::CheckpointKind;

    fn id(checkpoint_id: i64) -> BackupIdentifier {
        BackupIdentifier::new(1, 1, checkpoint_id)
    }

    fn descriptor(previous: Option<i64>, next: Option<i64>) -> BackupDescriptor {
        BackupDescriptor {
            previous_backup: previous.map(id),
            next_backup: next.map(id),
            snapshot_id: None,
            first_log_position: None,
            checkpoint_position: 0,
            partition_count: 1,
            broker_version: "8.7.0".to_owned(),
            checkpoint_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            checkpoint_kind: CheckpointKind::Scheduled,
        }
    }

    fn spans(index: &RangeIndex) -> Vec<(i64, i64)> {
        index
            .ascending_ranges()
            .map(|range| {
                (
                    range.first_backup().checkpoint_id,
                    range.last_backup().checkpoint_id,
                )
            })
            .collect()
    }

    #[test]
    fn sequential_chain_collapses_into_one_range() {
        let mut index = RangeIndex::new();

        for checkpoint in 1..=20 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        assert_eq!(spans(&index), vec![(1, 20)]);
    }

    #[test]
    fn unlinked_chains_stay_disjoint() {
        let mut index = RangeIndex::new();

        for checkpoint in [1, 2, 3] {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }
        for checkpoint in [7, 8, 9] {
            let previous = (checkpoint > 7).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        assert_eq!(spans(&index), vec![(1, 3), (7, 9)]);
        assert_eq!(index.lookup(5), None);
        assert!(index.lookup(2).is_some());
        assert!(index.lookup(9).is_some());
    }

    #[test]
    fn insert_between_two_ranges_merges_both() {
        let mut index = RangeIndex::new();
        index.add(id(1), &descriptor(None, None)).unwrap();
        index.add(id(2), &descriptor(Some(1), None)).unwrap();
        index.add(id(4), &descriptor(None, None)).unwrap();
        index.add(id(5), &descriptor(Some(4), None)).unwrap();

        index.add(id(3), &descriptor(Some(2), Some(4))).unwrap();

        assert_eq!(spans(&index), vec![(1, 5)]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn singleton_ranges_are_tracked_and_merged_later() {
        // Two stores with disjoint partial knowledge may each contribute
        // single backups that only become linkable afterwards.
        let mut index = RangeIndex::new();
        index.add(id(1), &descriptor(None, None)).unwrap();
        index.add(id(3), &descriptor(None, None)).unwrap();

        assert_eq!(spans(&index), vec![(1, 1), (3, 3)]);

        index.add(id(2), &descriptor(Some(1), Some(3))).unwrap();

        assert_eq!(spans(&index), vec![(1, 3)]);
    }

    #[test]
    fn interior_removal_splits_the_range() {
        let mut index = RangeIndex::new();
        for checkpoint in 1..=5 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        index.remove(id(3), &descriptor(Some(2), Some(4))).unwrap();

        assert_eq!(spans(&index), vec![(1, 2), (4, 5)]);
        assert_eq!(index.lookup(3), None);
    }

    #[test]
    fn removing_the_first_backup_shrinks_from_below() {
        let mut index = RangeIndex::new();
        for checkpoint in 1..=3 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        index.remove(id(1), &descriptor(None, Some(2))).unwrap();

        assert_eq!(spans(&index), vec![(2, 3)]);
    }

    #[test]
    fn removing_the_last_backup_shrinks_from_above() {
        let mut index = RangeIndex::new();
        for checkpoint in 1..=3 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        index.remove(id(3), &descriptor(Some(2), None)).unwrap();

        assert_eq!(spans(&index), vec![(1, 2)]);
    }

    #[test]
    fn removing_a_singleton_deletes_the_range() {
        let mut index = RangeIndex::new();
        index.add(id(5), &descriptor(None, None)).unwrap();

        index.remove(id(5), &descriptor(None, None)).unwrap();

        assert!(index.is_empty());
    }

    #[test]
    fn removing_an_untracked_backup_is_a_noop() {
        let mut index = RangeIndex::new();
        index.add(id(1), &descriptor(None, None)).unwrap();

        index.remove(id(9), &descriptor(Some(8), None)).unwrap();

        assert_eq!(spans(&index), vec![(1, 1)]);
    }

    #[test]
    fn add_is_idempotent() {
        let mut index = RangeIndex::new();
        index.add(id(1), &descriptor(None, None)).unwrap();
        index.add(id(2), &descriptor(Some(1), None)).unwrap();

        index.add(id(2), &descriptor(Some(1), None)).unwrap();

        assert_eq!(spans(&index), vec![(1, 2)]);
    }

    #[test]
    fn remove_inverts_add() {
        let mut index = RangeIndex::new();
        for checkpoint in 1..=3 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }
        let before = spans(&index);

        index.add(id(4), &descriptor(Some(3), None)).unwrap();
        index.remove(id(4), &descriptor(Some(3), None)).unwrap();

        assert_eq!(spans(&index), before);
    }

    #[test]
    fn subset_claim_leaves_the_index_unchanged() {
        let mut index = RangeIndex::new();
        for checkpoint in 1..=5 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        index.add(id(3), &descriptor(Some(2), Some(4))).unwrap();

        assert_eq!(spans(&index), vec![(1, 5)]);
    }

    #[test]
    fn wider_claim_than_tracked_is_rejected_without_mutation() {
        let mut index = RangeIndex::new();
        index.add(id(2), &descriptor(None, None)).unwrap();
        index.add(id(3), &descriptor(Some(2), None)).unwrap();

        let err = index.add(id(3), &descriptor(Some(1), None)).unwrap_err();

        assert!(matches!(err, RangeIndexError::ConflictingSpan { .. }));
        assert_eq!(spans(&index), vec![(2, 3)]);
    }

    #[test]
    fn inverted_links_are_rejected() {
        let mut index = RangeIndex::new();

        let err = index.add(id(3), &descriptor(Some(5), None)).unwrap_err();

        assert!(matches!(err, RangeIndexError::InvertedLinks { .. }));
        assert!(index.is_empty());
    }

    #[test]
    fn removing_a_singleton_with_links_is_rejected() {
        let mut index = RangeIndex::new();
        index.add(id(5), &descriptor(None, None)).unwrap();

        let err = index.remove(id(5), &descriptor(Some(4), None)).unwrap_err();

        assert!(matches!(err, RangeIndexError::SingletonWithLinks { .. }));
        assert_eq!(spans(&index), vec![(5, 5)]);
    }

    #[test]
    fn removing_the_first_backup_without_a_next_link_is_rejected() {
        let mut index = RangeIndex::new();
        index.add(id(1), &descriptor(None, None)).unwrap();
        index.add(id(2), &descriptor(Some(1), None)).unwrap();

        let err = index.remove(id(1), &descriptor(None, None)).unwrap_err();

        assert!(matches!(
            err,
            RangeIndexError::MissingLink { side: "next", .. }
        ));
        assert_eq!(spans(&index), vec![(1, 2)]);
    }

    #[test]
    fn removal_link_beyond_the_range_is_rejected_without_mutation() {
        let mut index = RangeIndex::new();
        for checkpoint in 1..=3 {
            let previous = (checkpoint > 1).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        let err = index.remove(id(1), &descriptor(None, Some(9))).unwrap_err();

        assert!(matches!(
            err,
            RangeIndexError::LinkOutsideRange { side: "next", .. }
        ));
        assert_eq!(spans(&index), vec![(1, 3)]);
    }

    #[test]
    fn interior_removal_with_bad_previous_link_is_rejected_without_mutation() {
        let mut index = RangeIndex::new();
        for checkpoint in 5..=9 {
            let previous = (checkpoint > 5).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        let err = index
            .remove(id(7), &descriptor(Some(3), Some(8)))
            .unwrap_err();

        assert!(matches!(
            err,
            RangeIndexError::LinkOutsideRange {
                side: "previous",
                ..
            }
        ));
        assert_eq!(spans(&index), vec![(5, 9)]);
    }

    #[test]
    fn descending_ranges_lead_with_the_most_recent() {
        let mut index = RangeIndex::new();
        index.add(id(1), &descriptor(None, None)).unwrap();
        index.add(id(5), &descriptor(None, None)).unwrap();
        index.add(id(9), &descriptor(None, None)).unwrap();

        let firsts: Vec<i64> = index
            .descending_ranges()
            .map(|range| range.first_backup().checkpoint_id)
            .collect();

        assert_eq!(firsts, vec![9, 5, 1]);
    }

    #[test]
    fn lookup_hits_range_bounds_and_interior() {
        let mut index = RangeIndex::new();
        for checkpoint in 3..=6 {
            let previous = (checkpoint > 3).then(|| checkpoint - 1);
            index.add(id(checkpoint), &descriptor(previous, None)).unwrap();
        }

        for checkpoint in 3..=6 {
            let range = index.lookup(checkpoint).unwrap();
            assert_eq!(range.first_backup().checkpoint_id, 3);
            assert_eq!(range.last_backup().checkpoint_id, 6);
        }
        assert_eq!(index.lookup(2), None);
        assert_eq!(index.lookup(7), None);
    }
}
