//! Reconstruction of [`BackupRange`]s from an unordered marker listing.

use std::collections::BTreeSet;
use std::mem;

use crate::model::BackupRange;
use crate::model::BackupRangeMarker;

/// Rebuild the ordered collection of ranges from a flat set of markers,
/// e.g. as listed from the remote store at startup.
///
/// Only fully bounded ranges are emitted: a start without a matching end
/// (or vice versa) is an interrupted or still-in-progress chain, not an
/// error, and is dropped silently. Deletion markers inside a bounded
/// range turn it [`BackupRange::Incomplete`].
///
/// The output is a function of the marker *set*: input order never
/// matters. Markers sharing a checkpoint id are processed in the order
/// start, deletion, end, so `{Start(n), End(n)}` reads as the
/// single-backup range `[n, n]`.
pub fn from_markers(markers: impl IntoIterator<Item = BackupRangeMarker>) -> Vec<BackupRange> {
    let mut markers: Vec<_> = markers.into_iter().collect();
    markers.sort_by_key(|marker| (marker.checkpoint_id(), kind_rank(marker)));

    let mut ranges = Vec::new();
    let mut current_start = None;
    let mut current_end = None;
    let mut deleted = BTreeSet::new();

    for marker in markers {
        match marker {
            BackupRangeMarker::Start(start) => {
                finalize(&mut ranges, current_start, current_end, &mut deleted);
                current_end = None;
                current_start = Some(start);
            }
            BackupRangeMarker::Deletion(id) => {
                deleted.insert(id);
            }
            BackupRangeMarker::End(end) => current_end = Some(end),
        }
    }
    finalize(&mut ranges, current_start, current_end, &mut deleted);

    ranges
}

fn kind_rank(marker: &BackupRangeMarker) -> u8 {
    match marker {
        BackupRangeMarker::Start(_) => 0,
        BackupRangeMarker::Deletion(_) => 1,
        BackupRangeMarker::End(_) => 2,
    }
}

/// Emit the pending range if it is bounded on both sides; either way the
/// pending deletion set is consumed.
fn finalize(
    ranges: &mut Vec<BackupRange>,
    current_start: Option<i64>,
    current_end: Option<i64>,
    deleted: &mut BTreeSet<i64>,
) {
    let deleted = mem::take(deleted);
    let (Some(start), Some(end)) = (current_start, current_end) else {
        return;
    };
    if deleted.is_empty() {
        ranges.push(BackupRange::Complete { start, end });
    } else {
        ranges.push(BackupRange::Incomplete {
            start,
            end,
            deleted,
        });
    }
}
