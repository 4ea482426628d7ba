//! Tracking of contiguous incremental backup ranges for a partitioned
//! log store.
//!
//! Each partition of the log takes incremental backups at monotonically
//! increasing checkpoint ids. This crate answers, cheaply and without
//! querying the remote store, "is there an unbroken chain of backups
//! between checkpoint A and checkpoint B?" and "what is the best range
//! to restore from?".
//!
//! Architecture
//! ------------
//!
//! Knowledge about contiguity is carried two ways, and both converge on
//! the same range model:
//!
//! * **Descriptor linkage.** Every backup's [`model::BackupDescriptor`]
//!   links to its chronological predecessor and (once known) successor.
//!   The backup management layer feeds these point updates into a
//!   per-partition [`index::RangeIndex`], which folds them into
//!   disjoint, maximal gap-free [`index::Range`]s by merging neighbours
//!   on insert and splitting on interior removal. Updates happen
//!   strictly after the corresponding store operation is durably
//!   confirmed.
//!
//! * **Range markers.** The backup-taking process also persists small
//!   [`model::BackupRangeMarker`] objects (start / end / deletion) per
//!   checkpoint. Reading them back as a flat unordered listing and
//!   running [`ranges::from_markers`] reconstructs the nominal
//!   [`model::BackupRange`]s from scratch, e.g. at startup or from a
//!   different process, without scanning every backup manifest.
//!
//! Markers are written by possibly multiple processes into an
//! eventually consistent listing, so both the marker codec and the
//! reconstruction are total: malformed names and unbounded chains are
//! skipped, never errors. Contradictory descriptor linkage, on the
//! other hand, means the caller's view of the world disagrees with the
//! index and is rejected synchronously before any state changes.
//!
//! Restore planning
//! ----------------
//!
//! [`resolver::BackupRangeResolver`] combines reconstructed ranges with
//! verified [`model::BackupStatus`]es from a [`store::BackupStore`] to
//! plan a restore: the safe start checkpoint per partition, the global
//! checkpoint every partition can reach, and gap detection over log
//! positions. [`index::compact::CompactBackupIndex`] keeps a small
//! file-backed index of known backups so reconciliation does not have
//! to re-list the remote store.
//!
//! Concurrency
//! -----------
//!
//! [`index::RangeIndex`] is a plain synchronous structure: one instance
//! per partition, owned by the component driving that partition's
//! backups. Store operations are async and retryable; index updates are
//! the final, synchronous step after durable confirmation.

pub mod index;
pub mod interval;
pub mod model;
pub mod ranges;
pub mod resolver;
pub mod store;

pub use index::Range;
pub use index::RangeIndex;
pub use index::RangeIndexError;
pub use interval::Interval;
pub use model::BackupDescriptor;
pub use model::BackupIdentifier;
pub use model::BackupIdentifierWildcard;
pub use model::BackupRange;
pub use model::BackupRangeMarker;
pub use model::BackupRangeStatus;
pub use model::BackupStatus;
pub use model::BackupStatusCode;
pub use store::BackupStore;
