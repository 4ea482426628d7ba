//! Identifiers for individual backups and partial-match patterns over
//! them.

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

/// Uniquely identifies one backup in the store.
///
/// Checkpoint ids increase monotonically within a partition, so within a
/// fixed node and partition the derived ordering sorts backups
/// chronologically. Ordering across different node/partition pairs carries
/// no meaning.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackupIdentifier {
    pub node_id: i32,
    pub partition_id: i32,
    pub checkpoint_id: i64,
}

impl BackupIdentifier {
    pub fn new(node_id: i32, partition_id: i32, checkpoint_id: i64) -> Self {
        Self {
            node_id,
            partition_id,
            checkpoint_id,
        }
    }
}

impl Display for BackupIdentifier {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "{}/{}/{}",
            self.node_id, self.partition_id, self.checkpoint_id
        )
    }
}

/// A partially specified [`BackupIdentifier`] used for bulk queries
/// against the store.
///
/// Absent fields match anything.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIdentifierWildcard {
    pub node_id: Option<i32>,
    pub partition_id: Option<i32>,
    pub checkpoint_id: Option<i64>,
}

impl BackupIdentifierWildcard {
    /// Matches every backup of one partition, on any node.
    pub fn of_partition(partition_id: i32) -> Self {
        Self {
            node_id: None,
            partition_id: Some(partition_id),
            checkpoint_id: None,
        }
    }

    /// Matches every backup of one partition on one node.
    pub fn of_node_partition(node_id: i32, partition_id: i32) -> Self {
        Self {
            node_id: Some(node_id),
            partition_id: Some(partition_id),
            checkpoint_id: None,
        }
    }

    /// True iff every present field equals the corresponding field of
    /// `id`. Fields are checked independently.
    pub fn matches(&self, id: &BackupIdentifier) -> bool {
        self.node_id.map_or(true, |node| node == id.node_id)
            && self
                .partition_id
                .map_or(true, |partition| partition == id.partition_id)
            && self
                .checkpoint_id
                .map_or(true, |checkpoint| checkpoint == id.checkpoint_id)
    }
}

#[test]
fn wildcard_with_only_partition_matches_any_node_and_checkpoint() {
    let wildcard = BackupIdentifierWildcard::of_partition(2);

    assert!(wildcard.matches(&BackupIdentifier::new(0, 2, 1)));
    assert!(wildcard.matches(&BackupIdentifier::new(7, 2, 999)));
    assert!(!wildcard.matches(&BackupIdentifier::new(0, 3, 1)));
}

#[test]
fn empty_wildcard_matches_everything() {
    let wildcard = BackupIdentifierWildcard::default();

    assert!(wildcard.matches(&BackupIdentifier::new(0, 0, 0)));
    assert!(wildcard.matches(&BackupIdentifier::new(-1, 42, i64::MAX)));
}

#[test]
fn fully_specified_wildcard_matches_exactly_one_id() {
    let wildcard = BackupIdentifierWildcard {
        node_id: Some(1),
        partition_id: Some(2),
        checkpoint_id: Some(3),
    };

    assert!(wildcard.matches(&BackupIdentifier::new(1, 2, 3)));
    assert!(!wildcard.matches(&BackupIdentifier::new(1, 2, 4)));
    assert!(!wildcard.matches(&BackupIdentifier::new(0, 2, 3)));
}

#[test]
fn identifier_orders_chronologically_within_node_and_partition() {
    let older = BackupIdentifier::new(1, 1, 5);
    let newer = BackupIdentifier::new(1, 1, 6);

    assert!(older < newer);
}

#[test]
fn identifier_serde_shape() {
    use serde_test::assert_tokens;
    use serde_test::Token;

    let id = BackupIdentifier::new(1, 2, 3);

    assert_tokens(
        &id,
        &[
            Token::Struct {
                name: "BackupIdentifier",
                len: 3,
            },
            Token::Str("node_id"),
            Token::I32(1),
            Token::Str("partition_id"),
            Token::I32(2),
            Token::Str("checkpoint_id"),
            Token::I64(3),
            Token::StructEnd,
        ],
    );
}
