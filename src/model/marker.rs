//! Range markers persisted per checkpoint id.
//!
//! Markers are small objects written next to the backups themselves: a
//! start marker when a new chain begins, an end marker whenever the
//! chain's tail advances, a deletion marker when a backup is removed.
//! Reading them back as a flat, unordered listing is enough to
//! reconstruct range state without scanning every backup manifest; see
//! [`crate::ranges::from_markers`].

use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

const START_SUFFIX: &str = "start";
const END_SUFFIX: &str = "end";
const DELETION_SUFFIX: &str = "deletion";

/// A single persisted range marker.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum BackupRangeMarker {
    /// A new chain of backups begins at this checkpoint.
    Start(i64),
    /// The chain's tail has advanced to this checkpoint.
    End(i64),
    /// The backup at this checkpoint was deleted, leaving a gap.
    Deletion(i64),
}

impl BackupRangeMarker {
    pub fn checkpoint_id(&self) -> i64 {
        match self {
            Self::Start(id) | Self::End(id) | Self::Deletion(id) => *id,
        }
    }

    /// The stable name this marker is stored under:
    /// `"<checkpoint_id>.<start|end|deletion>"`.
    pub fn name(&self) -> String {
        match self {
            Self::Start(id) => format!("{id}.{START_SUFFIX}"),
            Self::End(id) => format!("{id}.{END_SUFFIX}"),
            Self::Deletion(id) => format!("{id}.{DELETION_SUFFIX}"),
        }
    }

    /// Decode a marker from its stored name.
    ///
    /// Total: store listings may contain unrelated or corrupted entries,
    /// so anything that is not a well-formed marker name decodes to
    /// `None` rather than an error.
    pub fn from_name(name: &str) -> Option<Self> {
        let (prefix, suffix) = name.split_once('.')?;
        let checkpoint_id = prefix.parse::<i64>().ok()?;
        match suffix {
            START_SUFFIX => Some(Self::Start(checkpoint_id)),
            END_SUFFIX => Some(Self::End(checkpoint_id)),
            DELETION_SUFFIX => Some(Self::Deletion(checkpoint_id)),
            _ => None,
        }
    }
}

/// Markers serialize as their stored name so manifests and store
/// listings agree on the encoding.
impl Serialize for BackupRangeMarker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for BackupRangeMarker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name)
            .ok_or_else(|| de::Error::custom(format!("not a backup range marker name: {name:?}")))
    }
}

#[test]
fn name_round_trips_for_every_kind() {
    for marker in [
        BackupRangeMarker::Start(0),
        BackupRangeMarker::End(17),
        BackupRangeMarker::Deletion(12345),
        BackupRangeMarker::Start(i64::MAX),
        BackupRangeMarker::End(i64::MIN),
        BackupRangeMarker::Deletion(-3),
    ] {
        assert_eq!(BackupRangeMarker::from_name(&marker.name()), Some(marker));
    }
}

#[test]
fn name_encoding_is_exact() {
    assert_eq!(BackupRangeMarker::Start(5).name(), "5.start");
    assert_eq!(BackupRangeMarker::End(5).name(), "5.end");
    assert_eq!(BackupRangeMarker::Deletion(5).name(), "5.deletion");
}

#[test]
fn malformed_names_decode_to_none() {
    for name in [
        "",
        "5",
        ".start",
        "5.",
        "5.begin",
        "five.start",
        "5.start.extra",
        "5 .start",
        "0x5.end",
        "99999999999999999999999999.end",
    ] {
        assert_eq!(BackupRangeMarker::from_name(name), None, "name: {name:?}");
    }
}

#[test]
fn serde_uses_the_name_encoding() {
    let marker = BackupRangeMarker::Deletion(42);

    let json = serde_json::to_string(&marker).unwrap();
    assert_eq!(json, "\"42.deletion\"");

    let decoded: BackupRangeMarker = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, marker);

    assert!(serde_json::from_str::<BackupRangeMarker>("\"nonsense\"").is_err());
}
