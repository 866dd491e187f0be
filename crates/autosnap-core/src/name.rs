//! Snapshot naming codec.
//!
//! Snapshots created by this tool are named
//! `<dataset>@<prefix>_<label>_<timestamp>`, where `label` never contains an
//! underscore and the timestamp is RFC3339 at seconds resolution, rendered in
//! UTC with the `Z` designator. Decoding is the exact inverse; names written
//! by other tools (or with another prefix) decode to `None` rather than an
//! error, so the engine can ignore them.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Suffix grammar after the last `@`: `<prefix>_<label>_<rfc3339>`.
///
/// `prefix` may contain underscores (greedy match); `label` may not. The zone
/// designator is matched case-insensitively.
static SNAP_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<prefix>.+)_(?P<label>[^_]+)_(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2}))$",
    )
    .expect("snapshot suffix pattern must compile")
});

/// Errors from decoding a snapshot name whose grammar matched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name matched the grammar but its timestamp payload is invalid
    /// (e.g. month 13). Distinct from "not one of ours".
    #[error("snapshot name {name:?} has unparseable timestamp {timestamp:?}")]
    Timestamp { name: String, timestamp: String },
}

/// The four fields a snapshot name encodes.
///
/// Derived from the name on decode and rebuilt into the same name on encode;
/// never stored anywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotIdentity {
    /// Full dataset path (`pool/fs/subfs`).
    pub dataset: String,
    /// Tool prefix distinguishing our snapshots from everyone else's.
    pub prefix: String,
    /// Series label (`hourly`, `daily`, ...). Never contains `_`.
    pub label: String,
    /// Creation instant, second resolution.
    pub timestamp: DateTime<Utc>,
}

impl SnapshotIdentity {
    /// Render the canonical snapshot name for this identity.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}@{}_{}_{}",
            self.dataset,
            self.prefix,
            self.label,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Decode a full snapshot name (`dataset@suffix`).
///
/// Returns `Ok(None)` when the name is not one of ours: no `@`, suffix not
/// matching the grammar, or a prefix other than `expected_prefix`.
///
/// # Errors
///
/// Returns [`NameError::Timestamp`] when the grammar matched but the
/// timestamp payload does not parse: the name claims to be ours but is
/// corrupt, which callers report rather than silently skip.
pub fn decode(expected_prefix: &str, name: &str) -> Result<Option<SnapshotIdentity>, NameError> {
    // The dataset path is the longest prefix up to the last '@'.
    let Some(at) = name.rfind('@') else {
        return Ok(None);
    };
    let (dataset, suffix) = (&name[..at], &name[at + 1..]);

    let Some(caps) = SNAP_SUFFIX_RE.captures(suffix) else {
        return Ok(None);
    };

    let prefix = &caps["prefix"];
    if prefix != expected_prefix {
        // Another tool's snapshot, or a previous run with a different prefix.
        return Ok(None);
    }

    let ts_str = &caps["ts"];
    let timestamp = DateTime::parse_from_rfc3339(ts_str)
        .map_err(|_| NameError::Timestamp {
            name: name.to_string(),
            timestamp: ts_str.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(Some(SnapshotIdentity {
        dataset: dataset.to_string(),
        prefix: prefix.to_string(),
        label: caps["label"].to_string(),
        timestamp,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PREFIX: &str = "zfs-auto-snap";

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn encode_renders_canonical_name() {
        let id = SnapshotIdentity {
            dataset: "tank/home".to_string(),
            prefix: PREFIX.to_string(),
            label: "daily".to_string(),
            timestamp: ts(2010, 1, 2, 3, 4, 5),
        };
        assert_eq!(id.encode(), "tank/home@zfs-auto-snap_daily_2010-01-02T03:04:05Z");
    }

    #[test]
    fn decode_round_trips_encode() {
        let id = SnapshotIdentity {
            dataset: "tank/var/log".to_string(),
            prefix: PREFIX.to_string(),
            label: "hourly".to_string(),
            timestamp: ts(2024, 12, 31, 23, 59, 59),
        };
        let decoded = decode(PREFIX, &id.encode()).unwrap().unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn decode_ignores_other_prefixes() {
        let name = "ds@some-other-prefix_daily_2010-01-02T03:04:05Z";
        assert_eq!(decode(PREFIX, name).unwrap(), None);
    }

    #[test]
    fn decode_ignores_foreign_names() {
        for name in [
            "tank/home@manual-backup",
            "tank/home@zfs-auto-snap_daily",
            "just-a-dataset-no-snapshot",
            "tank/home@zfs-auto-snap_daily_not-a-timestamp",
        ] {
            assert_eq!(decode(PREFIX, name).unwrap(), None, "name: {name}");
        }
    }

    #[test]
    fn decode_accepts_offset_and_normalizes_to_utc() {
        let name = "tank@zfs-auto-snap_hourly_2020-06-01T12:00:00+02:00";
        let id = decode(PREFIX, name).unwrap().unwrap();
        assert_eq!(id.timestamp, ts(2020, 6, 1, 10, 0, 0));
    }

    #[test]
    fn decode_zone_designator_is_case_insensitive() {
        let name = "tank@zfs-auto-snap_hourly_2020-06-01T12:00:00z";
        let id = decode(PREFIX, name).unwrap().unwrap();
        assert_eq!(id.timestamp, ts(2020, 6, 1, 12, 0, 0));
    }

    #[test]
    fn decode_accepts_fractional_seconds() {
        let name = "tank@zfs-auto-snap_hourly_2020-06-01T12:00:00.500Z";
        let id = decode(PREFIX, name).unwrap().unwrap();
        assert_eq!(id.label, "hourly");
    }

    #[test]
    fn malformed_timestamp_is_a_hard_error() {
        // Matches the grammar shape but month 13 does not exist.
        let name = "tank@zfs-auto-snap_daily_2020-13-01T00:00:00Z";
        let err = decode(PREFIX, name).unwrap_err();
        assert!(matches!(err, NameError::Timestamp { .. }));
    }

    #[test]
    fn prefix_may_contain_underscores() {
        let name = "tank@my_odd_prefix_daily_2020-01-01T00:00:00Z";
        let id = decode("my_odd_prefix", name).unwrap().unwrap();
        assert_eq!(id.prefix, "my_odd_prefix");
        assert_eq!(id.label, "daily");
        assert_eq!(id.encode(), name);
    }

    #[test]
    fn dataset_path_takes_everything_before_last_at() {
        let name = "tank/odd@name@zfs-auto-snap_daily_2020-01-01T00:00:00Z";
        let id = decode(PREFIX, name).unwrap().unwrap();
        assert_eq!(id.dataset, "tank/odd@name");
    }
}
