//! Pure retention decision logic.
//!
//! [`evaluate`] looks at the existing snapshots of one (dataset, label) pair
//! and a series config and decides what the enforcement loop should do. No
//! I/O, no clocks; `now` is an argument, so decisions are reproducible.

use crate::config::SeriesConfig;
use crate::name::SnapshotIdentity;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What the enforcement loop should do for one (dataset, series) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionDecision {
    /// Take a new snapshot now.
    pub create_new: bool,
    /// Snapshots to destroy, oldest first.
    pub to_destroy: Vec<SnapshotIdentity>,
}

impl RetentionDecision {
    /// Returns `true` when the decision requires no mutation at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.create_new && self.to_destroy.is_empty()
    }
}

/// Decide whether to create a snapshot and which existing ones to destroy.
///
/// `existing` must already be filtered to the series' label on the dataset in
/// question, but need not be sorted. The input is never mutated.
///
/// Create rule: a snapshot is due when there are none, or when the newest is
/// at least `interval` old. This is a staleness check against the newest
/// existing snapshot, not a wall-clock grid.
///
/// Destroy rule: the snapshot that would be created is counted even when
/// creation ends up suppressed by a toggle, since the keep-count reflects intended
/// state. Everything beyond the `keep` most recent is marked, in one step.
#[must_use]
pub fn evaluate(
    existing: &[SnapshotIdentity],
    series: &SeriesConfig,
    now: DateTime<Utc>,
) -> RetentionDecision {
    // Most recent first; ties broken by full name so the order is total and
    // stable even for equal timestamps.
    let mut sorted: Vec<(String, &SnapshotIdentity)> =
        existing.iter().map(|id| (id.encode(), id)).collect();
    sorted.sort_by(|(name_a, a), (name_b, b)| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| name_a.cmp(name_b))
    });

    let create_new = match sorted.first() {
        None => true,
        Some((_, newest)) => {
            let elapsed = now
                .signed_duration_since(newest.timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO);
            elapsed >= series.interval
        }
    };

    // Logically prepend the would-be snapshot, then trim past `keep`.
    let retain_existing = series.keep.saturating_sub(usize::from(create_new));
    let mut to_destroy: Vec<SnapshotIdentity> = if sorted.len() > retain_existing {
        sorted[retain_existing..].iter().map(|(_, id)| (*id).clone()).collect()
    } else {
        Vec::new()
    };
    to_destroy.reverse(); // oldest first

    RetentionDecision {
        create_new,
        to_destroy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn series(interval_secs: u64, keep: usize) -> SeriesConfig {
        SeriesConfig {
            label: "hourly".to_string(),
            interval: Duration::from_secs(interval_secs),
            keep,
        }
    }

    fn snap(ts: DateTime<Utc>) -> SnapshotIdentity {
        SnapshotIdentity {
            dataset: "tank/home".to_string(),
            prefix: "zfs-auto-snap".to_string(),
            label: "hourly".to_string(),
            timestamp: ts,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn minutes_ago(m: i64) -> SnapshotIdentity {
        snap(now() - chrono::Duration::minutes(m))
    }

    #[test]
    fn empty_history_always_creates() {
        let decision = evaluate(&[], &series(3600, 3), now());
        assert!(decision.create_new);
        assert!(decision.to_destroy.is_empty());
    }

    #[test]
    fn fresh_snapshot_suppresses_create() {
        let existing = [minutes_ago(30)];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(!decision.create_new);
    }

    #[test]
    fn stale_snapshot_triggers_create() {
        let existing = [minutes_ago(61)];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(decision.create_new);
    }

    #[test]
    fn exactly_elapsed_interval_triggers_create() {
        let existing = [minutes_ago(60)];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(decision.create_new);
    }

    #[test]
    fn future_snapshot_does_not_trigger_create() {
        // Clock skew: newest snapshot is ahead of `now`.
        let existing = [minutes_ago(-10)];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(!decision.create_new);
    }

    #[test]
    fn trims_exactly_the_oldest_excess() {
        // 5 snapshots, keep 3, nothing due: the 2 oldest go.
        let existing = [
            minutes_ago(10),
            minutes_ago(20),
            minutes_ago(30),
            minutes_ago(40),
            minutes_ago(50),
        ];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(!decision.create_new);
        assert_eq!(
            decision.to_destroy,
            [minutes_ago(50), minutes_ago(40)],
            "oldest first"
        );
    }

    #[test]
    fn prepend_before_trim() {
        // 3 existing, keep 3, interval elapsed: the would-be snapshot makes
        // 4, so exactly the oldest existing one goes.
        let existing = [minutes_ago(70), minutes_ago(130), minutes_ago(190)];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(decision.create_new);
        assert_eq!(decision.to_destroy, [minutes_ago(190)]);
    }

    #[test]
    fn keep_one_with_create_due_trims_everything() {
        let existing = [minutes_ago(70), minutes_ago(130)];
        let decision = evaluate(&existing, &series(3600, 1), now());
        assert!(decision.create_new);
        assert_eq!(decision.to_destroy, [minutes_ago(130), minutes_ago(70)]);
    }

    #[test]
    fn unsorted_input_is_handled() {
        let existing = [minutes_ago(40), minutes_ago(10), minutes_ago(50), minutes_ago(20)];
        let decision = evaluate(&existing, &series(3600, 2), now());
        assert!(!decision.create_new);
        assert_eq!(decision.to_destroy, [minutes_ago(50), minutes_ago(40)]);
    }

    #[test]
    fn equal_timestamps_order_by_name() {
        let mut a = minutes_ago(30);
        a.label = "hourly".to_string();
        a.dataset = "tank/a".to_string();
        let mut b = a.clone();
        b.dataset = "tank/b".to_string();

        // keep 1, no create due: one of the two equal-timestamp snapshots
        // must go, and the choice must be stable regardless of input order.
        let d1 = evaluate(&[a.clone(), b.clone()], &series(3600, 1), now());
        let d2 = evaluate(&[b.clone(), a.clone()], &series(3600, 1), now());
        assert_eq!(d1, d2);
        assert_eq!(d1.to_destroy, [b]);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let existing = [minutes_ago(70), minutes_ago(130), minutes_ago(190)];
        let s = series(3600, 3);
        let first = evaluate(&existing, &s, now());
        let second = evaluate(&existing, &s, now());
        assert_eq!(first, second);
    }

    #[test]
    fn noop_decision() {
        let existing = [minutes_ago(10)];
        let decision = evaluate(&existing, &series(3600, 3), now());
        assert!(decision.is_noop());
    }
}
