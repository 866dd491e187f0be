//! Target dataset selection: sentinel/path resolution, recursive expansion,
//! property-based exclusion, and pool-scan gating.

use crate::dataset::Dataset;
use crate::store::SnapshotStore;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// User property controlling per-dataset opt-in/opt-out.
///
/// `"true"`/`"false"` (case-insensitive) include or exclude the dataset
/// outright; an absent property falls back to the `default_exclude` flag.
pub const AUTO_SNAPSHOT_PROPERTY: &str = "com.sun:auto-snapshot";

/// Which datasets a run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// The `//` sentinel: every dataset, subject to exclusion rules.
    All,
    /// An explicit list of dataset paths.
    Paths(Vec<String>),
}

/// Usage errors in target selection. Fatal, like any configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("dataset argument list is empty")]
    EmptyTargetList,

    #[error("'//' must be the only dataset argument when given")]
    SentinelMixed,

    #[error("no such dataset: {0}")]
    NoSuchDataset(String),
}

impl TargetSpec {
    /// Parse positional CLI arguments into a target spec.
    ///
    /// # Errors
    ///
    /// Empty argument list, or `//` mixed with explicit paths.
    pub fn from_args(args: &[String]) -> Result<Self, SelectError> {
        if args.is_empty() {
            return Err(SelectError::EmptyTargetList);
        }
        if args.iter().any(|a| a == "//") {
            if args.len() > 1 {
                return Err(SelectError::SentinelMixed);
            }
            return Ok(Self::All);
        }
        Ok(Self::Paths(args.to_vec()))
    }
}

/// Why a selected dataset was dropped from this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Excluded by the auto-snapshot property or the default-exclude policy.
    Excluded,
    /// The dataset's pool has a scan (scrub/resilver) in progress.
    PoolScanning,
    /// Pool state could not be determined; skipped for safety.
    PoolStateError(String),
}

/// A dataset dropped from the target set, with the reason, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDataset {
    pub path: String,
    pub reason: SkipReason,
}

/// Resolve a target spec against the mirrored tree.
///
/// Snapshot nodes are never targets and recursive expansion never descends
/// through them. Results are deduplicated and ordered by path.
///
/// # Errors
///
/// [`SelectError::NoSuchDataset`] when an explicit path names nothing in the
/// mirror.
pub fn select<'a>(
    roots: &'a [Dataset],
    spec: &TargetSpec,
    recursive: bool,
) -> Result<Vec<&'a Dataset>, SelectError> {
    let mut targets: BTreeMap<&str, &Dataset> = BTreeMap::new();

    match spec {
        TargetSpec::All => {
            // Recursion is implied; every snapshot-capable dataset is in.
            for root in roots {
                for d in root.iter().filter(|d| d.kind.is_target_kind()) {
                    targets.insert(&d.path, d);
                }
            }
        }
        TargetSpec::Paths(paths) => {
            for path in paths {
                let found = roots
                    .iter()
                    .find_map(|root| root.iter().find(|d| d.path == *path))
                    .filter(|d| d.kind.is_target_kind())
                    .ok_or_else(|| SelectError::NoSuchDataset(path.clone()))?;
                if recursive {
                    for d in found.iter().filter(|d| d.kind.is_target_kind()) {
                        targets.insert(&d.path, d);
                    }
                } else {
                    targets.insert(&found.path, found);
                }
            }
        }
    }

    Ok(targets.into_values().collect())
}

/// Whether the dataset opts out of automatic snapshots.
///
/// Unrecognized property values fall back to `default_exclude` with a
/// warning; they never fail the run.
#[must_use]
pub fn excluded(dataset: &Dataset, default_exclude: bool) -> bool {
    let Some(prop) = dataset.user_properties.get(AUTO_SNAPSHOT_PROPERTY) else {
        return default_exclude;
    };
    match prop.value.to_lowercase().as_str() {
        "true" => false,
        "false" => true,
        other => {
            warn!(
                dataset = %dataset.path,
                value = %other,
                "unexpected value for property {AUTO_SNAPSHOT_PROPERTY}; using default"
            );
            default_exclude
        }
    }
}

/// Apply exclusion and pool-scan gating to a selected target set.
///
/// Returns the surviving targets plus the skipped ones with reasons. A pool
/// state lookup failure skips that dataset for this run only and is surfaced
/// in the skip list rather than aborting.
pub fn filter_targets<'a>(
    targets: Vec<&'a Dataset>,
    store: &dyn SnapshotStore,
    default_exclude: bool,
    skip_scrub: bool,
) -> (Vec<&'a Dataset>, Vec<SkippedDataset>) {
    let mut kept = Vec::new();
    let mut skipped = Vec::new();

    for dataset in targets {
        if excluded(dataset, default_exclude) {
            debug!(dataset = %dataset.path, "excluded");
            skipped.push(SkippedDataset {
                path: dataset.path.clone(),
                reason: SkipReason::Excluded,
            });
            continue;
        }

        if skip_scrub {
            match store.pool_scanning(dataset.pool()) {
                Ok(true) => {
                    info!(dataset = %dataset.path, "skipped: pool scan in progress");
                    skipped.push(SkippedDataset {
                        path: dataset.path.clone(),
                        reason: SkipReason::PoolScanning,
                    });
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(dataset = %dataset.path, error = %err, "pool state lookup failed; skipping");
                    skipped.push(SkippedDataset {
                        path: dataset.path.clone(),
                        reason: SkipReason::PoolStateError(err.to_string()),
                    });
                    continue;
                }
            }
        }

        kept.push(dataset);
    }

    (kept, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetKind, PropertyValue};
    use crate::store::MemoryStore;

    fn prop(value: &str) -> PropertyValue {
        PropertyValue {
            value: value.to_string(),
            source: "local".to_string(),
        }
    }

    fn tree() -> Vec<Dataset> {
        let mut tank = Dataset::new("tank", DatasetKind::Filesystem);
        let mut home = Dataset::new("tank/home", DatasetKind::Filesystem);
        home.children.push(Dataset::new(
            "tank/home/alice",
            DatasetKind::Filesystem,
        ));
        home.children.push(Dataset::new(
            "tank/home@zfs-auto-snap_daily_2020-01-01T00:00:00Z",
            DatasetKind::Snapshot,
        ));
        tank.children.push(home);
        tank.children.push(Dataset::new("tank/swap", DatasetKind::Volume));

        let other = Dataset::new("backup", DatasetKind::Filesystem);
        vec![tank, other]
    }

    #[test]
    fn sentinel_selects_everything_but_snapshots() {
        let roots = tree();
        let targets = select(&roots, &TargetSpec::All, false).expect("select");
        let paths: Vec<&str> = targets.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(
            paths,
            ["backup", "tank", "tank/home", "tank/home/alice", "tank/swap"]
        );
    }

    #[test]
    fn explicit_path_without_recursion_is_just_that_dataset() {
        let roots = tree();
        let spec = TargetSpec::Paths(vec!["tank/home".to_string()]);
        let targets = select(&roots, &spec, false).expect("select");
        let paths: Vec<&str> = targets.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["tank/home"]);
    }

    #[test]
    fn recursive_expansion_walks_the_subtree() {
        let roots = tree();
        let spec = TargetSpec::Paths(vec!["tank/home".to_string()]);
        let targets = select(&roots, &spec, true).expect("select");
        let paths: Vec<&str> = targets.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["tank/home", "tank/home/alice"]);
    }

    #[test]
    fn unknown_path_is_an_error() {
        let roots = tree();
        let spec = TargetSpec::Paths(vec!["tank/nope".to_string()]);
        assert_eq!(
            select(&roots, &spec, false).expect_err("unknown"),
            SelectError::NoSuchDataset("tank/nope".to_string())
        );
    }

    #[test]
    fn sentinel_mixed_with_paths_is_an_error() {
        let args = vec!["//".to_string(), "tank".to_string()];
        assert_eq!(
            TargetSpec::from_args(&args).expect_err("mixed"),
            SelectError::SentinelMixed
        );
        assert_eq!(
            TargetSpec::from_args(&[]).expect_err("empty"),
            SelectError::EmptyTargetList
        );
    }

    #[test]
    fn exclusion_defaults_apply_when_property_absent() {
        let d = Dataset::new("tank/home", DatasetKind::Filesystem);
        assert!(excluded(&d, true));
        assert!(!excluded(&d, false));
    }

    #[test]
    fn property_value_overrides_default() {
        let mut d = Dataset::new("tank/home", DatasetKind::Filesystem);
        d.user_properties
            .insert(AUTO_SNAPSHOT_PROPERTY.to_string(), prop("TRUE"));
        assert!(!excluded(&d, true));

        d.user_properties
            .insert(AUTO_SNAPSHOT_PROPERTY.to_string(), prop("false"));
        assert!(excluded(&d, false));
    }

    #[test]
    fn unrecognized_property_value_falls_back_to_default() {
        let mut d = Dataset::new("tank/home", DatasetKind::Filesystem);
        d.user_properties
            .insert(AUTO_SNAPSHOT_PROPERTY.to_string(), prop("maybe"));
        assert!(excluded(&d, true));
        assert!(!excluded(&d, false));
    }

    #[test]
    fn scan_gating_skips_datasets_on_scanning_pools() {
        let roots = tree();
        let store = MemoryStore::new(roots.clone());
        store.set_scanning("tank", true);

        let targets = select(&roots, &TargetSpec::All, false).expect("select");
        let (kept, skipped) = filter_targets(targets, &store, false, true);

        let kept_paths: Vec<&str> = kept.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(kept_paths, ["backup"]);
        assert!(skipped
            .iter()
            .filter(|s| s.reason == SkipReason::PoolScanning)
            .all(|s| s.path.starts_with("tank")));
        assert_eq!(skipped.len(), 4);
    }

    #[test]
    fn scan_gating_respects_property_include() {
        // Even an explicitly included dataset is skipped while its pool scans.
        let mut tank = Dataset::new("tank", DatasetKind::Filesystem);
        tank.user_properties
            .insert(AUTO_SNAPSHOT_PROPERTY.to_string(), prop("true"));
        let roots = vec![tank];
        let store = MemoryStore::new(roots.clone());
        store.set_scanning("tank", true);

        let targets = select(&roots, &TargetSpec::All, false).expect("select");
        let (kept, skipped) = filter_targets(targets, &store, true, true);
        assert!(kept.is_empty());
        assert_eq!(skipped[0].reason, SkipReason::PoolScanning);
    }

    #[test]
    fn scan_gating_disabled_keeps_scanning_pools() {
        let roots = tree();
        let store = MemoryStore::new(roots.clone());
        store.set_scanning("tank", true);

        let targets = select(&roots, &TargetSpec::All, false).expect("select");
        let (kept, skipped) = filter_targets(targets, &store, false, false);
        assert_eq!(kept.len(), 5);
        assert!(skipped.is_empty());
    }
}
