//! The enforcement loop: drive the retention evaluator across every
//! (dataset × series) pair and apply its decisions through the store.
//!
//! One pair failing never aborts the others; every outcome lands in the
//! [`RunReport`]. Creation and destruction can be disabled independently
//! (or together via dry-run), which gates execution only; the decisions
//! are identical either way.

use crate::config::SeriesConfig;
use crate::name::{self, SnapshotIdentity};
use crate::retention;
use crate::select::{self, SelectError, SkipReason, TargetSpec};
use crate::store::{SnapshotStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Immutable per-run settings for the engine and selector.
///
/// Collected into one value passed explicitly so the evaluator and selector
/// stay testable in isolation; nothing reads ambient process state.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Prefix embedded in every snapshot name this tool owns.
    pub prefix: String,
    pub recursive: bool,
    pub default_exclude: bool,
    pub skip_scrub: bool,
    pub allow_create: bool,
    pub allow_destroy: bool,
    /// Overrides both allow flags at the execution boundary.
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            prefix: "zfs-auto-snap".to_string(),
            recursive: false,
            default_exclude: false,
            skip_scrub: true,
            allow_create: true,
            allow_destroy: true,
            dry_run: false,
        }
    }
}

impl EngineOptions {
    const fn create_enabled(&self) -> bool {
        self.allow_create && !self.dry_run
    }

    const fn destroy_enabled(&self) -> bool {
        self.allow_destroy && !self.dry_run
    }
}

/// Fatal engine failures: anything that prevents the run from starting.
/// Per-pair failures are reported in the [`RunReport`] instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Select(#[from] SelectError),

    /// The initial tree mirror could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A dataset dropped before pair processing, with a printable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOutcome {
    pub dataset: String,
    pub reason: String,
}

/// Everything that happened (or would have happened) for one
/// (dataset, series) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairOutcome {
    pub dataset: String,
    pub label: String,
    /// Snapshot name actually created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Snapshot that was due but suppressed by dry-run/--no-create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_create: Option<String>,
    /// Snapshot names actually destroyed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destroyed: Vec<String>,
    /// Destructions suppressed by dry-run/--no-destroy.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub would_destroy: Vec<String>,
    /// Names that matched our grammar but carried a corrupt timestamp;
    /// excluded from retention accounting.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decode_errors: Vec<String>,
    /// Collaborator and partial-destroy failures for this pair.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl PairOutcome {
    fn new(dataset: &str, label: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            label: label.to_string(),
            ..Self::default()
        }
    }

    /// Returns `true` when this pair finished without any error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.decode_errors.is_empty()
    }
}

/// Outcome of a full enforcement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub skipped: Vec<SkippedOutcome>,
    pub pairs: Vec<PairOutcome>,
    /// Set when a cooperative stop ended the run between iterations.
    pub stopped_early: bool,
}

impl RunReport {
    /// `true` when no pair reported any error. Drives the exit status.
    #[must_use]
    pub fn completed_cleanly(&self) -> bool {
        self.pairs.iter().all(PairOutcome::is_clean)
    }
}

/// The snapshot retention engine.
pub struct Engine<'a, S: SnapshotStore> {
    store: &'a S,
    options: EngineOptions,
}

impl<'a, S: SnapshotStore> Engine<'a, S> {
    pub const fn new(store: &'a S, options: EngineOptions) -> Self {
        Self { store, options }
    }

    /// Run the enforcement loop once.
    ///
    /// Mirrors the tree, selects and filters targets, then walks the
    /// (dataset × series) cross-product applying retention decisions.
    /// `stop` is checked between iterations; partial progress is a valid
    /// terminal state.
    ///
    /// # Errors
    ///
    /// Only for failures that prevent the run from starting: the initial
    /// mirror listing or target selection. Everything after that is
    /// per-pair and lands in the report.
    pub fn run(
        &self,
        spec: &TargetSpec,
        series: &[SeriesConfig],
        now: DateTime<Utc>,
        stop: &AtomicBool,
    ) -> Result<RunReport, EngineError> {
        let roots = self.store.load_mirror()?;
        let targets = select::select(&roots, spec, self.options.recursive)?;
        let (targets, skipped) = select::filter_targets(
            targets,
            self.store,
            self.options.default_exclude,
            self.options.skip_scrub,
        );

        let mut report = RunReport {
            skipped: skipped
                .into_iter()
                .map(|s| SkippedOutcome {
                    dataset: s.path,
                    reason: match s.reason {
                        SkipReason::Excluded => "excluded".to_string(),
                        SkipReason::PoolScanning => "pool scan in progress".to_string(),
                        SkipReason::PoolStateError(e) => {
                            format!("pool state lookup failed: {e}")
                        }
                    },
                })
                .collect(),
            ..RunReport::default()
        };

        'outer: for dataset in targets {
            for s in series {
                if stop.load(Ordering::Relaxed) {
                    info!("stop requested; ending run early");
                    report.stopped_early = true;
                    break 'outer;
                }
                report.pairs.push(self.run_pair(&dataset.path, s, now));
            }
        }

        Ok(report)
    }

    /// Evaluate and enforce one (dataset, series) pair.
    fn run_pair(&self, dataset: &str, series: &SeriesConfig, now: DateTime<Utc>) -> PairOutcome {
        let mut outcome = PairOutcome::new(dataset, &series.label);

        let existing = match self.existing_snapshots(dataset, series, &mut outcome) {
            Ok(existing) => existing,
            Err(err) => {
                warn!(dataset, label = %series.label, error = %err, "snapshot listing failed");
                outcome.errors.push(err.to_string());
                return outcome;
            }
        };

        let decision = retention::evaluate(&existing, series, now);
        debug!(
            dataset,
            label = %series.label,
            existing = existing.len(),
            create_new = decision.create_new,
            to_destroy = decision.to_destroy.len(),
            "evaluated"
        );

        if decision.create_new {
            self.apply_create(dataset, series, now, &mut outcome);
        }
        if !decision.to_destroy.is_empty() {
            self.apply_destroy(dataset, &decision.to_destroy, &mut outcome);
        }

        outcome
    }

    /// List and decode the dataset's current snapshots for this series.
    ///
    /// Hard decode errors are recorded on the outcome and the offending
    /// names are dropped from accounting.
    fn existing_snapshots(
        &self,
        dataset: &str,
        series: &SeriesConfig,
        outcome: &mut PairOutcome,
    ) -> Result<Vec<SnapshotIdentity>, StoreError> {
        let names = self.store.snapshot_names(dataset)?;
        let mut existing = Vec::new();
        for snap_name in names {
            match name::decode(&self.options.prefix, &snap_name) {
                Ok(Some(id)) if id.label == series.label && id.dataset == dataset => {
                    existing.push(id);
                }
                Ok(_) => {} // not ours, or another series
                Err(err) => {
                    warn!(snapshot = %snap_name, error = %err, "unparseable snapshot name");
                    outcome.decode_errors.push(err.to_string());
                }
            }
        }
        Ok(existing)
    }

    fn apply_create(
        &self,
        dataset: &str,
        series: &SeriesConfig,
        now: DateTime<Utc>,
        outcome: &mut PairOutcome,
    ) {
        let snap_name = SnapshotIdentity {
            dataset: dataset.to_string(),
            prefix: self.options.prefix.clone(),
            label: series.label.clone(),
            timestamp: now,
        }
        .encode();

        if !self.options.create_enabled() {
            info!(snapshot = %snap_name, "snapshot would be created");
            outcome.would_create = Some(snap_name);
            return;
        }

        info!(snapshot = %snap_name, "creating snapshot");
        match self.store.create_snapshot(&snap_name, &BTreeMap::new()) {
            Ok(()) => outcome.created = Some(snap_name),
            Err(err) => {
                warn!(snapshot = %snap_name, error = %err, "snapshot creation failed");
                outcome.errors.push(err.to_string());
            }
        }
    }

    /// Destroy the marked snapshots, matching them against the dataset's
    /// actual children. Requested names missing at destroy time surface as a
    /// partial-destroy error; nothing is retried.
    fn apply_destroy(
        &self,
        dataset: &str,
        to_destroy: &[SnapshotIdentity],
        outcome: &mut PairOutcome,
    ) {
        let requested: Vec<String> = to_destroy.iter().map(SnapshotIdentity::encode).collect();

        if !self.options.destroy_enabled() {
            for snap_name in &requested {
                info!(snapshot = %snap_name, "snapshot would be removed");
            }
            outcome.would_destroy = requested;
            return;
        }

        let mut pending: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        let actual = match self.store.snapshot_names(dataset) {
            Ok(actual) => actual,
            Err(err) => {
                outcome.errors.push(err.to_string());
                return;
            }
        };

        for snap_name in &actual {
            if !pending.contains(snap_name.as_str()) {
                continue;
            }
            info!(snapshot = %snap_name, "removing snapshot");
            match self.store.destroy_snapshot(snap_name, false) {
                Ok(()) => {
                    outcome.destroyed.push(snap_name.clone());
                }
                Err(err) => {
                    warn!(snapshot = %snap_name, error = %err, "snapshot destruction failed");
                    outcome.errors.push(err.to_string());
                }
            }
            pending.remove(snap_name.as_str());
        }

        if !pending.is_empty() {
            let missing: Vec<&str> = pending.into_iter().collect();
            outcome.errors.push(format!(
                "failed to find snapshots marked for deletion: {}",
                missing.join(", ")
            ));
        }
    }
}
