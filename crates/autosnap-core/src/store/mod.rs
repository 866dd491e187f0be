//! The seam to the external storage collaborator.
//!
//! Everything the engine needs from the pool/dataset layer goes through
//! [`SnapshotStore`]: a full-tree listing for the session mirror, pool scan
//! state, snapshot creation/destruction, and a fresh per-dataset snapshot
//! listing. Every call is blocking request/response and treated as atomic.

pub mod memory;

use crate::dataset::Dataset;
use std::collections::BTreeMap;

pub use memory::{MemoryOp, MemoryStore};

/// Failures reported by a [`SnapshotStore`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no such dataset: {0}")]
    NoSuchDataset(String),

    #[error("failed to list datasets: {0}")]
    List(String),

    #[error("pool state lookup failed for {pool}: {reason}")]
    PoolState { pool: String, reason: String },

    #[error("failed to create snapshot {name}: {reason}")]
    Create { name: String, reason: String },

    #[error("failed to destroy snapshot {name}: {reason}")]
    Destroy { name: String, reason: String },
}

/// Operations the engine consumes from the storage collaborator.
///
/// The collaborator is the single source of truth; the engine never caches
/// snapshot listings across (dataset, series) iterations.
pub trait SnapshotStore {
    /// Mirror the full dataset tree, snapshot leaves included.
    ///
    /// Called once per run; the result is owned by the caller for the rest
    /// of the session.
    fn load_mirror(&self) -> Result<Vec<Dataset>, StoreError>;

    /// Whether the named pool currently has a scan (scrub or resilver)
    /// in progress.
    fn pool_scanning(&self, pool: &str) -> Result<bool, StoreError>;

    /// Create a snapshot. `name` is already fully encoded
    /// (`dataset@prefix_label_timestamp`).
    fn create_snapshot(
        &self,
        name: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Destroy a snapshot by its full name.
    fn destroy_snapshot(&self, name: &str, recursive: bool) -> Result<(), StoreError>;

    /// Current snapshot children of `dataset`, re-read from the
    /// collaborator (not from any mirror).
    fn snapshot_names(&self, dataset: &str) -> Result<Vec<String>, StoreError>;
}
