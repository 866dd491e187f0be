//! In-memory [`SnapshotStore`] used by the test suite.
//!
//! Holds a mutable dataset tree behind a mutex, records every mutation in a
//! journal, and can be told to fail specific creates/destroys or to report a
//! pool as scanning.

use super::{SnapshotStore, StoreError};
use crate::dataset::{Dataset, DatasetKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// One mutation applied to a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryOp {
    Created(String),
    Destroyed(String),
}

#[derive(Debug, Default)]
struct State {
    roots: Vec<Dataset>,
    scanning_pools: BTreeSet<String>,
    fail_create_on: BTreeSet<String>,
    fail_destroy_of: BTreeSet<String>,
    journal: Vec<MemoryOp>,
}

/// In-memory store over an owned dataset tree.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(roots: Vec<Dataset>) -> Self {
        Self {
            state: Mutex::new(State {
                roots,
                ..State::default()
            }),
        }
    }

    /// Mark a pool as having a scan in progress.
    pub fn set_scanning(&self, pool: &str, scanning: bool) {
        let mut state = self.lock();
        if scanning {
            state.scanning_pools.insert(pool.to_string());
        } else {
            state.scanning_pools.remove(pool);
        }
    }

    /// Make every `create_snapshot` against `dataset` fail.
    pub fn fail_create_on(&self, dataset: &str) {
        self.lock().fail_create_on.insert(dataset.to_string());
    }

    /// Make `destroy_snapshot` of the exact `name` fail.
    pub fn fail_destroy_of(&self, name: &str) {
        self.lock().fail_destroy_of.insert(name.to_string());
    }

    /// Every mutation applied so far, in order.
    #[must_use]
    pub fn journal(&self) -> Vec<MemoryOp> {
        self.lock().journal.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn find<'a>(roots: &'a [Dataset], path: &str) -> Option<&'a Dataset> {
    for root in roots {
        if let Some(found) = root.iter().find(|d| d.path == path) {
            return Some(found);
        }
    }
    None
}

fn find_mut<'a>(roots: &'a mut [Dataset], path: &str) -> Option<&'a mut Dataset> {
    for root in roots {
        if root.path == path {
            return Some(root);
        }
        if let Some(found) = find_mut(&mut root.children, path) {
            return Some(found);
        }
    }
    None
}

impl SnapshotStore for MemoryStore {
    fn load_mirror(&self) -> Result<Vec<Dataset>, StoreError> {
        Ok(self.lock().roots.clone())
    }

    fn pool_scanning(&self, pool: &str) -> Result<bool, StoreError> {
        Ok(self.lock().scanning_pools.contains(pool))
    }

    fn create_snapshot(
        &self,
        name: &str,
        _props: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let dataset = name.split('@').next().unwrap_or(name).to_string();
        let mut state = self.lock();

        if state.fail_create_on.contains(&dataset) {
            return Err(StoreError::Create {
                name: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let Some(node) = find_mut(&mut state.roots, &dataset) else {
            return Err(StoreError::NoSuchDataset(dataset));
        };
        node.children.push(Dataset::new(name, DatasetKind::Snapshot));
        state.journal.push(MemoryOp::Created(name.to_string()));
        Ok(())
    }

    fn destroy_snapshot(&self, name: &str, _recursive: bool) -> Result<(), StoreError> {
        let dataset = name.split('@').next().unwrap_or(name).to_string();
        let mut state = self.lock();

        if state.fail_destroy_of.contains(name) {
            return Err(StoreError::Destroy {
                name: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let Some(node) = find_mut(&mut state.roots, &dataset) else {
            return Err(StoreError::NoSuchDataset(dataset));
        };
        let before = node.children.len();
        node.children
            .retain(|c| !(c.kind == DatasetKind::Snapshot && c.path == name));
        if node.children.len() == before {
            return Err(StoreError::Destroy {
                name: name.to_string(),
                reason: "no such snapshot".to_string(),
            });
        }
        state.journal.push(MemoryOp::Destroyed(name.to_string()));
        Ok(())
    }

    fn snapshot_names(&self, dataset: &str) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        let Some(node) = find(&state.roots, dataset) else {
            return Err(StoreError::NoSuchDataset(dataset.to_string()));
        };
        Ok(node.snapshot_names())
    }
}
