//! Session-scoped mirror of the dataset tree.
//!
//! The storage layer is the authoritative store; the engine builds this
//! owned parent-owns-children tree once per run and discards it at exit.
//! Nothing here is ever persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The dataset variants the storage layer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Filesystem,
    Volume,
    /// Leaf-only variant: never expanded into, never a snapshot target.
    Snapshot,
}

impl DatasetKind {
    /// Returns `true` for the kinds that can be snapshotted.
    #[must_use]
    pub const fn is_target_kind(self) -> bool {
        matches!(self, Self::Filesystem | Self::Volume)
    }
}

/// A property value together with where it came from (`local`, `inherited`,
/// `default`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub value: String,
    pub source: String,
}

/// One node of the mirrored dataset tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Hierarchical `/`-delimited path; the pool name is the root segment.
    pub path: String,
    pub kind: DatasetKind,
    /// System-managed properties.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    /// User properties (always strings, up to 1024 characters).
    #[serde(default)]
    pub user_properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub children: Vec<Dataset>,
}

impl Dataset {
    /// Construct a bare node with no properties or children.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: DatasetKind) -> Self {
        Self {
            path: path.into(),
            kind,
            properties: BTreeMap::new(),
            user_properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// The pool this dataset lives on: the root segment of its path.
    #[must_use]
    pub fn pool(&self) -> &str {
        // Snapshot paths carry a '@'; the pool segment precedes both
        // delimiters.
        let end = self
            .path
            .find(['/', '@'])
            .unwrap_or(self.path.len());
        &self.path[..end]
    }

    /// Preorder traversal over this dataset and all descendants, snapshot
    /// leaves included.
    pub fn iter(&self) -> DatasetIter<'_> {
        DatasetIter { stack: vec![self] }
    }

    /// Names of this dataset's direct snapshot children.
    #[must_use]
    pub fn snapshot_names(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|c| c.kind == DatasetKind::Snapshot)
            .map(|c| c.path.clone())
            .collect()
    }
}

/// Lazy preorder iterator over a dataset subtree.
///
/// Replaces the callback-style visitor the exclusion and traversal logic
/// would otherwise need; finite and non-restartable per run.
pub struct DatasetIter<'a> {
    stack: Vec<&'a Dataset>,
}

impl<'a> Iterator for DatasetIter<'a> {
    type Item = &'a Dataset;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Reverse so children come back out in declaration order.
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
