//! Core engine for zfs-autosnap: snapshot naming, dataset selection, and
//! per-series retention enforcement.
//!
//! The storage layer is reached only through [`store::SnapshotStore`]; the
//! engine itself never touches a pool directly, which is what keeps the
//! whole decision path testable against [`store::MemoryStore`].

pub mod config;
pub mod dataset;
pub mod engine;
pub mod name;
pub mod retention;
pub mod select;
pub mod store;

pub use config::{ConfigError, ConfigFile, SeriesConfig};
pub use dataset::{Dataset, DatasetKind, PropertyValue};
pub use engine::{Engine, EngineError, EngineOptions, PairOutcome, RunReport};
pub use name::{NameError, SnapshotIdentity};
pub use retention::{RetentionDecision, evaluate};
pub use select::{SelectError, TargetSpec};
pub use store::{SnapshotStore, StoreError};
