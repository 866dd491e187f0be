//! Series configuration: load and validate the YAML config file.
//!
//! ```yaml
//! series:
//!   - label: hourly
//!     interval: 1h
//!     keep: 24
//!   - label: daily
//!     interval: 1day
//!     keep: 7
//! ```
//!
//! Intervals use humantime notation (`15m`, `1h`, `1day`). Validation is
//! fatal: a bad config aborts the run before any mutation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One retention series: take a snapshot labelled `label` whenever the
/// newest one is at least `interval` old, and keep the `keep` most recent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub label: String,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub keep: usize,
}

/// The config file root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub series: Vec<SeriesConfig>,
}

/// Load-time configuration failures. All fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config declares no series")]
    NoSeries,

    #[error("series #{index}: {problem}")]
    InvalidSeries { index: usize, problem: String },

    #[error("duplicate series label {0:?}")]
    DuplicateLabel(String),
}

impl ConfigFile {
    /// Read and validate a config file.
    ///
    /// # Errors
    ///
    /// Any I/O, parse, or validation failure; the caller aborts before
    /// touching the storage layer.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let conf: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        conf.validate()?;
        Ok(conf)
    }

    /// Validate every series entry.
    ///
    /// # Errors
    ///
    /// Empty series list, empty label, label containing `_` (the naming
    /// grammar reserves it), zero keep, zero interval, duplicate label.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series.is_empty() {
            return Err(ConfigError::NoSeries);
        }

        let mut seen = std::collections::BTreeSet::new();
        for (index, series) in self.series.iter().enumerate() {
            let problem = if series.label.is_empty() {
                Some("empty label".to_string())
            } else if series.label.contains('_') {
                Some(format!("label {:?} contains '_'", series.label))
            } else if series.keep == 0 {
                Some("keep must be > 0".to_string())
            } else if series.interval.is_zero() {
                Some("interval must be > 0".to_string())
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(ConfigError::InvalidSeries { index, problem });
            }
            if !seen.insert(series.label.as_str()) {
                return Err(ConfigError::DuplicateLabel(series.label.clone()));
            }
        }
        Ok(())
    }
}
