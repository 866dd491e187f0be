//! [`SnapshotStore`] backed by the `zfs`/`zpool` command-line utilities.
//!
//! The tool never links the pool layer directly; each store call is one
//! blocking subprocess invocation, and failures surface as [`StoreError`]
//! with the utility's stderr as the reason.

use autosnap_core::dataset::{Dataset, DatasetKind, PropertyValue};
use autosnap_core::store::{SnapshotStore, StoreError};
use std::collections::BTreeMap;
use std::process::Command;
use tracing::debug;

/// Production store shelling out to `zfs` and `zpool`.
pub struct ZfsCommandStore {
    zfs: String,
    zpool: String,
}

impl Default for ZfsCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ZfsCommandStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            zfs: "zfs".to_string(),
            zpool: "zpool".to_string(),
        }
    }

    /// Run a utility and return its stdout, or stderr as the error string.
    fn run(&self, bin: &str, args: &[&str]) -> Result<String, String> {
        debug!(bin, ?args, "running");
        let output = Command::new(bin)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run {bin}: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{bin} exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// One `name<TAB>type` row from `zfs list`.
fn parse_list_output(stdout: &str) -> Vec<(String, DatasetKind)> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?;
            let kind = match fields.next()? {
                "filesystem" => DatasetKind::Filesystem,
                "volume" => DatasetKind::Volume,
                "snapshot" => DatasetKind::Snapshot,
                _ => return None, // bookmarks and future types
            };
            Some((name.to_string(), kind))
        })
        .collect()
}

/// Fold `zfs get -H -o name,property,value,source all` rows into per-dataset
/// property maps. User properties are the ones whose name carries a ':'.
fn parse_get_output(stdout: &str) -> BTreeMap<String, Vec<(String, PropertyValue)>> {
    let mut props: BTreeMap<String, Vec<(String, PropertyValue)>> = BTreeMap::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        let [name, property, value, source] = fields[..] else {
            continue;
        };
        if source == "-" && !property.contains(':') {
            // read-only statistic, not a configured property
            continue;
        }
        props.entry(name.to_string()).or_default().push((
            property.to_string(),
            PropertyValue {
                value: value.to_string(),
                source: source.to_string(),
            },
        ));
    }
    props
}

/// Assemble the flat `zfs list` rows into an owned parent-owns-children tree.
///
/// Rows come sorted by name, so a parent always precedes its children; a
/// snapshot's parent is the dataset before its '@'.
fn build_tree(
    rows: Vec<(String, DatasetKind)>,
    mut props: BTreeMap<String, Vec<(String, PropertyValue)>>,
) -> Vec<Dataset> {
    fn attach(roots: &mut Vec<Dataset>, node: Dataset, parent: Option<&str>) {
        match parent {
            None => roots.push(node),
            Some(parent_path) => {
                if let Some(parent_node) = find_mut(roots, parent_path) {
                    parent_node.children.push(node);
                } else {
                    // Orphan (parent filtered out); keep it visible as a root.
                    roots.push(node);
                }
            }
        }
    }

    fn find_mut<'a>(nodes: &'a mut [Dataset], path: &str) -> Option<&'a mut Dataset> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            if path.starts_with(&node.path)
                && path.as_bytes().get(node.path.len()).is_some_and(|b| *b == b'/' || *b == b'@')
            {
                return find_mut(&mut node.children, path);
            }
        }
        None
    }

    let mut roots = Vec::new();
    for (path, kind) in rows {
        let mut node = Dataset::new(path.clone(), kind);
        for (prop_name, value) in props.remove(&path).unwrap_or_default() {
            if prop_name.contains(':') {
                node.user_properties.insert(prop_name, value);
            } else {
                node.properties.insert(prop_name, value);
            }
        }

        let parent = match path.rfind('@') {
            Some(at) => Some(&path[..at]),
            None => path.rfind('/').map(|slash| &path[..slash]),
        };
        attach(&mut roots, node, parent);
    }
    roots
}

/// Whether a `zpool status` dump reports an active scan (scrub or resilver).
fn scan_in_progress(status: &str) -> bool {
    status.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("scan:") && line.contains("in progress")
    })
}

impl SnapshotStore for ZfsCommandStore {
    fn load_mirror(&self) -> Result<Vec<Dataset>, StoreError> {
        let list = self
            .run(
                &self.zfs,
                &[
                    "list",
                    "-H",
                    "-t",
                    "filesystem,volume,snapshot",
                    "-o",
                    "name,type",
                    "-s",
                    "name",
                ],
            )
            .map_err(StoreError::List)?;
        // Property sources only matter for filesystems and volumes; snapshot
        // leaves are carried for their names alone.
        let get = self
            .run(
                &self.zfs,
                &[
                    "get",
                    "-H",
                    "-t",
                    "filesystem,volume",
                    "-o",
                    "name,property,value,source",
                    "all",
                ],
            )
            .map_err(StoreError::List)?;
        Ok(build_tree(parse_list_output(&list), parse_get_output(&get)))
    }

    fn pool_scanning(&self, pool: &str) -> Result<bool, StoreError> {
        let status = self
            .run(&self.zpool, &["status", pool])
            .map_err(|reason| StoreError::PoolState {
                pool: pool.to_string(),
                reason,
            })?;
        Ok(scan_in_progress(&status))
    }

    fn create_snapshot(
        &self,
        name: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut args = vec!["snapshot".to_string()];
        for (key, value) in props {
            args.push("-o".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(name.to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&self.zfs, &args)
            .map(|_| ())
            .map_err(|reason| StoreError::Create {
                name: name.to_string(),
                reason,
            })
    }

    fn destroy_snapshot(&self, name: &str, recursive: bool) -> Result<(), StoreError> {
        let mut args = vec!["destroy"];
        if recursive {
            args.push("-r");
        }
        args.push(name);
        self.run(&self.zfs, &args)
            .map(|_| ())
            .map_err(|reason| StoreError::Destroy {
                name: name.to_string(),
                reason,
            })
    }

    fn snapshot_names(&self, dataset: &str) -> Result<Vec<String>, StoreError> {
        let stdout = self
            .run(
                &self.zfs,
                &["list", "-H", "-t", "snapshot", "-o", "name", "-d", "1", dataset],
            )
            .map_err(StoreError::List)?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}
