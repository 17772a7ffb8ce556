//! Index partitions: the plan read from the config store and the on-disk layout.
//!
//! Each partition hosted by the node lives in `<data_dir>/<name>.pindex` with
//! a `PINDEX_META` JSON file describing it. The contents beyond that file
//! belong to the index engine and are opaque here.

use std::collections::BTreeMap;
use std::fs::{self, DirBuilder};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::REGISTRAR_TARGET;
use super::errors::RegistrarError;
use super::nodedefs::read_document;
use crate::cfg::Cfg;
use crate::files::atomic_write;

/// Config store key holding the partition plan.
pub const PLAN_KEY: &str = "planPIndexes";

const PARTITION_SUFFIX: &str = ".pindex";
const PARTITION_META: &str = "PINDEX_META";

/// A unit of index ownership hosted by this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Unique partition name.
    pub name: String,
    /// Index the partition belongs to.
    pub index_name: String,
    /// Data source feeding the index.
    #[serde(default)]
    pub source_name: String,
    /// Directory holding the partition.
    #[serde(skip)]
    pub path: Utf8PathBuf,
}

/// Capability implemented by the composition root to learn about partition changes.
///
/// Calls may repeat for the same partition; implementations must be idempotent.
pub trait PartitionHandlers: Send + Sync {
    /// A partition became available on this node.
    fn on_partition_registered(&self, partition: &Partition);

    /// A partition is no longer hosted by this node.
    fn on_partition_unregistered(&self, partition: &Partition);
}

/// The planner's assignment of partitions to nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPartitions {
    /// Changes whenever the plan is rewritten.
    #[serde(default)]
    pub uuid: String,
    /// Planned partitions keyed by name.
    #[serde(default, rename = "planPIndexes")]
    pub plan_partitions: BTreeMap<String, PlanPartition>,
    /// Data layout version of the planner.
    #[serde(default)]
    pub impl_version: String,
}

/// One planned partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPartition {
    /// Partition name.
    pub name: String,
    /// Owning index.
    pub index_name: String,
    /// Data source feeding the index.
    #[serde(default)]
    pub source_name: String,
    /// Assigned nodes keyed by UUID.
    #[serde(default)]
    pub nodes: BTreeMap<String, PlanPartitionNode>,
}

/// A node's role for one planned partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPartitionNode {
    /// Serves queries.
    #[serde(default)]
    pub can_read: bool,
    /// Accepts mutations.
    #[serde(default)]
    pub can_write: bool,
    /// Zero is the primary; higher numbers are replicas.
    #[serde(default)]
    pub priority: i32,
}

impl PlanPartitions {
    /// Planned partitions that list `uuid` among their nodes.
    pub fn assigned_to<'a>(&'a self, uuid: &'a str) -> impl Iterator<Item = &'a PlanPartition> {
        self.plan_partitions
            .values()
            .filter(move |planned| planned.nodes.contains_key(uuid))
    }
}

/// Reads the plan, or `None` when no plan has been written yet.
pub fn load_plan(cfg: &dyn Cfg) -> Result<Option<PlanPartitions>, RegistrarError> {
    Ok(read_document(cfg, PLAN_KEY)?.map(|(plan, _)| plan))
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

pub(super) fn partition_dir(data_dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    data_dir.join(format!("{name}{PARTITION_SUFFIX}"))
}

/// Lists partitions already present in `data_dir`, skipping unreadable ones.
pub(super) fn scan_partitions(data_dir: &Utf8Path) -> Result<Vec<Partition>, RegistrarError> {
    let entries = data_dir
        .read_dir_utf8()
        .map_err(|source| RegistrarError::PartitionStorage {
            path: data_dir.to_path_buf(),
            source,
        })?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RegistrarError::PartitionStorage {
            path: data_dir.to_path_buf(),
            source,
        })?;
        if !entry.file_name().ends_with(PARTITION_SUFFIX) || !entry.path().is_dir() {
            continue;
        }
        match read_meta(entry.path()) {
            Ok(partition) => found.push(partition),
            Err(error) => warn!(
                target: REGISTRAR_TARGET,
                dir = %entry.path(),
                error = %error,
                "skipping unreadable partition"
            ),
        }
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

fn read_meta(dir: &Utf8Path) -> Result<Partition, io::Error> {
    let bytes = fs::read(dir.join(PARTITION_META))?;
    let mut partition: Partition = serde_json::from_slice(&bytes)?;
    partition.path = dir.to_path_buf();
    Ok(partition)
}

/// Creates the directory and metadata for a planned partition.
pub(super) fn create_partition(
    data_dir: &Utf8Path,
    planned: &PlanPartition,
) -> Result<Partition, RegistrarError> {
    if !is_safe_name(&planned.name) {
        return Err(RegistrarError::PartitionStorage {
            path: data_dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("partition name '{}' is not a plain file name", planned.name),
            ),
        });
    }
    let dir = partition_dir(data_dir, &planned.name);
    let storage = |source| RegistrarError::PartitionStorage {
        path: dir.clone(),
        source,
    };
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(&dir).map_err(storage)?;
    let partition = Partition {
        name: planned.name.clone(),
        index_name: planned.index_name.clone(),
        source_name: planned.source_name.clone(),
        path: dir.clone(),
    };
    let meta = serde_json::to_vec_pretty(&partition).map_err(|error| storage(error.into()))?;
    atomic_write(dir.join(PARTITION_META).as_std_path(), &meta).map_err(storage)?;
    Ok(partition)
}

/// Deletes a partition directory; a missing directory is not an error.
pub(super) fn remove_partition(partition: &Partition) -> Result<(), RegistrarError> {
    match fs::remove_dir_all(&partition.path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RegistrarError::PartitionStorage {
            path: partition.path.clone(),
            source,
        }),
    }
}
