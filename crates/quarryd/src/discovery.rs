//! Discovery table: the REST layer's view of partitions hosted by this node.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::info;

use crate::registrar::{Partition, PartitionHandlers};
use crate::stats::{Counter, StatsRegistry};

const DISCOVERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::discovery");

/// Public description of a registered partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPartition {
    /// Partition name.
    pub name: String,
    /// Owning index.
    pub index_name: String,
    /// Data source feeding the index.
    pub source_name: String,
}

/// Name to partition map fed by registrar callbacks.
///
/// Repeated callbacks for the same partition leave the table unchanged, so
/// at-least-once delivery from the registrar is safe.
#[derive(Debug)]
pub struct DiscoveryTable {
    entries: Mutex<BTreeMap<String, DiscoveredPartition>>,
    registrations: Arc<Counter>,
    unregistrations: Arc<Counter>,
}

impl DiscoveryTable {
    /// Builds an empty table publishing its counters into `stats`.
    #[must_use]
    pub fn new(stats: &StatsRegistry) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            registrations: stats.counter("discovery.registrations"),
            unregistrations: stats.counter("discovery.unregistrations"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DiscoveredPartition>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered partitions ordered by name.
    #[must_use]
    pub fn partitions(&self) -> Vec<DiscoveredPartition> {
        self.lock().values().cloned().collect()
    }

    /// Partition names grouped by index.
    #[must_use]
    pub fn indexes(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.lock().values() {
            grouped
                .entry(entry.index_name.clone())
                .or_default()
                .push(entry.name.clone());
        }
        grouped
    }

    /// Number of registered partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl PartitionHandlers for DiscoveryTable {
    fn on_partition_registered(&self, partition: &Partition) {
        let entry = DiscoveredPartition {
            name: partition.name.clone(),
            index_name: partition.index_name.clone(),
            source_name: partition.source_name.clone(),
        };
        let inserted = self.lock().insert(partition.name.clone(), entry).is_none();
        if inserted {
            self.registrations.incr();
            info!(
                target: DISCOVERY_TARGET,
                partition = %partition.name,
                index = %partition.index_name,
                "partition registered"
            );
        }
    }

    fn on_partition_unregistered(&self, partition: &Partition) {
        if self.lock().remove(&partition.name).is_some() {
            self.unregistrations.incr();
            info!(
                target: DISCOVERY_TARGET,
                partition = %partition.name,
                "partition unregistered"
            );
        }
    }
}
