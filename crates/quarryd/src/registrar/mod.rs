//! Cluster registrar: validates the server, joins the topology and tracks hosted partitions.
//!
//! The registrar moves through `Unstarted → ValidatingServer → Registering →
//! Running`, or ends in `Failed`. Partition changes found while reconciling
//! against the plan are reported to the injected [`PartitionHandlers`]
//! outside any internal lock.

mod errors;
mod nodedefs;
mod partitions;
mod server;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use quarry_config::{DATA_VERSION, RegisterMode, StartupConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cfg::Cfg;
use crate::identity::NodeIdentity;

pub use errors::{RegistrarError, ServerUrlError};
pub use nodedefs::{
    NodeDef, NodeDefs, NodeDefsKind, join_node_defs, leave_node_defs, load_node_defs,
};
pub use partitions::{
    PLAN_KEY, Partition, PartitionHandlers, PlanPartition, PlanPartitionNode, PlanPartitions,
    load_plan,
};
pub use server::{
    AuthError, AuthResolver, Credentials, HttpServerProbe, ProbeError, ProbeTarget, ServerCheck,
    ServerProbe, UrlAuthResolver, validate_server,
};

pub(crate) const REGISTRAR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registrar");

/// Tag that allows a node to host index partitions.
const PARTITION_TAG: &str = "pindex";

/// Lifecycle of the registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrarState {
    /// `start` has not been called.
    Unstarted,
    /// Checking the cluster server argument.
    ValidatingServer,
    /// Writing node definitions.
    Registering,
    /// Registered; partitions are being tracked.
    Running,
    /// Startup failed; the registrar is unusable.
    Failed,
}

/// Node facts published into the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarConfig {
    /// Node identity.
    pub identity: NodeIdentity,
    /// Advertised REST address.
    pub bind_http: String,
    /// Cluster server argument.
    pub server: String,
    /// Validated data directory.
    pub data_dir: Utf8PathBuf,
    /// Node tags; empty means every role.
    pub tags: BTreeSet<String>,
    /// Placement container path.
    pub container: String,
    /// Placement weight.
    pub weight: u32,
}

impl RegistrarConfig {
    /// Collects the registrar's inputs from the startup snapshot.
    #[must_use]
    pub fn from_startup(config: &StartupConfig, identity: NodeIdentity) -> Self {
        Self {
            identity,
            bind_http: config.bind_http.clone(),
            server: config.server.clone(),
            data_dir: config.data_dir.clone(),
            tags: config.tag_set(),
            container: config.container.clone(),
            weight: config.weight,
        }
    }

    /// This node's definition as stored in the topology sets.
    #[must_use]
    pub fn node_def(&self) -> NodeDef {
        NodeDef {
            uuid: self.identity.uuid().to_owned(),
            host_port: self.bind_http.clone(),
            tags: self.tags.iter().cloned().collect(),
            container: self.container.clone(),
            weight: self.weight,
            impl_version: DATA_VERSION.to_owned(),
        }
    }

    fn hosts_partitions(&self) -> bool {
        self.tags.is_empty() || self.tags.contains(PARTITION_TAG)
    }
}

/// Partitions added and removed by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Names of newly registered partitions.
    pub registered: Vec<String>,
    /// Names of unregistered partitions.
    pub unregistered: Vec<String>,
}

/// Collaborators the registrar calls into.
#[derive(Clone)]
pub struct RegistrarDeps {
    /// Cluster config store.
    pub cfg: Arc<dyn Cfg>,
    /// Receives partition lifecycle callbacks.
    pub handlers: Arc<dyn PartitionHandlers>,
    /// Connectivity probe for the cluster server.
    pub probe: Arc<dyn ServerProbe>,
    /// Resolves server credentials.
    pub auth: Arc<dyn AuthResolver>,
}

/// Joins the node to the cluster topology and tracks the partitions it hosts.
pub struct Registrar {
    config: RegistrarConfig,
    deps: RegistrarDeps,
    state: Mutex<RegistrarState>,
    mode: Mutex<Option<RegisterMode>>,
    partitions: Mutex<BTreeMap<String, Partition>>,
}

impl Registrar {
    /// Builds an unstarted registrar.
    #[must_use]
    pub fn new(config: RegistrarConfig, deps: RegistrarDeps) -> Self {
        Self {
            config,
            deps,
            state: Mutex::new(RegistrarState::Unstarted),
            mode: Mutex::new(None),
            partitions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RegistrarState {
        *lock(&self.state)
    }

    /// Register mode passed to [`Registrar::start`], once started.
    #[must_use]
    pub fn mode(&self) -> Option<RegisterMode> {
        *lock(&self.mode)
    }

    /// Inputs the registrar was built with.
    #[must_use]
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// The config store the registrar writes to.
    #[must_use]
    pub fn cfg(&self) -> Arc<dyn Cfg> {
        Arc::clone(&self.deps.cfg)
    }

    /// Snapshot of the hosted partitions, ordered by name.
    #[must_use]
    pub fn partitions(&self) -> Vec<Partition> {
        lock(&self.partitions).values().cloned().collect()
    }

    /// Validates the server, applies `mode` to the topology and reconciles partitions.
    ///
    /// In `unknown` mode the node leaves both topology sets and no partition
    /// is loaded or reported; the caller is expected to exit afterwards. A
    /// node outside the wanted set, or without the partition tag, leaves its
    /// partition directories alone.
    pub fn start(&self, mode: RegisterMode) -> Result<(), RegistrarError> {
        {
            let mut state = lock(&self.state);
            if *state != RegistrarState::Unstarted {
                return Err(RegistrarError::AlreadyStarted);
            }
            *state = RegistrarState::ValidatingServer;
        }
        *lock(&self.mode) = Some(mode);
        match self.run_start(mode) {
            Ok(()) => {
                self.transition(RegistrarState::Running);
                info!(
                    target: REGISTRAR_TARGET,
                    uuid = %self.config.identity,
                    mode = %mode,
                    "registrar running"
                );
                Ok(())
            }
            Err(error) => {
                self.transition(RegistrarState::Failed);
                Err(error)
            }
        }
    }

    fn run_start(&self, mode: RegisterMode) -> Result<(), RegistrarError> {
        let check = validate_server(
            &self.config.server,
            self.deps.auth.as_ref(),
            self.deps.probe.as_ref(),
        )?;
        debug!(target: REGISTRAR_TARGET, ?check, "server validated");

        self.transition(RegistrarState::Registering);
        self.register(mode)?;
        if mode.exits_after_validation() {
            return Ok(());
        }
        if !self.hosts_partitions_in(mode) {
            debug!(
                target: REGISTRAR_TARGET,
                mode = %mode,
                "node does not host partitions; leaving partition storage untouched"
            );
            return Ok(());
        }

        let loaded = partitions::scan_partitions(&self.config.data_dir)?;
        let mut fresh = Vec::new();
        {
            let mut hosted = lock(&self.partitions);
            for partition in loaded {
                if !hosted.contains_key(&partition.name) {
                    hosted.insert(partition.name.clone(), partition.clone());
                    fresh.push(partition);
                }
            }
        }
        for partition in &fresh {
            self.deps.handlers.on_partition_registered(partition);
        }
        self.reconcile()?;
        Ok(())
    }

    fn register(&self, mode: RegisterMode) -> Result<(), RegistrarError> {
        let cfg = self.deps.cfg.as_ref();
        let def = self.config.node_def();
        let uuid = self.config.identity.uuid();
        if mode.joins_known() {
            join_node_defs(cfg, NodeDefsKind::Known, &def, mode.is_force())?;
        } else if mode == RegisterMode::Unknown {
            leave_node_defs(cfg, NodeDefsKind::Known, uuid, DATA_VERSION)?;
        }
        if mode.joins_wanted() {
            join_node_defs(cfg, NodeDefsKind::Wanted, &def, mode.is_force())?;
        } else if matches!(mode, RegisterMode::Unwanted | RegisterMode::Unknown) {
            leave_node_defs(cfg, NodeDefsKind::Wanted, uuid, DATA_VERSION)?;
        }
        Ok(())
    }

    /// Whether this node stores partitions while registered in `mode`.
    fn hosts_partitions_in(&self, mode: RegisterMode) -> bool {
        mode.joins_wanted() && self.config.hosts_partitions()
    }

    /// Re-reads the config store and reconciles hosted partitions with the plan.
    pub fn kick(&self, reason: &str) -> Result<ReconcileSummary, RegistrarError> {
        if self.state() != RegistrarState::Running {
            return Err(RegistrarError::NotRunning);
        }
        let Some(mode) = self.mode() else {
            return Err(RegistrarError::NotRunning);
        };
        info!(target: REGISTRAR_TARGET, reason, "registrar kicked");
        self.deps
            .cfg
            .refresh()
            .map_err(|source| RegistrarError::Store {
                key: PLAN_KEY.to_owned(),
                source,
            })?;
        if mode.exits_after_validation() || !self.hosts_partitions_in(mode) {
            return Ok(ReconcileSummary::default());
        }
        self.reconcile()
    }

    /// Only called for modes that host partitions; other nodes never touch
    /// partition storage.
    fn reconcile(&self) -> Result<ReconcileSummary, RegistrarError> {
        let Some(plan) = load_plan(self.deps.cfg.as_ref())? else {
            debug!(target: REGISTRAR_TARGET, "no partition plan yet");
            return Ok(ReconcileSummary::default());
        };
        let uuid = self.config.identity.uuid();
        let wanted: BTreeMap<&str, &PlanPartition> = plan
            .assigned_to(uuid)
            .map(|planned| (planned.name.as_str(), planned))
            .collect();

        let stale: Vec<Partition> = lock(&self.partitions)
            .values()
            .filter(|partition| !wanted.contains_key(partition.name.as_str()))
            .cloned()
            .collect();
        let mut summary = ReconcileSummary::default();
        for partition in stale {
            partitions::remove_partition(&partition)?;
            lock(&self.partitions).remove(&partition.name);
            self.deps.handlers.on_partition_unregistered(&partition);
            summary.unregistered.push(partition.name);
        }

        for (name, planned) in wanted {
            if lock(&self.partitions).contains_key(name) {
                continue;
            }
            let partition = match partitions::create_partition(&self.config.data_dir, planned) {
                Ok(partition) => partition,
                Err(error) => {
                    warn!(
                        target: REGISTRAR_TARGET,
                        partition = name,
                        error = %error,
                        "failed to create planned partition"
                    );
                    return Err(error);
                }
            };
            lock(&self.partitions).insert(partition.name.clone(), partition.clone());
            self.deps.handlers.on_partition_registered(&partition);
            summary.registered.push(partition.name);
        }
        if !summary.registered.is_empty() || !summary.unregistered.is_empty() {
            info!(
                target: REGISTRAR_TARGET,
                registered = summary.registered.len(),
                unregistered = summary.unregistered.len(),
                "partitions reconciled"
            );
        }
        Ok(summary)
    }

    fn transition(&self, next: RegistrarState) {
        let mut state = lock(&self.state);
        debug!(target: REGISTRAR_TARGET, from = ?*state, to = ?next, "registrar state change");
        *state = next;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
