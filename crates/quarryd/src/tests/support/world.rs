//! BDD test world: a scratch data directory, a shared config store and the
//! outcome of running the bootstrap sequence against them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use quarry_config::{NODE_NAMESPACE, StartupConfig};
use tempfile::TempDir;

use crate::bootstrap::{BootstrapError, BootstrapOutcome, Collaborators, bootstrap_with};
use crate::cfg::{Cfg, LocalCfg};
use crate::identity::identity_path;
use crate::msg_ring::MsgRing;
use crate::registrar::{
    NodeDefsKind, PLAN_KEY, PlanPartition, PlanPartitionNode, PlanPartitions, load_node_defs,
};
use crate::stats::StatsRegistry;

use super::context::FixedDiagnostics;
use super::probe::ScriptedProbe;
use super::provider::SharedStoreProvider;
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    dir: TempDir,
    data_dir: Utf8PathBuf,
    server: String,
    register: String,
    /// Store every bootstrap in this world opens.
    pub cfg: Arc<LocalCfg>,
    /// Probe answering server validation.
    pub probe: Arc<ScriptedProbe>,
    /// Health events of the most recent bootstrap.
    pub reporter: Arc<RecordingHealthReporter>,
    /// Counters of the most recent bootstrap.
    pub stats: Arc<StatsRegistry>,
    outcome: Option<Result<BootstrapOutcome, BootstrapError>>,
    previous_uuids: Vec<String>,
}

impl TestWorld {
    /// A local-only node in `wanted` mode with an existing data directory.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let data_dir = Utf8Path::from_path(dir.path())
            .expect("utf-8 temp path")
            .join("node");
        std::fs::create_dir(&data_dir).expect("create data dir");
        Self {
            dir,
            data_dir,
            server: ".".to_owned(),
            register: "wanted".to_owned(),
            cfg: Arc::new(LocalCfg::in_memory()),
            probe: Arc::new(ScriptedProbe::reachable()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            stats: Arc::new(StatsRegistry::new()),
            outcome: None,
            previous_uuids: Vec::new(),
        }
    }

    /// Points the node at a data directory that does not exist.
    pub fn use_missing_data_dir(&mut self) {
        self.data_dir = self.scratch().join("absent");
    }

    /// Sets the `--server` argument.
    pub fn set_server(&mut self, server: &str) {
        server.clone_into(&mut self.server);
    }

    /// Sets the `--register` argument.
    pub fn set_register(&mut self, mode: &str) {
        mode.clone_into(&mut self.register);
    }

    /// Makes every server probe fail with `status`.
    pub fn fail_probes(&mut self, status: u16) {
        self.probe = Arc::new(ScriptedProbe::failing(status));
    }

    /// Writes an identity file before bootstrap runs.
    pub fn write_identity(&self, uuid: &str) {
        std::fs::write(identity_path(NODE_NAMESPACE, &self.data_dir), uuid)
            .expect("write identity");
    }

    /// Stores a plan assigning `partition` of index `beers` to `uuid`.
    pub fn write_plan(&self, partition: &str, uuid: &str) {
        let mut plan = PlanPartitions::default();
        let mut nodes = BTreeMap::new();
        nodes.insert(uuid.to_owned(), PlanPartitionNode::default());
        plan.plan_partitions.insert(
            partition.to_owned(),
            PlanPartition {
                name: partition.to_owned(),
                index_name: "beers".to_owned(),
                source_name: String::new(),
                nodes,
            },
        );
        let encoded = serde_json::to_vec(&plan).expect("encode plan");
        self.cfg.set(PLAN_KEY, &encoded, 0).expect("write plan");
    }

    /// Runs the bootstrap sequence, replacing any earlier outcome.
    pub fn bootstrap(&mut self) {
        if let Some(uuid) = self.uuid() {
            self.previous_uuids.push(uuid);
        }
        self.outcome = None;
        let args = [
            "quarryd".to_owned(),
            format!("--data-dir={}", self.data_dir),
            "--cfg-connect=mem".to_owned(),
            format!("--server={}", self.server),
            format!("--register={}", self.register),
            "--bind-http=127.0.0.1:0".to_owned(),
            format!("--static-dir={}", self.scratch().join("static")),
        ];
        let config = StartupConfig::load_from_iter(args).expect("startup config");
        self.reporter = Arc::new(RecordingHealthReporter::default());
        self.stats = Arc::new(StatsRegistry::new());
        let ring = Arc::new(MsgRing::new(io::sink(), 16).expect("ring"));
        let collaborators = Collaborators {
            providers: vec![Box::new(SharedStoreProvider::new(Arc::clone(&self.cfg)))],
            probe: self.probe.clone(),
            reporter: self.reporter.clone(),
            diagnostics: Arc::new(FixedDiagnostics),
            ..Collaborators::system()
        };
        self.outcome = Some(bootstrap_with(
            &config,
            ring,
            Arc::clone(&self.stats),
            collaborators,
        ));
    }

    /// The bootstrapped outcome, if bootstrap succeeded.
    #[must_use]
    pub fn outcome(&self) -> Option<&BootstrapOutcome> {
        self.outcome.as_ref().and_then(|result| result.as_ref().ok())
    }

    /// The bootstrap error, if bootstrap failed.
    #[must_use]
    pub fn error(&self) -> Option<&BootstrapError> {
        self.outcome.as_ref().and_then(|result| result.as_ref().err())
    }

    /// UUID of the node from the most recent successful bootstrap.
    #[must_use]
    pub fn uuid(&self) -> Option<String> {
        self.outcome()
            .map(|outcome| outcome.node().identity().uuid().to_owned())
    }

    /// UUIDs of earlier successful bootstraps in this world.
    #[must_use]
    pub fn previous_uuids(&self) -> &[String] {
        &self.previous_uuids
    }

    /// Data directory passed to bootstrap.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    /// Returns `true` when `uuid` is listed in the `kind` node definitions.
    #[must_use]
    pub fn member_of(&self, kind: NodeDefsKind, uuid: &str) -> bool {
        let (defs, _) = load_node_defs(self.cfg.as_ref(), kind).expect("load node defs");
        defs.node_defs.contains_key(uuid)
    }

    fn scratch(&self) -> &Utf8Path {
        Utf8Path::from_path(self.dir.path()).expect("utf-8 temp path")
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
