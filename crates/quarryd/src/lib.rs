//! Bootstrap and service composition for a quarry search node.
//!
//! [`run`] turns process arguments into a running node: it validates the
//! data directory, loads the persistent [`NodeIdentity`], opens the cluster
//! config store, registers the node through the [`Registrar`] and serves a
//! composed axum router carrying the static UI, the REST API and the node
//! status endpoints.
//!
//! Every stage is reachable on its own for embedding and tests, and the
//! collaborators at each seam ([`Cfg`], [`ServerProbe`], [`AuthResolver`],
//! [`PartitionHandlers`], [`RestMount`], [`AssetSource`], [`HealthReporter`],
//! [`DiagnosticSource`]) are traits. Log output passes through a bounded
//! [`MsgRing`] so recent lines can be served over HTTP, and `SIGUSR2` dumps
//! thread and memory snapshots to stderr.

mod bootstrap;
mod cfg;
mod datadir;
mod diagnostics;
mod discovery;
mod files;
mod health;
mod identity;
mod msg_ring;
mod process;
mod registrar;
mod rest;
mod router;
mod stats;
mod telemetry;

pub use bootstrap::{
    BootstrapError, BootstrapOutcome, Collaborators, Node, bootstrap, bootstrap_with,
};
pub use cfg::{
    Cas, Cfg, CfgError, CfgHandle, CfgProvider, CfgStoreError, ConnectError, ConnectSpec,
    LocalCfg, MemProvider, OpenContext, SimpleFileProvider, builtin_providers, open_config,
    open_config_with,
};
pub use datadir::{DataDirStatus, PathError, ensure_data_dir};
pub use diagnostics::{
    DiagnosticSnapshot, DiagnosticSource, DumperError, DumperHandle, ProcfsDiagnostics, dump,
    spawn as spawn_dumper,
};
pub use discovery::{DiscoveredPartition, DiscoveryTable};
pub use health::{BootstrapStage, HealthReporter, StructuredHealthReporter};
pub use identity::{NodeIdentity, PersistenceError, ensure_identity, identity_path};
pub use msg_ring::{MsgRing, MsgRingError, MsgRingWriter};
pub use process::{LaunchError, run, version_line};
pub use registrar::{
    AuthError, AuthResolver, Credentials, HttpServerProbe, NodeDef, NodeDefs, NodeDefsKind,
    PLAN_KEY, Partition, PartitionHandlers, PlanPartition, PlanPartitionNode, PlanPartitions,
    ProbeError, ProbeTarget, ReconcileSummary, Registrar, RegistrarConfig, RegistrarDeps,
    RegistrarError, RegistrarState, ServerCheck, ServerProbe, ServerUrlError, UrlAuthResolver,
    join_node_defs, leave_node_defs, load_node_defs, load_plan, validate_server,
};
pub use rest::{DefaultRestMount, RestContext, RestMeta, RestMount, STATIC_PREFIX};
pub use router::{
    AssetChain, AssetSource, ComposedRouter, DirAssets, EmbeddedAssets, NSSTATS_PATH,
    NSSTATUS_PATH, NsStatsHandler, NsStatusHandler, REQUEST_COUNTER, RouteCompositionError,
    RoutePattern, RouteStage, RouteTable, STATICX_PREFIX, UI_ENTRY, UI_SECTIONS, asset_handler,
    compose_router,
};
pub use stats::{Counter, StatsRegistry};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
