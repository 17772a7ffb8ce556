//! Builds a [`RestContext`] over in-memory collaborators for router tests.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use quarry_config::RegisterMode;
use tempfile::TempDir;

use crate::cfg::{CfgHandle, LocalCfg};
use crate::diagnostics::DiagnosticSource;
use crate::discovery::DiscoveryTable;
use crate::identity::NodeIdentity;
use crate::msg_ring::MsgRing;
use crate::registrar::{Registrar, RegistrarConfig, RegistrarDeps, UrlAuthResolver};
use crate::rest::RestContext;
use crate::router::EmbeddedAssets;
use crate::stats::StatsRegistry;

use super::probe::ScriptedProbe;

/// Fixed identifier used by router fixtures.
pub const FIXTURE_UUID: &str = "0123456789abcdef0123456789abcdef";

/// Diagnostic source returning canned text.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedDiagnostics;

impl DiagnosticSource for FixedDiagnostics {
    fn threads(&self) -> io::Result<String> {
        Ok("tid=1 name=main\n".to_owned())
    }

    fn memory(&self) -> io::Result<String> {
        Ok("VmRSS: 1024 kB\n".to_owned())
    }
}

/// A REST context plus the handles tests inspect.
pub struct RestFixture {
    dir: TempDir,
    /// Store behind the context's config handle.
    pub cfg: Arc<LocalCfg>,
    /// Counters shared with the context.
    pub stats: Arc<StatsRegistry>,
    /// Log ring shared with the context.
    pub ring: Arc<MsgRing>,
    /// The context handed to router composition.
    pub context: RestContext,
}

impl RestFixture {
    /// Local-only node whose registrar has not been started.
    #[must_use]
    pub fn new() -> Self {
        Self::with_server(".")
    }

    /// Node configured with `server`, registrar not started.
    #[must_use]
    pub fn with_server(server: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let data_dir = Utf8Path::from_path(dir.path())
            .expect("utf-8 temp path")
            .to_path_buf();
        let cfg = Arc::new(LocalCfg::in_memory());
        let stats = Arc::new(StatsRegistry::new());
        let ring = Arc::new(MsgRing::new(io::sink(), 16).expect("ring"));
        let discovery = Arc::new(DiscoveryTable::new(&stats));
        let registrar = Arc::new(Registrar::new(
            RegistrarConfig {
                identity: NodeIdentity::new(FIXTURE_UUID.to_owned()),
                bind_http: "127.0.0.1:8094".to_owned(),
                server: server.to_owned(),
                data_dir: data_dir.clone(),
                tags: BTreeSet::new(),
                container: String::new(),
                weight: 1,
            },
            RegistrarDeps {
                cfg: cfg.clone(),
                handlers: discovery.clone(),
                probe: Arc::new(ScriptedProbe::reachable()),
                auth: Arc::new(UrlAuthResolver),
            },
        ));
        let context = RestContext {
            version: "0.0.0-test",
            started: Instant::now(),
            registrar,
            cfg: CfgHandle::new("mem", cfg.clone()),
            discovery,
            stats: Arc::clone(&stats),
            ring: Arc::clone(&ring),
            diagnostics: Arc::new(FixedDiagnostics),
            static_dir: data_dir.join("no-such-static-dir"),
            static_etag: String::new(),
            primary_assets: Arc::new(EmbeddedAssets::primary()),
            fallback_assets: Arc::new(EmbeddedAssets::fallback()),
        };
        Self {
            dir,
            cfg,
            stats,
            ring,
            context,
        }
    }

    /// Starts the registrar in `mode`.
    #[must_use]
    pub fn started(self, mode: RegisterMode) -> Self {
        self.context.registrar.start(mode).expect("registrar start");
        self
    }

    /// Serves `/static/` from `static_dir` instead of the embedded chain.
    #[must_use]
    pub fn with_static_dir(mut self, static_dir: Utf8PathBuf) -> Self {
        self.context.static_dir = static_dir;
        self
    }

    /// Attaches `etag` to static responses.
    #[must_use]
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.context.static_etag = etag.to_owned();
        self
    }

    /// Scratch directory owned by the fixture.
    #[must_use]
    pub fn scratch(&self) -> &Utf8Path {
        Utf8Path::from_path(self.dir.path()).expect("utf-8 temp path")
    }
}

impl Default for RestFixture {
    fn default() -> Self {
        Self::new()
    }
}
