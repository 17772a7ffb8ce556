//! REST API mount: the second router composition stage.

mod handlers;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{MethodRouter, get, post};
use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::debug;

use crate::cfg::CfgHandle;
use crate::diagnostics::DiagnosticSource;
use crate::discovery::DiscoveryTable;
use crate::msg_ring::MsgRing;
use crate::registrar::Registrar;
use crate::router::{
    AssetChain, AssetSource, DirAssets, ROUTER_TARGET, RouteCompositionError, RoutePattern,
    RouteTable, asset_handler,
};
use crate::stats::StatsRegistry;

/// Prefix of the overridable static asset tree.
pub const STATIC_PREFIX: &str = "/static/";

/// Describes one mounted REST route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestMeta {
    /// Route path or subtree prefix.
    pub path: String,
    /// HTTP method.
    pub method: &'static str,
    /// One-line summary.
    pub description: &'static str,
}

/// Everything the REST handlers read from.
#[derive(Clone)]
pub struct RestContext {
    /// Binary version reported by `/api/version`.
    pub version: &'static str,
    /// Process start, for uptime.
    pub started: Instant,
    /// The running registrar.
    pub registrar: Arc<Registrar>,
    /// Opened config store.
    pub cfg: CfgHandle,
    /// Partitions registered with this node.
    pub discovery: Arc<DiscoveryTable>,
    /// Process counters.
    pub stats: Arc<StatsRegistry>,
    /// Recent log lines.
    pub ring: Arc<MsgRing>,
    /// Thread and memory snapshots for `/api/diag`.
    pub diagnostics: Arc<dyn DiagnosticSource>,
    /// Directory overriding the embedded static assets when it exists.
    pub static_dir: Utf8PathBuf,
    /// ETag attached to static responses; empty disables it.
    pub static_etag: String,
    /// Assets served under `/staticx/` and consulted first for `/static/`.
    pub primary_assets: Arc<dyn AssetSource>,
    /// Assets consulted when the primary set lacks a file.
    pub fallback_assets: Arc<dyn AssetSource>,
}

impl fmt::Debug for RestContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestContext")
            .field("version", &self.version)
            .field("cfg", &self.cfg)
            .field("static_dir", &self.static_dir)
            .field("static_etag", &self.static_etag)
            .finish_non_exhaustive()
    }
}

/// Contributes the REST stage to the route table.
pub trait RestMount: Send + Sync {
    /// Binds routes into `table` and describes what was bound.
    fn mount(
        &self,
        table: &mut RouteTable,
        context: &RestContext,
    ) -> Result<Vec<RestMeta>, RouteCompositionError>;
}

/// The in-tree REST API.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRestMount;

impl DefaultRestMount {
    fn static_source(context: &RestContext) -> Arc<dyn AssetSource> {
        if context.static_dir.is_dir() {
            debug!(
                target: ROUTER_TARGET,
                static_dir = %context.static_dir,
                "serving /static/ from disk"
            );
            Arc::new(DirAssets::new(context.static_dir.clone()))
        } else {
            Arc::new(AssetChain::new(vec![
                Arc::clone(&context.primary_assets),
                Arc::clone(&context.fallback_assets),
            ]))
        }
    }

    fn api_routes(context: &RestContext) -> Vec<(RestMeta, MethodRouter)> {
        let route = |path: &str, method, description, handler: MethodRouter| {
            (
                RestMeta {
                    path: path.to_owned(),
                    method,
                    description,
                },
                handler,
            )
        };
        let state = context.clone();
        vec![
            route(
                "/api/version",
                "GET",
                "binary and data layout versions",
                get(handlers::version).with_state(state.clone()),
            ),
            route(
                "/api/runtime",
                "GET",
                "process and platform information",
                get(handlers::runtime).with_state(state.clone()),
            ),
            route(
                "/api/log",
                "GET",
                "recent log messages",
                get(handlers::log).with_state(state.clone()),
            ),
            route(
                "/api/cfg",
                "GET",
                "cluster config store contents",
                get(handlers::cfg).with_state(state.clone()),
            ),
            route(
                "/api/cfgRefresh",
                "POST",
                "reload the cluster config store",
                post(handlers::cfg_refresh).with_state(state.clone()),
            ),
            route(
                "/api/managerKick",
                "POST",
                "reconcile hosted partitions with the plan",
                post(handlers::manager_kick).with_state(state.clone()),
            ),
            route(
                "/api/index",
                "GET",
                "indexes and partitions hosted by this node",
                get(handlers::index).with_state(state.clone()),
            ),
            route(
                "/api/diag",
                "GET",
                "combined diagnostics",
                get(handlers::diag).with_state(state.clone()),
            ),
            route(
                "/api/stats",
                "GET",
                "process counters",
                get(handlers::stats).with_state(state),
            ),
        ]
    }
}

impl RestMount for DefaultRestMount {
    fn mount(
        &self,
        table: &mut RouteTable,
        context: &RestContext,
    ) -> Result<Vec<RestMeta>, RouteCompositionError> {
        let mut meta = Vec::new();
        table.bind(
            RoutePattern::subtree(STATIC_PREFIX),
            asset_handler(
                STATIC_PREFIX,
                Self::static_source(context),
                &context.static_etag,
            ),
        )?;
        meta.push(RestMeta {
            path: STATIC_PREFIX.to_owned(),
            method: "GET",
            description: "static UI assets",
        });
        for (entry, handler) in Self::api_routes(context) {
            table.bind(RoutePattern::exact(entry.path.clone()), handler)?;
            meta.push(entry);
        }
        Ok(meta)
    }
}
