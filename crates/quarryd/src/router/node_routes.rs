//! Stage three: node statistics and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use quarry_config::{LOCAL_ONLY_SERVER, redact_password};
use serde_json::json;
use url::Url;

use super::errors::RouteCompositionError;
use super::json_error;
use super::table::{RoutePattern, RouteTable};
use crate::registrar::{NodeDefsKind, Registrar, load_node_defs};
use crate::stats::StatsRegistry;

/// Path of the node statistics endpoint.
pub const NSSTATS_PATH: &str = "/api/nsstats";

/// Path of the node status endpoint.
pub const NSSTATUS_PATH: &str = "/api/nsstatus";

/// Serves counters together with the hosted partitions.
#[derive(Clone)]
pub struct NsStatsHandler {
    stats: Arc<StatsRegistry>,
    registrar: Arc<Registrar>,
}

impl NsStatsHandler {
    /// Builds the handler.
    #[must_use]
    pub const fn new(stats: Arc<StatsRegistry>, registrar: Arc<Registrar>) -> Self {
        Self { stats, registrar }
    }

    /// Wraps the handler for binding.
    #[must_use]
    pub fn into_route(self) -> MethodRouter {
        get(nsstats).with_state(self)
    }
}

async fn nsstats(State(handler): State<NsStatsHandler>) -> Response {
    let partitions: Vec<_> = handler
        .registrar
        .partitions()
        .into_iter()
        .map(|partition| {
            json!({
                "name": partition.name,
                "indexName": partition.index_name,
                "sourceName": partition.source_name,
            })
        })
        .collect();
    Json(json!({
        "counters": handler.stats.snapshot(),
        "partitions": partitions,
    }))
    .into_response()
}

/// Reports the node's registration and the cluster membership it sees.
#[derive(Clone)]
pub struct NsStatusHandler {
    server: Option<Url>,
    registrar: Arc<Registrar>,
}

impl NsStatusHandler {
    /// Builds the handler, parsing `server` unless it is the local-only sentinel.
    pub fn new(server: &str, registrar: Arc<Registrar>) -> Result<Self, RouteCompositionError> {
        let server = if server == LOCAL_ONLY_SERVER {
            None
        } else {
            let url = Url::parse(server).map_err(|source| RouteCompositionError::Handler {
                route: NSSTATUS_PATH.to_owned(),
                reason: format!("server '{}' is not a valid URL", redact_password(server)),
                source,
            })?;
            Some(url)
        };
        Ok(Self { server, registrar })
    }

    /// Wraps the handler for binding.
    #[must_use]
    pub fn into_route(self) -> MethodRouter {
        get(nsstatus).with_state(self)
    }
}

async fn nsstatus(State(handler): State<NsStatusHandler>) -> Response {
    let cfg = handler.registrar.cfg();
    let mut members = serde_json::Map::new();
    for kind in [NodeDefsKind::Known, NodeDefsKind::Wanted] {
        match load_node_defs(cfg.as_ref(), kind) {
            Ok((defs, _)) => {
                members.insert(kind.key().to_owned(), json!(defs.node_defs));
            }
            Err(error) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
        }
    }
    let config = handler.registrar.config();
    let server = handler.server.as_ref().map_or_else(
        || LOCAL_ONLY_SERVER.to_owned(),
        |url| redact_password(url.as_str()),
    );
    Json(json!({
        "uuid": config.identity.uuid(),
        "bindHttp": config.bind_http,
        "server": server,
        "localOnly": handler.server.is_none(),
        "registrarState": handler.registrar.state(),
        "registerMode": handler.registrar.mode().map(|mode| mode.to_string()),
        "partitions": handler.registrar.partitions().len(),
        "nodeDefs": members,
    }))
    .into_response()
}

/// Binds the node stage into `table`.
pub fn mount(
    table: &mut RouteTable,
    stats: Arc<StatsRegistry>,
    registrar: &Arc<Registrar>,
) -> Result<(), RouteCompositionError> {
    let status = NsStatusHandler::new(&registrar.config().server, Arc::clone(registrar))?;
    table.bind(
        RoutePattern::exact(NSSTATS_PATH),
        NsStatsHandler::new(stats, Arc::clone(registrar)).into_route(),
    )?;
    table.bind(RoutePattern::exact(NSSTATUS_PATH), status.into_route())?;
    Ok(())
}
