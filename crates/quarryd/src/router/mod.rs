//! HTTP router composition.
//!
//! Three stages contribute bindings to one [`RouteTable`], in order: static
//! UI routes, the REST mount, then node-specific endpoints. Any stage
//! claiming a path another stage already holds aborts composition. The
//! table is then frozen into an immutable axum [`Router`].

mod assets;
mod errors;
mod node_routes;
mod static_routes;
mod table;

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::info;

pub use assets::{AssetChain, AssetSource, DirAssets, EmbeddedAssets, asset_handler};
pub use errors::RouteCompositionError;
pub use node_routes::{NSSTATS_PATH, NSSTATUS_PATH, NsStatsHandler, NsStatusHandler};
pub use static_routes::{STATICX_PREFIX, UI_ENTRY, UI_SECTIONS};
pub use table::{RoutePattern, RouteStage, RouteTable};

use crate::rest::{RestContext, RestMeta, RestMount};
use crate::stats::Counter;

pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Counter incremented for every HTTP request.
pub const REQUEST_COUNTER: &str = "http.requests";

/// Output of [`compose_router`].
pub struct ComposedRouter {
    /// The frozen router.
    pub router: Router,
    /// Metadata describing the REST routes.
    pub meta: Vec<RestMeta>,
    /// Every bound pattern in binding order.
    pub patterns: Vec<RoutePattern>,
}

impl fmt::Debug for ComposedRouter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ComposedRouter")
            .field("meta", &self.meta)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

/// Runs the three composition stages and freezes the result.
pub fn compose_router(
    context: &RestContext,
    mount: &dyn RestMount,
) -> Result<ComposedRouter, RouteCompositionError> {
    let mut table = RouteTable::new();

    table.enter_stage(RouteStage::Static);
    static_routes::mount(
        &mut table,
        Arc::clone(&context.primary_assets),
        &context.static_etag,
    )?;

    table.enter_stage(RouteStage::Rest);
    let meta = mount.mount(&mut table, context)?;

    table.enter_stage(RouteStage::Node);
    node_routes::mount(&mut table, Arc::clone(&context.stats), &context.registrar)?;

    let patterns = table.patterns();
    info!(
        target: ROUTER_TARGET,
        routes = patterns.len(),
        rest_routes = meta.len(),
        "router composed"
    );
    let requests = context.stats.counter(REQUEST_COUNTER);
    let router = table
        .freeze()
        .layer(middleware::from_fn_with_state(requests, count_requests));
    Ok(ComposedRouter {
        router,
        meta,
        patterns,
    })
}

async fn count_requests(
    State(counter): State<Arc<Counter>>,
    request: Request,
    next: Next,
) -> Response {
    counter.incr();
    next.run(request).await
}

/// JSON error body shared by the API handlers.
pub(crate) fn json_error(status: StatusCode, error: &dyn fmt::Display) -> Response {
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
