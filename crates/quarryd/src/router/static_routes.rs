//! Stage one: UI redirects and the primary embedded asset tree.

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get};

use super::assets::{AssetSource, asset_handler};
use super::errors::RouteCompositionError;
use super::table::{RoutePattern, RouteTable};

/// Entry point of the web UI.
pub const UI_ENTRY: &str = "/staticx/index.html";

/// Client-side UI sections; each path and its subtree loads the UI entry point.
pub const UI_SECTIONS: &[&str] = &["/indexes", "/nodes", "/monitor", "/manage", "/logs", "/debug"];

/// Prefix under which the primary embedded assets are served.
pub const STATICX_PREFIX: &str = "/staticx/";

/// Responds with `302 Found` pointing at `location`.
fn redirect(location: &'static str) -> MethodRouter {
    get(move || async move { (StatusCode::FOUND, [(header::LOCATION, location)]).into_response() })
}

/// Binds the static stage into `table`.
pub fn mount(
    table: &mut RouteTable,
    primary: Arc<dyn AssetSource>,
    static_etag: &str,
) -> Result<(), RouteCompositionError> {
    table.bind(RoutePattern::exact("/"), redirect(UI_ENTRY))?;
    table.bind(RoutePattern::exact("/index.html"), redirect(UI_ENTRY))?;
    table.bind(
        RoutePattern::exact("/static/partials/index/list.html"),
        redirect("/staticx/partials/index/list.html"),
    )?;
    for section in UI_SECTIONS {
        table.bind(RoutePattern::exact(*section), redirect(UI_ENTRY))?;
        table.bind(RoutePattern::subtree(*section), redirect(UI_ENTRY))?;
    }
    table.bind(
        RoutePattern::subtree(STATICX_PREFIX),
        asset_handler(STATICX_PREFIX, primary, static_etag),
    )?;
    Ok(())
}
