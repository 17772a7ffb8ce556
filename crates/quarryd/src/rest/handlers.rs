use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quarry_config::DATA_VERSION;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::RestContext;
use crate::diagnostics::DiagnosticSnapshot;
use crate::registrar::RegistrarError;
use crate::router::{ROUTER_TARGET, json_error};

pub(super) async fn version(State(context): State<RestContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": context.version,
        "dataVersion": DATA_VERSION,
    }))
}

pub(super) async fn runtime(State(context): State<RestContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": context.version,
        "arch": std::env::consts::ARCH,
        "os": std::env::consts::OS,
        "family": std::env::consts::FAMILY,
        "pid": std::process::id(),
        "parallelism": thread::available_parallelism().map(NonZeroUsize::get).ok(),
        "uptimeSecs": context.started.elapsed().as_secs(),
    }))
}

pub(super) async fn log(State(context): State<RestContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "capacity": context.ring.capacity(),
        "messages": context.ring.messages(),
    }))
}

pub(super) async fn cfg(State(context): State<RestContext>) -> Response {
    let store = context.cfg.cfg();
    let keys = match store.keys() {
        Ok(keys) => keys,
        Err(error) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
    };
    let mut entries = serde_json::Map::new();
    for key in keys {
        match store.get(&key) {
            Ok(Some((bytes, cas))) => {
                let value = serde_json::from_slice::<Value>(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
                entries.insert(key, json!({ "cas": cas, "value": value }));
            }
            Ok(None) => {}
            Err(error) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
        }
    }
    Json(json!({
        "status": "ok",
        "connect": context.cfg.connect(),
        "entries": entries,
    }))
    .into_response()
}

pub(super) async fn cfg_refresh(State(context): State<RestContext>) -> Response {
    match context.cfg.cfg().refresh() {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(error) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
    }
}

pub(super) async fn manager_kick(State(context): State<RestContext>) -> Response {
    info!(target: ROUTER_TARGET, "manager kick requested over REST");
    // Reconciliation touches the config store and partition directories.
    let registrar = Arc::clone(&context.registrar);
    let kicked = match tokio::task::spawn_blocking(move || registrar.kick("rest api")).await {
        Ok(kicked) => kicked,
        Err(error) => {
            warn!(target: ROUTER_TARGET, error = %error, "manager kick aborted");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, &error);
        }
    };
    match kicked {
        Ok(summary) => Json(json!({
            "status": "ok",
            "registered": summary.registered,
            "unregistered": summary.unregistered,
        }))
        .into_response(),
        Err(error @ RegistrarError::NotRunning) => json_error(StatusCode::CONFLICT, &error),
        Err(error) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
    }
}

pub(super) async fn index(State(context): State<RestContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "indexes": context.discovery.indexes(),
        "partitions": context.discovery.partitions(),
    }))
}

pub(super) async fn diag(State(context): State<RestContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": context.version,
        "registrarState": context.registrar.state(),
        "stats": context.stats.snapshot(),
        "diagnostics": DiagnosticSnapshot::capture(context.diagnostics.as_ref()),
        "log": context.ring.messages(),
    }))
}

pub(super) async fn stats(State(context): State<RestContext>) -> Json<Value> {
    Json(json!(context.stats.snapshot()))
}
