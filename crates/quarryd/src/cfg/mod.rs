//! Cluster config handle: connect-spec resolution, bind probing and the store contract.
//!
//! The handle is opened once during bootstrap and shared for the process
//! lifetime. Failures are never retried here; the launcher reports them and
//! exits so an external supervisor can apply its own policy.

mod connect;
mod errors;
mod lock;
mod store;

use std::fmt;
use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use camino::Utf8Path;
use quarry_config::RegisterMode;
use tracing::{debug, info};

pub use connect::{
    CfgProvider, ConnectSpec, MemProvider, OpenContext, SimpleFileProvider, builtin_providers,
};
pub use errors::{CfgError, CfgStoreError, ConnectError};
pub use store::{Cas, Cfg, LocalCfg};

pub(crate) const CFG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cfg");

/// Shared handle to the opened cluster config store.
#[derive(Clone)]
pub struct CfgHandle {
    connect: String,
    cfg: Arc<dyn Cfg>,
}

impl CfgHandle {
    /// Wraps an already opened store.
    #[must_use]
    pub fn new(connect: impl Into<String>, cfg: Arc<dyn Cfg>) -> Self {
        Self {
            connect: connect.into(),
            cfg,
        }
    }

    /// The store behind the handle.
    #[must_use]
    pub fn cfg(&self) -> Arc<dyn Cfg> {
        Arc::clone(&self.cfg)
    }

    /// Connect spec the handle was opened with.
    #[must_use]
    pub fn connect(&self) -> &str {
        &self.connect
    }
}

impl fmt::Debug for CfgHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CfgHandle")
            .field("connect", &self.connect)
            .finish_non_exhaustive()
    }
}

/// Opens the config store named by `connect_spec` using the built-in providers.
pub fn open_config(
    namespace: &str,
    connect_spec: &str,
    bind_address: &str,
    register_mode: RegisterMode,
    data_dir: &Utf8Path,
) -> Result<CfgHandle, CfgError> {
    let providers = builtin_providers();
    open_config_with(
        &providers,
        namespace,
        connect_spec,
        bind_address,
        register_mode,
        data_dir,
    )
}

/// Opens the config store using an explicit provider list.
///
/// Unless the node is in `unknown` mode, the bind address is probed first so
/// a second node on the same address fails with [`CfgError::BindConflict`]
/// before it touches shared state.
pub fn open_config_with(
    providers: &[Box<dyn CfgProvider>],
    namespace: &str,
    connect_spec: &str,
    bind_address: &str,
    register_mode: RegisterMode,
    data_dir: &Utf8Path,
) -> Result<CfgHandle, CfgError> {
    let unavailable = |source: ConnectError| CfgError::Unavailable {
        connect: connect_spec.to_owned(),
        source,
    };
    let spec = ConnectSpec::parse(connect_spec).map_err(unavailable)?;
    let provider = providers
        .iter()
        .find(|provider| provider.scheme() == spec.scheme())
        .ok_or_else(|| {
            unavailable(ConnectError::UnsupportedProvider {
                scheme: spec.scheme().to_owned(),
            })
        })?;

    if register_mode.exits_after_validation() {
        debug!(target: CFG_TARGET, bind = bind_address, "skipping bind probe in unknown mode");
    } else {
        probe_bind(bind_address)?;
    }

    let context = OpenContext {
        namespace,
        data_dir,
        connect: connect_spec,
    };
    let cfg = provider.open(&spec, &context)?;
    info!(
        target: CFG_TARGET,
        connect = connect_spec,
        provider = provider.scheme(),
        "config store opened"
    );
    Ok(CfgHandle::new(connect_spec, cfg))
}

/// Binds and immediately releases `bind_address`.
///
/// Only `AddrInUse` is treated as a conflict. Other failures, such as an
/// unresolvable host, surface later when the HTTP listener binds.
fn probe_bind(bind_address: &str) -> Result<(), CfgError> {
    match TcpListener::bind(bind_address) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(source) if source.kind() == io::ErrorKind::AddrInUse => Err(CfgError::BindConflict {
            bind: bind_address.to_owned(),
            source,
        }),
        Err(error) => {
            debug!(
                target: CFG_TARGET,
                bind = bind_address,
                error = %error,
                "bind probe inconclusive"
            );
            Ok(())
        }
    }
}
