//! Connect-spec grammar and the providers that turn a spec into a store.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use super::errors::{CfgError, ConnectError};
use super::lock::StoreLock;
use super::store::{Cfg, LocalCfg};

/// Parsed `--cfg-connect` value: a provider scheme and an optional target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSpec {
    scheme: String,
    target: Option<String>,
}

impl ConnectSpec {
    /// Splits `spec` at the first `:` into scheme and target.
    pub fn parse(spec: &str) -> Result<Self, ConnectError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ConnectError::Malformed {
                reason: "connect spec is empty".to_owned(),
            });
        }
        let (scheme, target) = match spec.split_once(':') {
            Some((scheme, target)) => (scheme, Some(target)),
            None => (spec, None),
        };
        if scheme.is_empty() {
            return Err(ConnectError::Malformed {
                reason: format!("connect spec '{spec}' has no provider name"),
            });
        }
        Ok(Self {
            scheme: scheme.to_owned(),
            target: target.filter(|value| !value.is_empty()).map(ToOwned::to_owned),
        })
    }

    /// Provider name, for example `simple`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Provider-specific remainder after the first `:`.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// Values a provider may need to locate its store.
#[derive(Debug, Clone, Copy)]
pub struct OpenContext<'a> {
    /// Artefact namespace, e.g. `quarry`.
    pub namespace: &'a str,
    /// Validated data directory.
    pub data_dir: &'a Utf8Path,
    /// The connect spec as supplied, for error reporting.
    pub connect: &'a str,
}

/// Opens a config store for one connect-spec scheme.
pub trait CfgProvider: Send + Sync {
    /// Scheme handled by this provider.
    fn scheme(&self) -> &'static str;

    /// Opens the store named by `spec`.
    fn open(&self, spec: &ConnectSpec, context: &OpenContext<'_>)
    -> Result<Arc<dyn Cfg>, CfgError>;
}

/// `simple` and `simple:<path>`: a JSON file guarded by a lock file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleFileProvider;

impl SimpleFileProvider {
    /// Location of the store file for the given spec.
    #[must_use]
    pub fn store_path(spec: &ConnectSpec, context: &OpenContext<'_>) -> Utf8PathBuf {
        spec.target().map_or_else(
            || context.data_dir.join(format!("{}.cfg", context.namespace)),
            Utf8PathBuf::from,
        )
    }
}

impl CfgProvider for SimpleFileProvider {
    fn scheme(&self) -> &'static str {
        "simple"
    }

    fn open(
        &self,
        spec: &ConnectSpec,
        context: &OpenContext<'_>,
    ) -> Result<Arc<dyn Cfg>, CfgError> {
        let path = Self::store_path(spec, context);
        let lock = StoreLock::acquire(&path, context.connect)?;
        let store = LocalCfg::open_file(&path, lock).map_err(|source| CfgError::Unavailable {
            connect: context.connect.to_owned(),
            source: source.into(),
        })?;
        Ok(Arc::new(store))
    }
}

/// `mem`: a process-local store discarded at exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemProvider;

impl CfgProvider for MemProvider {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    fn open(
        &self,
        spec: &ConnectSpec,
        context: &OpenContext<'_>,
    ) -> Result<Arc<dyn Cfg>, CfgError> {
        if let Some(target) = spec.target() {
            return Err(CfgError::Unavailable {
                connect: context.connect.to_owned(),
                source: ConnectError::Malformed {
                    reason: format!("the mem provider takes no argument, got '{target}'"),
                },
            });
        }
        Ok(Arc::new(LocalCfg::in_memory()))
    }
}

/// Providers compiled into the node.
#[must_use]
pub fn builtin_providers() -> Vec<Box<dyn CfgProvider>> {
    vec![Box::new(SimpleFileProvider), Box::new(MemProvider)]
}
