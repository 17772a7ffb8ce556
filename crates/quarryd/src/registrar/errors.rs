use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use super::server::{AuthError, ProbeError};
use crate::cfg::CfgStoreError;

/// Problems with the `--server` argument.
///
/// `NotAUrl` and `Unreachable` are deliberately worded differently: the first
/// points at the shape of the argument, the second at the network or the
/// credentials.
#[derive(Debug, Error)]
pub enum ServerUrlError {
    /// No server was supplied.
    #[error("server URL required")]
    Missing,
    /// Credentials could not be resolved.
    #[error("failed to resolve credentials for server '{server}': {source}")]
    Auth {
        /// Server argument with any password masked.
        server: String,
        /// Resolver failure.
        #[source]
        source: AuthError,
    },
    /// The probe failed and the argument does not look like an HTTP URL.
    #[error("server '{server}' is not a URL; expected a valid URL (http://HOST:PORT): {source}")]
    NotAUrl {
        /// Server argument with any password masked.
        server: String,
        /// Probe failure.
        #[source]
        source: ProbeError,
    },
    /// The probe failed against a well-formed URL.
    #[error(
        "could not reach server '{server}'; check the server is running and auth is correct: {source}"
    )]
    Unreachable {
        /// Server argument with any password masked.
        server: String,
        /// Probe failure.
        #[source]
        source: ProbeError,
    },
}

/// Errors raised while starting or reconciling the registrar.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// `start` was invoked more than once.
    #[error("registrar already started")]
    AlreadyStarted,
    /// An operation requires a running registrar.
    #[error("registrar is not running")]
    NotRunning,
    /// Server validation failed.
    #[error(transparent)]
    Server(#[from] ServerUrlError),
    /// The config store rejected an operation.
    #[error("config store operation on '{key}' failed: {source}")]
    Store {
        /// Key being read or written.
        key: String,
        /// Store failure.
        #[source]
        source: CfgStoreError,
    },
    /// A stored document could not be decoded or encoded.
    #[error("config store value '{key}' is malformed: {source}")]
    Codec {
        /// Key holding the document.
        key: String,
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// Another definition occupies this node's slot and force was not requested.
    #[error(
        "node definition conflict in '{key}': {detail}; use a *Force register mode to overwrite"
    )]
    NodeDefConflict {
        /// Node definition set key.
        key: String,
        /// What conflicted.
        detail: String,
    },
    /// A partition directory could not be read or written.
    #[error("partition storage '{path}' failed: {source}")]
    PartitionStorage {
        /// Directory or file involved.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
