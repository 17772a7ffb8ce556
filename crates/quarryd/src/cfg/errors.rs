//! Error surface of the cluster config handle.

use std::io;

use camino::Utf8PathBuf;
use nix::errno::Errno;
use thiserror::Error;

/// Errors raised by [`super::Cfg`] operations.
#[derive(Debug, Error)]
pub enum CfgStoreError {
    /// A compare-and-swap precondition did not hold.
    #[error("cas mismatch for key '{key}': expected {expected}, found {actual}")]
    CasMismatch {
        /// Key being mutated.
        key: String,
        /// CAS supplied by the caller.
        expected: u64,
        /// CAS currently stored, zero when the key is absent.
        actual: u64,
    },
    /// Local stores only hold UTF-8 documents.
    #[error("value for key '{key}' is not valid UTF-8")]
    NotUtf8 {
        /// Key being written.
        key: String,
    },
    /// The backing file could not be read.
    #[error("failed to read config store '{path}': {source}")]
    Load {
        /// Store file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The backing file does not contain a valid store document.
    #[error("config store '{path}' is corrupt: {source}")]
    Corrupt {
        /// Store file path.
        path: Utf8PathBuf,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// Persisting a mutation failed.
    #[error("failed to persist config store '{path}': {source}")]
    Persist {
        /// Store file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Encoding the store document failed.
    #[error("failed to encode config store: {source}")]
    Encode {
        /// Underlying encoding error.
        #[from]
        source: serde_json::Error,
    },
}

/// Reasons a connect spec could not be turned into a store.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No provider is registered for the scheme.
    #[error("unsupported config provider '{scheme}' (expected simple, simple:<path> or mem)")]
    UnsupportedProvider {
        /// Scheme portion of the connect spec.
        scheme: String,
    },
    /// The connect spec is syntactically wrong for its provider.
    #[error("malformed connect spec: {reason}")]
    Malformed {
        /// Human readable explanation.
        reason: String,
    },
    /// The store was located but could not be opened.
    #[error(transparent)]
    Store(#[from] CfgStoreError),
    /// The lock file guarding a file store could not be managed.
    #[error("failed to manage store lock '{path}': {source}")]
    Lock {
        /// Lock file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing the owner of an existing lock failed.
    #[error("failed to check lock owner {pid}: {source}")]
    CheckOwner {
        /// PID recorded in the lock file.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
}

/// Errors surfaced while opening the cluster config handle.
#[derive(Debug, Error)]
pub enum CfgError {
    /// The connect spec was malformed or the store could not be reached.
    #[error("config store '{connect}' is unavailable: {source}")]
    Unavailable {
        /// Connect spec supplied through `--cfg-connect`.
        connect: String,
        /// Underlying cause.
        #[source]
        source: ConnectError,
    },
    /// Another local process is already listening on the bind address.
    #[error("bind address '{bind}' is already in use")]
    BindConflict {
        /// Address supplied through `--bind-http`.
        bind: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A live process owns the file store.
    #[error("config store '{path}' is locked by running process {pid}")]
    StoreLocked {
        /// Store file path.
        path: Utf8PathBuf,
        /// PID recorded in the lock file.
        pid: u32,
    },
}
