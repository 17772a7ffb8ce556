//! Durable node identity persisted as `<data_dir>/<namespace>.uuid`.

use std::fmt;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::files::atomic_write;

const IDENTITY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::identity");

/// Stable identifier of this node within the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NodeIdentity {
    uuid: String,
}

impl NodeIdentity {
    /// Wraps an identifier that was read or generated by the identity store.
    pub(crate) const fn new(uuid: String) -> Self {
        Self { uuid }
    }

    /// The node UUID as 32 lowercase hexadecimal characters.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.uuid)
    }
}

/// Errors raised while reading or persisting the node identity.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The identity file exists but could not be read.
    #[error("failed to read node identity '{path}': {source}")]
    Read {
        /// Identity file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The identity file exists but holds no identifier.
    #[error("node identity file '{path}' is empty")]
    Blank {
        /// Identity file path.
        path: Utf8PathBuf,
    },
    /// Writing a freshly generated identity failed.
    #[error("failed to persist node identity '{path}': {source}")]
    Write {
        /// Identity file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Path of the identity file for `namespace` inside `data_dir`.
#[must_use]
pub fn identity_path(namespace: &str, data_dir: &Utf8Path) -> Utf8PathBuf {
    data_dir.join(format!("{namespace}.uuid"))
}

/// Returns the persisted identity, generating and durably storing one on first use.
///
/// The file is written through a synced temporary file and the directory is
/// synced afterwards, so an identity returned from here survives a crash.
pub fn ensure_identity(
    namespace: &str,
    data_dir: &Utf8Path,
) -> Result<NodeIdentity, PersistenceError> {
    let path = identity_path(namespace, data_dir);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let uuid = contents.trim();
            if uuid.is_empty() {
                return Err(PersistenceError::Blank { path });
            }
            debug!(target: IDENTITY_TARGET, uuid, file = %path, "loaded node identity");
            Ok(NodeIdentity::new(uuid.to_owned()))
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let uuid = Uuid::new_v4().simple().to_string();
            atomic_write(path.as_std_path(), uuid.as_bytes())
                .map_err(|source| PersistenceError::Write {
                    path: path.clone(),
                    source,
                })?;
            info!(target: IDENTITY_TARGET, uuid = %uuid, file = %path, "generated node identity");
            Ok(NodeIdentity::new(uuid))
        }
        Err(source) => Err(PersistenceError::Read { path, source }),
    }
}
