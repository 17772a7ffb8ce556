//! Validates, and for the compiled-in default only creates, the data directory.

use std::fs::{self, DirBuilder};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

const DATADIR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::datadir");

/// Outcome of a successful data directory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirStatus {
    /// The directory already existed.
    Existing,
    /// The default directory was missing and has been created.
    Created,
}

/// Errors raised while validating the data directory.
#[derive(Debug, Error)]
pub enum PathError {
    /// A user-supplied directory does not exist; it is never created implicitly.
    #[error("data directory '{path}' does not exist")]
    Missing {
        /// Path supplied through `--data-dir`.
        path: Utf8PathBuf,
    },
    /// The path exists but names something other than a directory.
    #[error("data directory '{path}' is not a directory")]
    NotADirectory {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Inspecting the path failed.
    #[error("data directory '{path}' could not be accessed: {source}")]
    Inaccessible {
        /// Offending path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Creating the default directory failed.
    #[error("failed to create data directory '{path}': {source}")]
    Create {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl PathError {
    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Missing { path }
            | Self::NotADirectory { path }
            | Self::Inaccessible { path, .. }
            | Self::Create { path, .. } => path,
        }
    }
}

/// Ensures `path` exists and is a directory.
///
/// A missing `path` is only created when it equals `default_path`, with
/// owner-only permissions. Every other failure is reported after a single
/// attempt.
pub fn ensure_data_dir(
    path: &Utf8Path,
    default_path: &Utf8Path,
) -> Result<DataDirStatus, PathError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(DataDirStatus::Existing),
        Ok(_) => Err(PathError::NotADirectory {
            path: path.to_path_buf(),
        }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            if path != default_path {
                return Err(PathError::Missing {
                    path: path.to_path_buf(),
                });
            }
            create_private_dir(path)?;
            info!(
                target: DATADIR_TARGET,
                path = %path,
                "created default data directory"
            );
            Ok(DataDirStatus::Created)
        }
        Err(source) => Err(PathError::Inaccessible {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn create_private_dir(path: &Utf8Path) -> Result<(), PathError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path.as_std_path())
        .map_err(|source| PathError::Create {
            path: path.to_path_buf(),
            source,
        })
}
