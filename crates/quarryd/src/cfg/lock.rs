//! Pid lock file guarding a file-backed config store against a second process.

use std::fs::{self, File};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::CFG_TARGET;
use super::errors::{CfgError, ConnectError};

/// Exclusive ownership of a file-backed config store for the process lifetime.
///
/// The lock file sits next to the store and records the owner's pid. It is
/// staged under a temporary name and linked into place, so it never appears
/// without its pid. A lock left behind by a dead process is removed and
/// acquisition retried once.
#[derive(Debug)]
pub(super) struct StoreLock {
    path: Utf8PathBuf,
    _file: File,
}

impl StoreLock {
    pub(super) fn acquire(store: &Utf8Path, connect: &str) -> Result<Self, CfgError> {
        let path = lock_path(store);
        match create_lock(&path) {
            Ok(file) => Ok(Self { path, _file: file }),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                reclaim_stale(store, &path, connect)?;
                let file = create_lock(&path).map_err(|source| unavailable(connect, &path, source))?;
                Ok(Self { path, _file: file })
            }
            Err(source) => Err(unavailable(connect, &path, source)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: CFG_TARGET,
                    file = %self.path,
                    error = %error,
                    "failed to remove store lock"
                );
            }
            _ => {}
        }
    }
}

fn lock_path(store: &Utf8Path) -> Utf8PathBuf {
    let mut name = store.file_name().unwrap_or("store").to_owned();
    name.push_str(".lock");
    store.with_file_name(name)
}

fn create_lock(path: &Utf8Path) -> io::Result<File> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;
    writeln!(staged, "{}", std::process::id())?;
    staged.as_file().sync_all()?;
    let file = staged
        .persist_noclobber(path)
        .map_err(|persist| persist.error)?;
    info!(target: CFG_TARGET, file = %path, "acquired store lock");
    Ok(file)
}

fn reclaim_stale(store: &Utf8Path, path: &Utf8Path, connect: &str) -> Result<(), CfgError> {
    if let Some(pid) = read_pid(path)
        && pid != 0
    {
        match check_process(pid) {
            Ok(true) => {
                return Err(CfgError::StoreLocked {
                    path: store.to_path_buf(),
                    pid,
                });
            }
            Ok(false) => {
                warn!(
                    target: CFG_TARGET,
                    pid,
                    file = %path,
                    "store lock owner not running; removing stale lock"
                );
            }
            Err(source) => {
                return Err(CfgError::Unavailable {
                    connect: connect.to_owned(),
                    source: ConnectError::CheckOwner { pid, source },
                });
            }
        }
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(unavailable(connect, path, source)),
    }
}

fn read_pid(path: &Utf8Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn check_process(pid: u32) -> Result<bool, Errno> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(errno) => Err(errno),
    }
}

fn unavailable(connect: &str, path: &Utf8Path, source: io::Error) -> CfgError {
    CfgError::Unavailable {
        connect: connect.to_owned(),
        source: ConnectError::Lock {
            path: path.to_path_buf(),
            source,
        },
    }
}
