//! The key/value contract of the cluster config store and its local implementation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CFG_TARGET;
use super::errors::CfgStoreError;
use super::lock::StoreLock;
use crate::files::atomic_write;

/// Compare-and-swap token attached to each stored value. Zero means "no precondition".
pub type Cas = u64;

/// Key/value view of the cluster configuration store.
///
/// Every mutation carries a CAS token. Passing `0` writes unconditionally;
/// any other value must match the token currently stored for the key.
pub trait Cfg: Send + Sync {
    /// Returns the value and CAS stored for `key`.
    fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Cas)>, CfgStoreError>;

    /// Stores `value` under `key`, returning the new CAS.
    fn set(&self, key: &str, value: &[u8], cas: Cas) -> Result<Cas, CfgStoreError>;

    /// Removes `key`. Deleting an absent key with CAS `0` succeeds.
    fn del(&self, key: &str, cas: Cas) -> Result<(), CfgStoreError>;

    /// Lists stored keys in lexical order.
    fn keys(&self) -> Result<Vec<String>, CfgStoreError>;

    /// Reloads state from the backing medium, if any.
    fn refresh(&self) -> Result<(), CfgStoreError>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    next_cas: Cas,
    entries: BTreeMap<String, StoredEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    cas: Cas,
    value: String,
}

impl StoreState {
    fn check(&self, key: &str, cas: Cas) -> Result<(), CfgStoreError> {
        let actual = self.entries.get(key).map_or(0, |entry| entry.cas);
        if cas == 0 || cas == actual {
            Ok(())
        } else {
            Err(CfgStoreError::CasMismatch {
                key: key.to_owned(),
                expected: cas,
                actual,
            })
        }
    }

    fn bump(&mut self) -> Cas {
        self.next_cas = self.next_cas.saturating_add(1).max(1);
        self.next_cas
    }
}

#[derive(Debug)]
struct FileBacking {
    path: Utf8PathBuf,
    _lock: StoreLock,
}

/// Single-node store kept in memory and optionally mirrored to a JSON file.
///
/// File-backed stores rewrite the whole document atomically after each
/// mutation and hold a lock file for as long as the store is open.
#[derive(Debug)]
pub struct LocalCfg {
    state: Mutex<StoreState>,
    backing: Option<FileBacking>,
}

impl LocalCfg {
    /// Builds an empty in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            backing: None,
        }
    }

    /// Opens, or starts, the JSON store at `path` and takes its lock.
    pub(super) fn open_file(path: &Utf8Path, lock: StoreLock) -> Result<Self, CfgStoreError> {
        let state = load_state(path)?;
        debug!(
            target: CFG_TARGET,
            file = %path,
            keys = state.entries.len(),
            "loaded config store"
        );
        Ok(Self {
            state: Mutex::new(state),
            backing: Some(FileBacking {
                path: path.to_path_buf(),
                _lock: lock,
            }),
        })
    }

    /// Path of the backing file, when there is one.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.backing.as_ref().map(|backing| backing.path.as_path())
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `mutate` to a copy of the state and commits it once persisted.
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut StoreState) -> Result<T, CfgStoreError>,
    ) -> Result<T, CfgStoreError> {
        let mut guard = self.lock_state();
        let mut next = guard.clone();
        let outcome = mutate(&mut next)?;
        if let Some(backing) = &self.backing {
            let encoded = serde_json::to_vec_pretty(&next)?;
            atomic_write(backing.path.as_std_path(), &encoded).map_err(|source| {
                CfgStoreError::Persist {
                    path: backing.path.clone(),
                    source,
                }
            })?;
        }
        *guard = next;
        Ok(outcome)
    }
}

impl Cfg for LocalCfg {
    fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Cas)>, CfgStoreError> {
        let guard = self.lock_state();
        Ok(guard
            .entries
            .get(key)
            .map(|entry| (entry.value.clone().into_bytes(), entry.cas)))
    }

    fn set(&self, key: &str, value: &[u8], cas: Cas) -> Result<Cas, CfgStoreError> {
        let text = std::str::from_utf8(value).map_err(|_| CfgStoreError::NotUtf8 {
            key: key.to_owned(),
        })?;
        self.commit(|state| {
            state.check(key, cas)?;
            let next = state.bump();
            state.entries.insert(
                key.to_owned(),
                StoredEntry {
                    cas: next,
                    value: text.to_owned(),
                },
            );
            Ok(next)
        })
    }

    fn del(&self, key: &str, cas: Cas) -> Result<(), CfgStoreError> {
        self.commit(|state| {
            state.check(key, cas)?;
            state.entries.remove(key);
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, CfgStoreError> {
        Ok(self.lock_state().entries.keys().cloned().collect())
    }

    fn refresh(&self) -> Result<(), CfgStoreError> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };
        let fresh = load_state(&backing.path)?;
        *self.lock_state() = fresh;
        Ok(())
    }
}

fn load_state(path: &Utf8Path) -> Result<StoreState, CfgStoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(StoreState::default()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| CfgStoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(StoreState::default()),
        Err(source) => Err(CfgStoreError::Load {
            path: path.to_path_buf(),
            source,
        }),
    }
}
