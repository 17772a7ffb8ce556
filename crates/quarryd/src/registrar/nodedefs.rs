//! Node definition sets stored in the cluster config under `nodeDefs-known` and `nodeDefs-wanted`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use super::REGISTRAR_TARGET;
use super::errors::RegistrarError;
use crate::cfg::{Cas, Cfg, CfgStoreError};

/// Read-modify-write attempts before a concurrent writer is reported.
const CAS_ATTEMPTS: u32 = 5;

/// One node's entry in a topology set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
    /// Node UUID.
    pub uuid: String,
    /// Address other nodes and clients use to reach the REST API.
    pub host_port: String,
    /// Roles the node accepts; empty means all roles.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Slash separated placement path.
    #[serde(default)]
    pub container: String,
    /// Placement weight.
    pub weight: u32,
    /// Data layout version written by the node.
    pub impl_version: String,
}

/// A topology set: every node definition keyed by UUID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefs {
    /// Changes whenever the set is rewritten.
    #[serde(default)]
    pub uuid: String,
    /// Definitions keyed by node UUID.
    #[serde(default)]
    pub node_defs: BTreeMap<String, NodeDef>,
    /// Data layout version of the last writer.
    #[serde(default)]
    pub impl_version: String,
}

/// The two topology sets a node can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDefsKind {
    /// Nodes the cluster knows about.
    Known,
    /// Nodes eligible for partition assignment.
    Wanted,
}

impl NodeDefsKind {
    /// Config store key for the set.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Known => "nodeDefs-known",
            Self::Wanted => "nodeDefs-wanted",
        }
    }
}

/// Reads a JSON document and its CAS, or `None` when the key is absent.
pub(crate) fn read_document<T>(cfg: &dyn Cfg, key: &str) -> Result<Option<(T, Cas)>, RegistrarError>
where
    T: DeserializeOwned,
{
    let Some((bytes, cas)) = cfg.get(key).map_err(|source| RegistrarError::Store {
        key: key.to_owned(),
        source,
    })?
    else {
        return Ok(None);
    };
    let document = serde_json::from_slice(&bytes).map_err(|source| RegistrarError::Codec {
        key: key.to_owned(),
        source,
    })?;
    Ok(Some((document, cas)))
}

/// Reads one topology set; an absent key is an empty set with CAS `0`.
pub fn load_node_defs(cfg: &dyn Cfg, kind: NodeDefsKind) -> Result<(NodeDefs, Cas), RegistrarError> {
    Ok(read_document(cfg, kind.key())?.unwrap_or_default())
}

fn store_node_defs(
    cfg: &dyn Cfg,
    kind: NodeDefsKind,
    mut defs: NodeDefs,
    cas: Cas,
    impl_version: &str,
) -> Result<(), RegistrarError> {
    defs.uuid = Uuid::new_v4().simple().to_string();
    impl_version.clone_into(&mut defs.impl_version);
    let encoded = serde_json::to_vec(&defs).map_err(|source| RegistrarError::Codec {
        key: kind.key().to_owned(),
        source,
    })?;
    cfg.set(kind.key(), &encoded, cas)
        .map_err(|source| RegistrarError::Store {
            key: kind.key().to_owned(),
            source,
        })?;
    Ok(())
}

/// Loads the set, lets `apply` edit it and writes it back under CAS.
///
/// `apply` returns `false` when nothing changed, which skips the write. A
/// CAS mismatch reloads the set and reapplies the edit, up to
/// [`CAS_ATTEMPTS`] times. Returns whether the set was rewritten.
fn update_node_defs<F>(
    cfg: &dyn Cfg,
    kind: NodeDefsKind,
    impl_version: &str,
    mut apply: F,
) -> Result<bool, RegistrarError>
where
    F: FnMut(&mut NodeDefs) -> Result<bool, RegistrarError>,
{
    let mut attempt = 1;
    loop {
        let (mut defs, cas) = load_node_defs(cfg, kind)?;
        if !apply(&mut defs)? {
            return Ok(false);
        }
        match store_node_defs(cfg, kind, defs, cas, impl_version) {
            Ok(()) => return Ok(true),
            Err(RegistrarError::Store {
                source: CfgStoreError::CasMismatch { .. },
                ..
            }) if attempt < CAS_ATTEMPTS => {
                debug!(
                    target: REGISTRAR_TARGET,
                    set = kind.key(),
                    attempt,
                    "node definition set changed concurrently; retrying"
                );
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Adds or refreshes `def` in the set.
///
/// Without `force`, an existing entry for the same UUID at a different
/// address, or another UUID already claiming the address, is a conflict.
pub fn join_node_defs(
    cfg: &dyn Cfg,
    kind: NodeDefsKind,
    def: &NodeDef,
    force: bool,
) -> Result<(), RegistrarError> {
    let written = update_node_defs(cfg, kind, &def.impl_version, |defs| {
        if defs.node_defs.get(&def.uuid) == Some(def) {
            return Ok(false);
        }
        if !force {
            check_claims(kind, defs, def)?;
        }
        defs.node_defs.insert(def.uuid.clone(), def.clone());
        Ok(true)
    })?;
    if written {
        info!(
            target: REGISTRAR_TARGET,
            set = kind.key(),
            uuid = %def.uuid,
            host_port = %def.host_port,
            "joined node definition set"
        );
    } else {
        debug!(target: REGISTRAR_TARGET, set = kind.key(), "node definition unchanged");
    }
    Ok(())
}

fn check_claims(kind: NodeDefsKind, defs: &NodeDefs, def: &NodeDef) -> Result<(), RegistrarError> {
    if let Some(existing) = defs.node_defs.get(&def.uuid)
        && existing.host_port != def.host_port
    {
        return Err(RegistrarError::NodeDefConflict {
            key: kind.key().to_owned(),
            detail: format!(
                "node {} is registered at '{}', not '{}'",
                def.uuid, existing.host_port, def.host_port
            ),
        });
    }
    if let Some(other) = defs
        .node_defs
        .values()
        .find(|other| other.uuid != def.uuid && other.host_port == def.host_port)
    {
        return Err(RegistrarError::NodeDefConflict {
            key: kind.key().to_owned(),
            detail: format!("address '{}' is claimed by node {}", def.host_port, other.uuid),
        });
    }
    Ok(())
}

/// Removes `uuid` from the set; absent entries are left alone.
pub fn leave_node_defs(
    cfg: &dyn Cfg,
    kind: NodeDefsKind,
    uuid: &str,
    impl_version: &str,
) -> Result<(), RegistrarError> {
    let written = update_node_defs(cfg, kind, impl_version, |defs| {
        Ok(defs.node_defs.remove(uuid).is_some())
    })?;
    if written {
        info!(target: REGISTRAR_TARGET, set = kind.key(), uuid, "left node definition set");
    }
    Ok(())
}
