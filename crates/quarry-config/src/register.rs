//! Cluster registration modes accepted by `--register`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the node presents itself to the cluster topology on startup.
///
/// The topology keeps two node definition sets: *known* nodes, which the
/// cluster is aware of, and *wanted* nodes, which may be assigned partitions.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RegisterMode {
    /// Join both the known and wanted sets.
    #[default]
    Wanted,
    /// As [`RegisterMode::Wanted`], overwriting a conflicting definition.
    WantedForce,
    /// Join the known set only, leaving the wanted set.
    Known,
    /// As [`RegisterMode::Known`], overwriting a conflicting definition.
    KnownForce,
    /// Stay known but leave the wanted set.
    Unwanted,
    /// Leave both sets. The node validates its configuration and exits.
    Unknown,
}

impl RegisterMode {
    /// Returns `true` when the node definition is saved into the known set.
    #[must_use]
    pub const fn joins_known(self) -> bool {
        matches!(
            self,
            Self::Wanted | Self::WantedForce | Self::Known | Self::KnownForce
        )
    }

    /// Returns `true` when the node definition is saved into the wanted set.
    #[must_use]
    pub const fn joins_wanted(self) -> bool {
        matches!(self, Self::Wanted | Self::WantedForce)
    }

    /// Returns `true` when conflicting definitions should be overwritten.
    #[must_use]
    pub const fn is_force(self) -> bool {
        matches!(self, Self::WantedForce | Self::KnownForce)
    }

    /// Returns `true` when the process exits after validation instead of serving.
    #[must_use]
    pub const fn exits_after_validation(self) -> bool {
        matches!(self, Self::Unknown)
    }
}
