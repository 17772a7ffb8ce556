//! Structured health reporting for node lifecycle events.

use std::fmt;
use std::sync::Arc;

use quarry_config::{StartupConfig, redact_password};

use crate::bootstrap::BootstrapError;
use crate::identity::NodeIdentity;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Sequential bootstrap stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStage {
    /// Data directory validated or created.
    DataDir,
    /// Node identity loaded or generated.
    Identity,
    /// Cluster config handle opened.
    Config,
    /// Registrar started.
    Registrar,
    /// HTTP router composed.
    Router,
}

impl BootstrapStage {
    /// Stable lower-case name used in telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataDir => "data_dir",
            Self::Identity => "identity",
            Self::Config => "config",
            Self::Registrar => "registrar",
            Self::Router => "router",
        }
    }
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the data directory is checked.
    fn bootstrap_starting(&self);

    /// Invoked after each stage returns successfully.
    fn stage_completed(&self, stage: BootstrapStage);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &StartupConfig, identity: &NodeIdentity);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn stage_completed(&self, stage: BootstrapStage) {
        (**self).stage_completed(stage);
    }

    fn bootstrap_succeeded(&self, config: &StartupConfig, identity: &NodeIdentity) {
        (**self).bootstrap_succeeded(config, identity);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting node bootstrap"
        );
    }

    fn stage_completed(&self, stage: BootstrapStage) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "stage_completed",
            stage = %stage,
            "bootstrap stage completed"
        );
    }

    fn bootstrap_succeeded(&self, config: &StartupConfig, identity: &NodeIdentity) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            uuid = %identity,
            bind_http = %config.bind_http,
            server = %redact_password(&config.server),
            register = %config.register,
            "node bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            stage = %error.stage(),
            error = %error,
            "node bootstrap failed"
        );
    }
}
