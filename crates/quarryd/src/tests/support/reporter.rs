//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use quarry_config::StartupConfig;

use crate::bootstrap::BootstrapError;
use crate::health::{BootstrapStage, HealthReporter};
use crate::identity::NodeIdentity;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// A stage finished.
    StageCompleted(BootstrapStage),
    /// Bootstrap completed for the given node.
    BootstrapSucceeded(String),
    /// Bootstrap failed at a stage with an error description.
    BootstrapFailed {
        /// Failing stage.
        stage: BootstrapStage,
        /// Rendered error.
        message: String,
    },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Stages reported as completed, in order.
    #[must_use]
    pub fn completed_stages(&self) -> Vec<BootstrapStage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::StageCompleted(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn stage_completed(&self, stage: BootstrapStage) {
        self.record(HealthEvent::StageCompleted(stage));
    }

    fn bootstrap_succeeded(&self, _config: &StartupConfig, identity: &NodeIdentity) {
        self.record(HealthEvent::BootstrapSucceeded(identity.uuid().to_owned()));
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed {
            stage: error.stage(),
            message: error.to_string(),
        });
    }
}
