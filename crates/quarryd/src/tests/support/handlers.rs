//! Test double for [`PartitionHandlers`] that records every callback in order.

use std::sync::Mutex;

use crate::registrar::{Partition, PartitionHandlers};

/// A partition callback observed during a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionEvent {
    /// `on_partition_registered` was called.
    Registered(String),
    /// `on_partition_unregistered` was called.
    Unregistered(String),
}

/// Records partition callbacks for assertions.
#[derive(Debug, Default)]
pub struct RecordingHandlers {
    events: Mutex<Vec<PartitionEvent>>,
}

impl RecordingHandlers {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<PartitionEvent> {
        self.events
            .lock()
            .expect("partition handler mutex poisoned")
            .clone()
    }

    /// Names passed to `on_partition_registered`, in call order.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PartitionEvent::Registered(name) => Some(name),
                PartitionEvent::Unregistered(_) => None,
            })
            .collect()
    }

    fn record(&self, event: PartitionEvent) {
        self.events
            .lock()
            .expect("partition handler mutex poisoned")
            .push(event);
    }
}

impl PartitionHandlers for RecordingHandlers {
    fn on_partition_registered(&self, partition: &Partition) {
        self.record(PartitionEvent::Registered(partition.name.clone()));
    }

    fn on_partition_unregistered(&self, partition: &Partition) {
        self.record(PartitionEvent::Unregistered(partition.name.clone()));
    }
}
