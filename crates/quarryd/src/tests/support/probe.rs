//! Scripted [`ServerProbe`] that counts how often it was consulted.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::registrar::{ProbeError, ProbeTarget, ServerProbe};

/// Probe that either always succeeds or always fails with a status code.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    failure: Option<u16>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    /// A probe that accepts every server.
    #[must_use]
    pub fn reachable() -> Self {
        Self::default()
    }

    /// A probe that rejects every server with `status`.
    #[must_use]
    pub fn failing(status: u16) -> Self {
        Self {
            failure: Some(status),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of probes performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ServerProbe for ScriptedProbe {
    fn probe(&self, _target: &ProbeTarget) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Some(status) => Err(ProbeError::Status(status)),
            None => Ok(()),
        }
    }
}
