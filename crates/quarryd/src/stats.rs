//! Process-wide counters, owned by the launcher and injected where needed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Adds one.
    pub fn incr(&self) {
        self.add(1);
    }

    /// Adds `delta`.
    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Named counters published by node components.
///
/// One registry is built per process and shared through `Arc`; handles
/// returned by [`StatsRegistry::counter`] stay valid for its lifetime.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
}

impl StatsRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter called `name`, creating it at zero on first use.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(existing) = self
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(existing);
        }
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(counters.entry(name.to_owned()).or_default())
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect()
    }
}
