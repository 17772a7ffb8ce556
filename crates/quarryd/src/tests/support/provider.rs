//! Config provider handing out one pre-populated store.

use std::sync::Arc;

use crate::cfg::{Cfg, CfgError, CfgProvider, ConnectSpec, LocalCfg, OpenContext};

/// Answers the `mem` scheme with a store the test keeps a handle to.
#[derive(Debug, Clone)]
pub struct SharedStoreProvider {
    store: Arc<LocalCfg>,
}

impl SharedStoreProvider {
    /// Serves `store` for every open.
    #[must_use]
    pub const fn new(store: Arc<LocalCfg>) -> Self {
        Self { store }
    }
}

impl CfgProvider for SharedStoreProvider {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    fn open(
        &self,
        _spec: &ConnectSpec,
        _context: &OpenContext<'_>,
    ) -> Result<Arc<dyn Cfg>, CfgError> {
        Ok(self.store.clone())
    }
}
