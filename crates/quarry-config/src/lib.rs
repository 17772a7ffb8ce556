//! Startup configuration shared by the quarry node binaries.
//!
//! Configuration is captured once from command-line flags (with `QUARRY_*`
//! environment fallbacks) into an immutable [`StartupConfig`]. Downstream
//! components receive the snapshot by reference and never mutate it.

mod defaults;
mod logging;
mod register;
mod startup;

pub use defaults::{
    DATA_VERSION, DEFAULT_BIND_HTTP, DEFAULT_CFG_CONNECT, DEFAULT_DATA_DIR, DEFAULT_LOG_FILTER,
    DEFAULT_MSG_RING_CAPACITY, DEFAULT_STATIC_DIR, DEFAULT_WEIGHT, LOCAL_ONLY_SERVER,
    NODE_NAMESPACE, default_log_filter, default_log_format,
};
pub use logging::LogFormat;
pub use register::RegisterMode;
pub use startup::{StartupConfig, redact_password};
