//! Compiled-in defaults shared by the node binaries.

/// Data directory used when `--data-dir` is not supplied.
///
/// The data directory guard only ever creates this path; any other missing
/// directory is reported as an operator error.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default HTTP listen address for the REST API and web UI.
pub const DEFAULT_BIND_HTTP: &str = "0.0.0.0:8094";

/// Default config store connect spec: a JSON file inside the data directory.
pub const DEFAULT_CFG_CONNECT: &str = "simple";

/// Directory consulted for static UI assets before the embedded sets.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Default placement weight advertised for the node.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Number of log messages retained by the in-memory message ring.
pub const DEFAULT_MSG_RING_CAPACITY: usize = 1000;

/// Namespace used for on-disk artefacts such as `quarry.uuid` and `quarry.cfg`.
pub const NODE_NAMESPACE: &str = "quarry";

/// Version of the persisted data layout (node definitions, plans, partitions).
pub const DATA_VERSION: &str = "5.0.0";

/// Sentinel `--server` value meaning "no cluster server, local only".
pub const LOCAL_ONLY_SERVER: &str = ".";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}
