//! Process entry: argument handling, exit codes and HTTP serving.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use quarry_config::{DATA_VERSION, DEFAULT_MSG_RING_CAPACITY, StartupConfig};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bootstrap::{BootstrapError, BootstrapOutcome, bootstrap};
use crate::diagnostics::{self, ProcfsDiagnostics};
use crate::msg_ring::{MsgRing, MsgRingError};
use crate::router::ComposedRouter;
use crate::stats::StatsRegistry;
use crate::telemetry::{self, TelemetryError};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Exit status for rejected command-line usage.
const USAGE_EXIT: u8 = 2;

/// Errors that stop the node after arguments were accepted.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The log message ring could not be built.
    #[error("failed to create message ring: {source}")]
    MsgRing {
        /// Underlying ring error.
        #[from]
        source: MsgRingError,
    },
    /// Telemetry could not be installed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[from]
        source: TelemetryError,
    },
    /// A bootstrap stage failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The async runtime could not be built.
    #[error("failed to start the async runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The HTTP listener could not bind.
    #[error("failed to listen on '{bind}': {source}")]
    Listen {
        /// Address supplied through `--bind-http`.
        bind: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The HTTP server stopped with an error.
    #[error("HTTP server failed: {source}")]
    Serve {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Multi-line diagnostic written to stderr before exiting.
    #[must_use]
    pub fn operator_hint(&self) -> String {
        match self {
            Self::Bootstrap(error) => error.operator_hint(),
            Self::Listen { .. } => format!(
                "error: {self}\n  choose a free address with --bind-http\n  example: --bind-http=0.0.0.0:8095"
            ),
            Self::Telemetry { .. } => format!(
                "error: {self}\n  check --log-filter\n  example: --log-filter=info,quarryd::registrar=debug"
            ),
            _ => format!("error: {self}"),
        }
    }
}

/// The line printed for `--version`.
#[must_use]
pub fn version_line() -> String {
    format!(
        "{} main: {}, data: {DATA_VERSION}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

/// Parses `args`, runs the node and maps the result to an exit code.
///
/// Help and version output go to `stdout` with status 0. Usage errors go to
/// `stderr` with status 2. Fatal startup errors write an operator hint to
/// `stderr` and return status 1. In `unknown` register mode the node exits 0
/// once its configuration has been validated.
pub fn run<I, T>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config = match StartupConfig::load_from_iter(args) {
        Ok(config) => config,
        Err(error) => {
            let rendered = error.render();
            if error.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                return ExitCode::from(USAGE_EXIT);
            }
            let _ = write!(stdout, "{rendered}");
            return ExitCode::SUCCESS;
        }
    };

    if config.version {
        let _ = writeln!(stdout, "{}", version_line());
        return ExitCode::SUCCESS;
    }

    match launch(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{}", error.operator_hint());
            ExitCode::FAILURE
        }
    }
}

fn launch(config: &StartupConfig) -> Result<(), LaunchError> {
    let ring = Arc::new(MsgRing::new(io::stderr(), DEFAULT_MSG_RING_CAPACITY)?);
    telemetry::initialise(config, &ring)?;

    // Runs until the process exits; there is no teardown path.
    if let Err(error) = diagnostics::spawn(ProcfsDiagnostics, io::stderr()) {
        warn!(target: PROCESS_TARGET, error = %error, "diagnostic dumper unavailable");
    }

    info!(target: PROCESS_TARGET, version = %version_line(), "quarryd starting");
    for (flag, value) in config.flag_summary() {
        info!(target: PROCESS_TARGET, flag, value = %value, "effective flag");
    }

    let stats = Arc::new(StatsRegistry::new());
    match bootstrap(config, ring, stats)? {
        BootstrapOutcome::Unregistered(node) => {
            info!(
                target: PROCESS_TARGET,
                uuid = %node.identity(),
                "register mode unknown: node left the topology, exiting"
            );
            Ok(())
        }
        BootstrapOutcome::Ready { node, router } => {
            let result = serve(&config.bind_http, router);
            drop(node);
            result
        }
    }
}

fn serve(bind: &str, router: ComposedRouter) -> Result<(), LaunchError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;
    runtime.block_on(async {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|source| LaunchError::Listen {
                bind: bind.to_owned(),
                source,
            })?;
        let port = listener
            .local_addr()
            .map_err(|source| LaunchError::Listen {
                bind: bind.to_owned(),
                source,
            })?
            .port();
        info!(
            target: PROCESS_TARGET,
            url = %banner_url(bind, port),
            "web UI / REST API is available"
        );
        axum::serve(listener, router.router)
            .await
            .map_err(|source| LaunchError::Serve { source })
    })
}

/// URL operators can open; wildcard or empty hosts become `localhost`.
fn banner_url(bind: &str, port: u16) -> String {
    let host = match bind.rsplit_once(':').map_or(bind, |(raw, _)| raw) {
        "" | "0.0.0.0" | "[::]" => "localhost",
        other => other,
    };
    format!("http://{host}:{port}")
}
