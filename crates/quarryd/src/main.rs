//! Entry point for the quarry node daemon.
//!
//! Delegates to [`quarryd::run`], which parses flags, bootstraps the node and
//! serves the HTTP surface until the process is stopped.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: the log writer shares stderr from other threads.
    quarryd::run(std::env::args_os(), &mut io::stdout(), &mut io::stderr())
}
