//! Signal-driven diagnostic dumps.
//!
//! A dedicated thread listens for `SIGUSR2` for the lifetime of the process.
//! Each delivery writes a thread snapshot followed by a memory snapshot to the
//! configured sink. Dump failures never reach the caller.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use serde::Serialize;
use signal_hook::consts::signal::SIGUSR2;
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{debug, info, warn};

const DIAGNOSTICS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::diagnostics");

/// Memory fields copied out of `/proc/self/status`.
const MEMORY_FIELDS: &[&str] = &[
    "VmPeak", "VmSize", "VmHWM", "VmRSS", "VmData", "VmStk", "RssAnon", "RssFile", "Threads",
];

/// Supplies the text written by each dump.
pub trait DiagnosticSource: Send + Sync {
    /// One entry per live thread.
    fn threads(&self) -> io::Result<String>;

    /// Memory statistics for the process.
    fn memory(&self) -> io::Result<String>;
}

/// Reads thread and memory information from `/proc/self`.
///
/// Each thread line carries its kernel wait channel, followed by its kernel
/// stack indented beneath it, whenever those files are readable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsDiagnostics;

impl DiagnosticSource for ProcfsDiagnostics {
    fn threads(&self) -> io::Result<String> {
        let mut threads = Vec::new();
        for entry in fs::read_dir("/proc/self/task")? {
            let entry = entry?;
            let tid = entry.file_name().to_string_lossy().into_owned();
            threads.push((tid, entry.path()));
        }
        threads.sort_by_key(|(tid, _)| tid.parse::<u64>().unwrap_or(u64::MAX));
        let mut out = String::new();
        for (tid, task) in threads {
            out.push_str(&describe_task(&task, &tid));
        }
        Ok(out)
    }

    fn memory(&self) -> io::Result<String> {
        let status = fs::read_to_string("/proc/self/status")?;
        let mut out = String::new();
        for line in status.lines() {
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            if MEMORY_FIELDS.contains(&field) {
                out.push_str(&format!("{field}: {}\n", value.trim()));
            }
        }
        Ok(out)
    }
}

fn describe_task(task: &Path, tid: &str) -> String {
    let read = |file: &str| {
        fs::read_to_string(task.join(file))
            .ok()
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
    };
    let name = read("comm").unwrap_or_default();
    let mut out = format!("tid={tid} name={name}");
    if let Some(wchan) = read("wchan") {
        out.push_str(&format!(" wchan={wchan}"));
    }
    out.push('\n');
    // Usually root-only.
    if let Some(stack) = read("stack") {
        for frame in stack.lines() {
            out.push_str(&format!("    {frame}\n"));
        }
    }
    out
}

/// Point-in-time diagnostics, served by `/api/diag`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticSnapshot {
    /// Thread listing, or the read error.
    pub threads: String,
    /// Memory statistics, or the read error.
    pub memory: String,
}

impl DiagnosticSnapshot {
    /// Captures both sections, replacing failures with a short error line.
    #[must_use]
    pub fn capture(source: &dyn DiagnosticSource) -> Self {
        Self {
            threads: section_text(source.threads(), "threads"),
            memory: section_text(source.memory(), "memory"),
        }
    }
}

fn section_text(result: io::Result<String>, section: &str) -> String {
    result.unwrap_or_else(|error| {
        debug!(target: DIAGNOSTICS_TARGET, section, error = %error, "diagnostic read failed");
        format!("unavailable: {error}\n")
    })
}

/// Writes one thread-then-memory dump to `sink`, swallowing write failures.
pub fn dump(source: &dyn DiagnosticSource, sink: &mut dyn Write) {
    let snapshot = DiagnosticSnapshot::capture(source);
    let result = write!(sink, "--- threads ---\n{}", snapshot.threads)
        .and_then(|()| write!(sink, "--- memory ---\n{}", snapshot.memory))
        .and_then(|()| sink.flush());
    if let Err(error) = result {
        debug!(target: DIAGNOSTICS_TARGET, error = %error, "diagnostic dump write failed");
    }
}

/// Errors raised while starting the dumper.
#[derive(Debug, Error)]
pub enum DumperError {
    /// The signal subscription could not be installed.
    #[error("failed to subscribe to SIGUSR2: {source}")]
    Subscribe {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The dumper thread could not be spawned.
    #[error("failed to spawn diagnostic dumper thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Controls a running dumper thread.
///
/// Dropping the handle leaves the dumper running until process exit.
#[derive(Debug)]
pub struct DumperHandle {
    signals: Handle,
    thread: JoinHandle<()>,
}

impl DumperHandle {
    /// Closes the signal subscription and waits for the thread to finish.
    pub fn stop(self) {
        self.signals.close();
        if self.thread.join().is_err() {
            warn!(target: DIAGNOSTICS_TARGET, "diagnostic dumper thread panicked");
        }
    }
}

/// Subscribes to `SIGUSR2` and dumps to `sink` on every delivery.
///
/// The subscription is installed before this returns, so a signal raised
/// afterwards is never lost.
pub fn spawn<S, W>(source: S, mut sink: W) -> Result<DumperHandle, DumperError>
where
    S: DiagnosticSource + 'static,
    W: Write + Send + 'static,
{
    let mut signals =
        Signals::new([SIGUSR2]).map_err(|source| DumperError::Subscribe { source })?;
    let handle = signals.handle();
    let thread = thread::Builder::new()
        .name("quarryd-diagnostics".to_owned())
        .spawn(move || {
            for signal in signals.forever() {
                debug!(target: DIAGNOSTICS_TARGET, signal, "diagnostic dump requested");
                dump(&source, &mut sink);
            }
        })
        .map_err(|source| DumperError::Spawn { source })?;
    info!(target: DIAGNOSTICS_TARGET, "diagnostic dumper listening for SIGUSR2");
    Ok(DumperHandle {
        signals: handle,
        thread,
    })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use rstest::rstest;
    use signal_hook::low_level::raise;
    use tempfile::TempDir;

    use super::*;
    use crate::tests::support::SharedBuffer;

    struct FixedSource;

    impl DiagnosticSource for FixedSource {
        fn threads(&self) -> io::Result<String> {
            Ok("tid=1 name=main\n".to_owned())
        }

        fn memory(&self) -> io::Result<String> {
            Ok("VmRSS: 10 kB\n".to_owned())
        }
    }

    struct BrokenSource;

    impl DiagnosticSource for BrokenSource {
        fn threads(&self) -> io::Result<String> {
            Err(io::Error::other("no procfs"))
        }

        fn memory(&self) -> io::Result<String> {
            Err(io::Error::other("no procfs"))
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::other("closed"))
        }
    }

    #[rstest]
    fn dump_writes_threads_before_memory() {
        let mut out = Vec::new();
        dump(&FixedSource, &mut out);
        let text = String::from_utf8(out).expect("utf8 dump");
        assert_eq!(
            text,
            "--- threads ---\ntid=1 name=main\n--- memory ---\nVmRSS: 10 kB\n"
        );
    }

    #[rstest]
    fn dump_reports_unreadable_sections() {
        let mut out = Vec::new();
        dump(&BrokenSource, &mut out);
        let text = String::from_utf8(out).expect("utf8 dump");
        assert!(text.contains("unavailable: no procfs"));
        assert!(text.find("--- threads ---") < text.find("--- memory ---"));
    }

    #[rstest]
    fn dump_swallows_write_errors() {
        dump(&FixedSource, &mut FailingWriter);
    }

    #[rstest]
    fn task_entries_include_wait_channel_and_stack() {
        let task = TempDir::new().expect("temp dir");
        fs::write(task.path().join("comm"), "worker\n").expect("comm");
        fs::write(task.path().join("wchan"), "futex_wait_queue").expect("wchan");
        fs::write(
            task.path().join("stack"),
            "[<0>] futex_wait_queue+0x6c/0xa0\n[<0>] do_syscall_64+0x5d/0x90\n",
        )
        .expect("stack");
        assert_eq!(
            describe_task(task.path(), "42"),
            "tid=42 name=worker wchan=futex_wait_queue\n    [<0>] futex_wait_queue+0x6c/0xa0\n    [<0>] do_syscall_64+0x5d/0x90\n"
        );
    }

    #[rstest]
    fn task_entries_skip_unreadable_files() {
        let task = TempDir::new().expect("temp dir");
        fs::write(task.path().join("comm"), "main\n").expect("comm");
        assert_eq!(describe_task(task.path(), "7"), "tid=7 name=main\n");
    }

    #[cfg(target_os = "linux")]
    #[rstest]
    fn procfs_lists_the_current_thread() {
        let threads = ProcfsDiagnostics.threads().expect("procfs threads");
        assert!(threads.contains("tid="));
        let memory = ProcfsDiagnostics.memory().expect("procfs memory");
        assert!(memory.contains("VmRSS"));
    }

    #[rstest]
    fn signal_triggers_a_dump_and_stop_ends_the_thread() {
        let buffer = SharedBuffer::default();
        let handle = spawn(FixedSource, buffer.clone()).expect("spawn dumper");
        raise(SIGUSR2).expect("raise SIGUSR2");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !buffer.contents().contains("--- memory ---") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.stop();
        assert!(buffer.contents().contains("VmRSS: 10 kB"));
    }
}
