//! Bounded in-memory ring of recent log messages wrapping the log sink.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing_subscriber::fmt::MakeWriter;

/// Errors raised while building a [`MsgRing`].
#[derive(Debug, Error)]
pub enum MsgRingError {
    /// A ring must retain at least one message.
    #[error("message ring capacity must be positive")]
    ZeroCapacity,
}

/// Keeps the last `capacity` messages written through it.
///
/// Every write is forwarded to the wrapped sink and then recorded. Bytes are
/// buffered until a newline completes a message, so a message formatted
/// across several writes occupies one slot. Once the ring is full the oldest
/// message is evicted. Writers are serialized by a short critical section;
/// readers take snapshots.
pub struct MsgRing {
    capacity: usize,
    state: Mutex<RingState>,
    sink: Mutex<Box<dyn Write + Send>>,
}

#[derive(Default)]
struct RingState {
    messages: VecDeque<String>,
    partial: Vec<u8>,
}

impl RingState {
    fn push(&mut self, message: String, capacity: usize) {
        if self.messages.len() == capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }
}

impl MsgRing {
    /// Wraps `sink`, retaining up to `capacity` messages.
    pub fn new(sink: impl Write + Send + 'static, capacity: usize) -> Result<Self, MsgRingError> {
        if capacity == 0 {
            return Err(MsgRingError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            state: Mutex::new(RingState {
                messages: VecDeque::with_capacity(capacity),
                partial: Vec::new(),
            }),
            sink: Mutex::new(Box::new(sink)),
        })
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained messages, oldest first.
    ///
    /// A trailing message still waiting for its newline is not included.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.lock_state().messages.iter().cloned().collect()
    }

    /// A cloneable writer usable as a `tracing_subscriber` sink.
    #[must_use]
    pub fn writer(self: &Arc<Self>) -> MsgRingWriter {
        MsgRingWriter(Arc::clone(self))
    }

    fn lock_state(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, buf: &[u8]) {
        let mut state = self.lock_state();
        state.partial.extend_from_slice(buf);
        while let Some(end) = state.partial.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = state.partial.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line);
            let message = text.strip_suffix('\n').unwrap_or(&text).to_owned();
            state.push(message, self.capacity);
        }
    }
}

impl std::fmt::Debug for MsgRing {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MsgRing")
            .field("capacity", &self.capacity)
            .field("retained", &self.lock_state().messages.len())
            .finish_non_exhaustive()
    }
}

impl Write for &MsgRing {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let forwarded = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(buf);
        self.record(buf);
        forwarded.map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Shared handle writing into a [`MsgRing`].
#[derive(Debug, Clone)]
pub struct MsgRingWriter(Arc<MsgRing>);

impl Write for MsgRingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

impl<'a> MakeWriter<'a> for MsgRingWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tests::support::SharedBuffer;

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[rstest]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            MsgRing::new(io::sink(), 0),
            Err(MsgRingError::ZeroCapacity)
        ));
    }

    #[rstest]
    #[case(1, 0)]
    #[case(3, 2)]
    #[case(5, 7)]
    fn retains_exactly_the_last_n_writes(#[case] capacity: usize, #[case] extra: usize) {
        let ring = MsgRing::new(io::sink(), capacity).expect("ring");
        let total = capacity + extra;
        for index in 0..total {
            writeln!(&ring, "line {index}").expect("write");
        }
        let expected: Vec<String> = (extra..total).map(|index| format!("line {index}")).collect();
        assert_eq!(ring.messages(), expected);
    }

    #[rstest]
    fn forwards_every_write_to_the_sink() {
        let buffer = SharedBuffer::default();
        let ring = Arc::new(MsgRing::new(buffer.clone(), 4).expect("ring"));
        let mut writer = ring.writer();
        writer.write_all(b"hello\n").expect("write");
        assert_eq!(buffer.contents(), "hello\n");
        assert_eq!(ring.messages(), vec!["hello".to_owned()]);
    }

    #[rstest]
    fn fragments_are_joined_until_a_newline() {
        let ring = MsgRing::new(io::sink(), 4).expect("ring");
        let mut writer = &ring;
        writer.write_all(b"2026-10-18T00:00:00Z ").expect("timestamp");
        writer.write_all(b" INFO ").expect("level");
        assert!(ring.messages().is_empty(), "incomplete lines stay pending");
        writer.write_all(b"ready\nsecond ").expect("rest");
        writer.write_all(b"line\n").expect("second");
        assert_eq!(
            ring.messages(),
            vec![
                "2026-10-18T00:00:00Z  INFO ready".to_owned(),
                "second line".to_owned(),
            ]
        );
    }

    #[rstest]
    fn records_even_when_the_sink_fails() {
        let ring = MsgRing::new(BrokenSink, 2).expect("ring");
        assert!((&ring).write(b"lost\n").is_err());
        assert_eq!(ring.messages(), vec!["lost".to_owned()]);
    }
}
