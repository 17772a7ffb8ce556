//! Cloneable in-memory writer for capturing output written from other threads.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Byte buffer shared between a writer and the test asserting on it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Everything written so far, decoded lossily.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().expect("shared buffer mutex poisoned");
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .expect("shared buffer mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
