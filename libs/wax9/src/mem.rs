//! In-memory transport, for replaying captured byte streams and for driving a session in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;
use crate::source::{ByteSource, Connector};

#[derive(Default, Debug)]
struct Inner {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    closed: bool,
    fail_writes: bool,
    stalls: usize,
}

/// A [`ByteSource`] backed by a shared in-memory queue.
///
/// Clones share the same queues, so a handle kept outside a session can keep feeding bytes
/// and inspect what the session wrote.
#[derive(Clone, Default, Debug)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: &[u8]) -> Self {
        let source = Self::new();
        source.feed(bytes);
        source
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues bytes as if the device had sent them.
    pub fn feed(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
    }

    /// Everything written to the source so far, lossily decoded as text.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.lock().tx).into_owned()
    }

    pub fn clear_written(&self) {
        self.lock().tx.clear();
    }

    pub fn pending(&self) -> usize {
        self.lock().rx.len()
    }

    /// Makes every subsequent read report [`TransportError::Closed`].
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes the next `reads` calls to `read_byte` report [`TransportError::TimedOut`], like a
    /// port whose read timeout expires before the device answers.
    pub fn stall_reads(&self, reads: usize) {
        self.lock().stalls = reads;
    }
}

impl ByteSource for MemorySource {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let inner = self.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        Ok(inner.rx.len())
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if inner.stalls > 0 {
            inner.stalls -= 1;
            return Err(TransportError::TimedOut);
        }
        inner.rx.pop_front().ok_or(TransportError::Closed)
    }

    fn write_str(&mut self, s: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(TransportError::Write("memory source rejects writes".to_string()));
        }
        inner.tx.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

/// Hands out clones of one [`MemorySource`], or refuses to connect.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    source: MemorySource,
    refuse: bool,
    last_port: Option<String>,
}

impl MemoryConnector {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source,
            refuse: false,
            last_port: None,
        }
    }

    pub fn refusing() -> Self {
        Self {
            source: MemorySource::new(),
            refuse: true,
            last_port: None,
        }
    }

    pub fn source(&self) -> &MemorySource {
        &self.source
    }

    /// The port name passed to the most recent `connect`, successful or not.
    pub fn last_port(&self) -> Option<&str> {
        self.last_port.as_deref()
    }
}

impl Connector for MemoryConnector {
    type Source = MemorySource;

    fn connect(&mut self, port: &str) -> Result<MemorySource, TransportError> {
        self.last_port = Some(port.to_string());
        if self.refuse {
            return Err(TransportError::Open {
                port: port.to_string(),
                reason: "no such device".to_string(),
            });
        }
        Ok(self.source.clone())
    }
}
