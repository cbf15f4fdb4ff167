//! Byte-level transport seams.
//!
//! The device link never opens or configures a port itself. It is handed a [`Connector`]
//! that produces a [`ByteSource`], and every blocking decision is left to that source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::TransportError;

/// A duplex byte stream to the device.
///
/// Frame readers call [`ByteSource::bytes_available`] before every [`ByteSource::read_byte`],
/// so a source that reports availability honestly never stalls the polling thread.
pub trait ByteSource {
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    fn read_byte(&mut self) -> Result<u8, TransportError>;

    fn write_str(&mut self, s: &str) -> Result<(), TransportError>;

    /// Reads up to and including the next `\n`, returning the line without its terminator.
    ///
    /// Reads that report [`TransportError::TimedOut`] are retried until `timeout` has passed
    /// since the call began; after that the timeout is returned.
    fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let started = Instant::now();
        let mut line = Vec::new();
        loop {
            match self.read_byte() {
                Ok(b'\n') => break,
                Ok(b) => line.push(b),
                Err(TransportError::TimedOut) if started.elapsed() < timeout => {
                    trace!(partial = line.len(), "reply read timed out, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        (**self).read_byte()
    }

    fn write_str(&mut self, s: &str) -> Result<(), TransportError> {
        (**self).write_str(s)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        (**self).read_line(timeout)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        (**self).read_byte()
    }

    fn write_str(&mut self, s: &str) -> Result<(), TransportError> {
        (**self).write_str(s)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        (**self).read_line(timeout)
    }
}

/// Acquires a [`ByteSource`] for a named port.
pub trait Connector {
    type Source: ByteSource;

    fn connect(&mut self, port: &str) -> Result<Self::Source, TransportError>;
}

/// Shared "enabled" flag checked between byte reads.
///
/// Clearing it from any clone makes an in-flight frame read give up at the next byte boundary.
#[derive(Clone, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
