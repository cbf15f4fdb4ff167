//! [`ByteSource`] over a host serial port.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::config::SerialConfig;
use crate::error::TransportError;
use crate::source::{ByteSource, Connector};

/// Opens ports by path, or by the first device whose name contains the requested fragment.
///
/// `timeout` bounds a single byte read. Reads that expire surface as
/// [`TransportError::TimedOut`], which the session retries while waiting for a reply.
pub struct SerialConnector {
    baud: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            baud: config.baud,
            timeout: Duration::from_millis(100),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn resolve(port: &str) -> String {
    let ports = serialport::available_ports().unwrap_or_default();
    for p in &ports {
        debug!(name = %p.port_name, "available serial port");
    }
    ports
        .into_iter()
        .find(|p| p.port_name.contains(port))
        .map(|p| p.port_name)
        .unwrap_or_else(|| port.to_string())
}

impl Connector for SerialConnector {
    type Source = SerialSource;

    fn connect(&mut self, port: &str) -> Result<SerialSource, TransportError> {
        let path = resolve(port);
        let serial = serialport::new(&path, self.baud)
            .timeout(self.timeout)
            .open()
            .map_err(|err| TransportError::Open {
                port: path.clone(),
                reason: err.to_string(),
            })?;
        info!("Opened serial port {} at {} baud", path, self.baud);
        Ok(SerialSource { port: serial })
    }
}

pub struct SerialSource {
    port: Box<dyn SerialPort>,
}

impl ByteSource for SerialSource {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|err| TransportError::Read(err.to_string()))
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Err(TransportError::TimedOut),
            Err(err) => Err(TransportError::Read(err.to_string())),
        }
    }

    fn write_str(&mut self, s: &str) -> Result<(), TransportError> {
        self.port
            .write_all(s.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(|err| TransportError::Write(err.to_string()))
    }
}
