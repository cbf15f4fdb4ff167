//! Device link for the WAX9 9-axis wearable sensor.
//!
//! Bytes from a serial link are grouped into frames (text lines or SLIP packets), binary
//! frames are decoded into [`RawPacket`]s, converted to physical-unit [`Sample`]s and kept in
//! a bounded newest-first [`SampleHistory`]. [`DeviceSession`] drives all of it from a single
//! polling thread:
//!
//! ```ignore
//! let mut session = DeviceSession::new(SerialConnector::new(&config.serial), config.session);
//! session.open(&config.serial.port)?;
//! session.start()?;
//! loop {
//!     session.update()?;
//!     let fresh = session.mark_as_read();
//!     for sample in session.history().iter().take(fresh) {
//!         println!("{:?}", sample.accel);
//!     }
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod error;
pub mod frame;
pub mod history;
pub mod mem;
pub mod packet;
pub mod sample;
#[cfg(feature = "serial")]
pub mod serial;
pub mod session;
pub mod slip;
pub mod source;

pub use calibration::MagCalibration;
pub use config::{AxisConfig, SerialConfig, SessionConfig, Wax9Config};
pub use error::{ConfigError, FrameError, HistoryError, SessionError, TransportError};
pub use frame::{Frame, FrameReader};
pub use history::SampleHistory;
pub use packet::{RawPacket, decode};
pub use sample::{Sample, Timestamp, convert};
#[cfg(feature = "serial")]
pub use serial::{SerialConnector, SerialSource};
pub use session::{DeviceSession, Link, OrientationHook, SessionState};
pub use source::{ByteSource, CancelToken, Connector};
