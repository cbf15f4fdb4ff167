use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum TransportError {
    #[error("unable to open {port}: {reason}")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::transport_open),
            help("check the bluetooth pairing and the port name")
        )
    )]
    Open { port: String, reason: String },

    #[error("read failed: {0}")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(code(wax9::transport_read), help("the byte source failed mid-read"))
    )]
    Read(String),

    #[error("read timed out")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::transport_timeout),
            help("the device did not answer in time; raise `reply_timeout_ms` for slow links")
        )
    )]
    TimedOut,

    #[error("write failed: {0}")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::transport_write),
            help("the device link rejected a command string")
        )
    )]
    Write(String),

    #[error("transport closed")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::transport_closed),
            help("the byte source has no more data and will not produce any")
        )
    )]
    Closed,
}

/// Per-frame decode failures. None of these abort a session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum FrameError {
    #[error("frame is not a 9-axis packet")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::not_a_packet),
            help("the frame was empty or did not start with the '9' type marker")
        )
    )]
    NotAPacket,

    #[error("packet too short: {len} bytes")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::too_short),
            help("a packet needs at least 20 bytes to cover the header and gyro fields")
        )
    )]
    TooShort { len: usize },

    #[error("unexpected escaped value: {byte:#04x}")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::bad_escape),
            help("only 0xdc and 0xdd may follow a SLIP escape byte")
        )
    )]
    BadEscape { byte: u8 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum HistoryError {
    #[error("index {index} out of range for history of {len} samples")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::index_out_of_range),
            help("index 0 is the newest sample, valid indices are below the history size")
        )
    )]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum SessionError {
    #[error(transparent)]
    #[cfg_attr(feature = "miette", diagnostic(transparent))]
    Transport(#[from] TransportError),

    #[error("{op} is not valid while {state:?}")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(
            code(wax9::invalid_state),
            help("open a port before start, and start before expecting samples")
        )
    )]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
}

#[derive(Error, Debug)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum ConfigError {
    #[error("io error: {0}")]
    #[cfg_attr(feature = "miette", diagnostic(code(wax9::config_io)))]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    #[cfg_attr(
        feature = "miette",
        diagnostic(code(wax9::config_parse), help("see SessionConfig for the accepted keys"))
    )]
    Parse(#[from] toml::de::Error),

    #[error("unable to serialize config: {0}")]
    #[cfg_attr(feature = "miette", diagnostic(code(wax9::config_serialize)))]
    Serialize(#[from] toml::ser::Error),
}
