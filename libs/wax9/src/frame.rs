use tracing::{trace, warn};

use crate::error::TransportError;
use crate::slip;
use crate::source::{ByteSource, CancelToken};

/// Size of the device's receive buffer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 0xFFFF;

/// One unit of bytes pulled off the link.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A `\r`/`\n` terminated text line, terminator excluded.
    Line(&'a [u8]),
    /// An unescaped SLIP frame.
    Binary(&'a [u8]),
    /// The source ran dry, or the read was cancelled, before a frame completed.
    NoData,
    TransportEnded(TransportError),
}

enum Step {
    Complete,
    SwitchToSlip,
    Starved,
}

/// Groups bytes from a [`ByteSource`] into frames, one frame per call.
///
/// Every call starts in line mode and falls into SLIP mode when it meets a [`slip::END`]
/// before a line terminator. Incomplete frames are never returned: whatever was accumulated
/// when the source ran dry is discarded.
pub struct FrameReader {
    frame: Vec<u8>,
    max_len: usize,
    dropped: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            frame: Vec::with_capacity(max_len.min(256)),
            max_len,
            dropped: 0,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Bytes of the last frame that did not fit in the buffer.
    pub fn last_dropped(&self) -> usize {
        self.dropped
    }

    pub fn read_frame<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Frame<'_> {
        self.reset();
        match self.read_line(source, cancel) {
            Ok(Step::Complete) => {
                trace!(len = self.frame.len(), "line frame");
                self.warn_dropped();
                Frame::Line(&self.frame)
            }
            Ok(Step::SwitchToSlip) => {
                self.reset();
                match self.read_slip(source, cancel) {
                    Ok(Step::Complete) => {
                        trace!(len = self.frame.len(), "slip frame");
                        self.warn_dropped();
                        Frame::Binary(&self.frame)
                    }
                    Ok(_) => {
                        self.reset();
                        Frame::NoData
                    }
                    Err(err) => {
                        self.reset();
                        Frame::TransportEnded(err)
                    }
                }
            }
            Ok(Step::Starved) => {
                self.reset();
                Frame::NoData
            }
            Err(err) => {
                self.reset();
                Frame::TransportEnded(err)
            }
        }
    }

    fn reset(&mut self) {
        self.frame.clear();
        self.dropped = 0;
    }

    fn warn_dropped(&self) {
        if self.dropped > 0 {
            warn!(
                dropped = self.dropped,
                max_len = self.max_len,
                "frame exceeded buffer"
            );
        }
    }

    fn store(&mut self, b: u8, limit: usize) {
        if self.frame.len() < limit {
            self.frame.push(b);
        } else {
            self.dropped += 1;
        }
    }

    fn read_line<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Result<Step, TransportError> {
        // the device's line buffer keeps one slot for the terminator
        let limit = self.max_len.saturating_sub(1);
        while let Some(b) = next_byte(source, cancel)? {
            match b {
                slip::END => return Ok(Step::SwitchToSlip),
                b'\r' | b'\n' => {
                    if !self.frame.is_empty() || self.dropped > 0 {
                        return Ok(Step::Complete);
                    }
                }
                b => self.store(b, limit),
            }
        }
        Ok(Step::Starved)
    }

    fn read_slip<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Result<Step, TransportError> {
        let limit = self.max_len;
        while let Some(b) = next_byte(source, cancel)? {
            match b {
                slip::END => {
                    if !self.frame.is_empty() || self.dropped > 0 {
                        return Ok(Step::Complete);
                    }
                }
                slip::ESC => {
                    let Some(escaped) = next_byte(source, cancel)? else {
                        return Ok(Step::Starved);
                    };
                    // unknown escapes are stored as received
                    let b = slip::unescape(escaped).unwrap_or_else(|err| {
                        warn!(%err, "passing escaped value through");
                        escaped
                    });
                    self.store(b, limit);
                }
                b => self.store(b, limit),
            }
        }
        Ok(Step::Starved)
    }
}

fn next_byte<S: ByteSource + ?Sized>(
    source: &mut S,
    cancel: &CancelToken,
) -> Result<Option<u8>, TransportError> {
    if !cancel.is_enabled() || source.bytes_available()? == 0 {
        return Ok(None);
    }
    match source.read_byte() {
        Err(TransportError::TimedOut) => Ok(None),
        res => res.map(Some),
    }
}
