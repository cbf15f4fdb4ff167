//! Device session: connection lifecycle, command strings and the poll loop body.

use nalgebra::Vector3;
use tracing::{debug, info, trace, warn};

use crate::calibration::MagCalibration;
use crate::config::{RESET_COMMAND, STREAM_COMMAND, SessionConfig};
use crate::error::{FrameError, HistoryError, SessionError, TransportError};
use crate::frame::{Frame, FrameReader};
use crate::history::SampleHistory;
use crate::packet::{self, RawPacket};
use crate::sample::Sample;
use crate::source::{ByteSource, CancelToken, Connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected(Link),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Idle,
    Streaming,
}

/// Orientation estimator fed by the session.
///
/// The session does no fusion itself; it forwards every stored sample and resets on request.
pub trait OrientationHook {
    fn on_sample(&mut self, sample: &Sample);

    fn reset(&mut self);
}

enum Pumped {
    Packet(Result<RawPacket, FrameError>),
    Nothing,
    Ended(TransportError),
}

pub struct DeviceSession<C: Connector> {
    connector: C,
    source: Option<C::Source>,
    state: SessionState,
    config: SessionConfig,
    calibration: MagCalibration,
    history: SampleHistory,
    reader: FrameReader,
    cancel: CancelToken,
    hook: Option<Box<dyn OrientationHook>>,
}

impl<C: Connector> DeviceSession<C> {
    pub fn new(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            source: None,
            state: SessionState::Disconnected,
            history: SampleHistory::new(config.history_len),
            config,
            calibration: MagCalibration::default(),
            reader: FrameReader::new(),
            cancel: CancelToken::new(),
            hook: None,
        }
    }

    /// Acquires the transport for `port`. An already open link is stopped first.
    pub fn open(&mut self, port: &str) -> Result<(), SessionError> {
        self.stop();
        self.state = SessionState::Connecting;
        trace!(port, "connecting");
        match self.connector.connect(port) {
            Ok(source) => {
                info!(port, "receiver connected");
                self.source = Some(source);
                self.cancel.enable();
                self.state = SessionState::Connected(Link::Idle);
                Ok(())
            }
            Err(err) => {
                warn!(port, %err, "receiver unable to connect");
                self.state = SessionState::Disconnected;
                Err(err.into())
            }
        }
    }

    /// Sends the settings block, waits for one reply line and starts the stream.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Connected(Link::Idle) {
            return Err(self.invalid("start"));
        }
        let Some(source) = self.source.as_mut() else {
            return Err(self.invalid("start"));
        };
        let settings = self.config.settings_command();
        let reply_timeout = self.config.reply_timeout();
        info!(settings = settings.trim(), "configuring device");

        let res = source
            .write_str(&settings)
            .and_then(|_| source.read_line(reply_timeout))
            .and_then(|reply| {
                info!(reply = reply.trim(), "device replied");
                source.write_str(STREAM_COMMAND)
            });
        if let Err(err) = res {
            return Err(self.drop_link(err));
        }
        self.state = SessionState::Connected(Link::Streaming);
        info!("streaming");
        Ok(())
    }

    /// Reads at most one frame and stores the sample it carries.
    ///
    /// Returns the number of samples produced, 0 or 1. Outside of streaming this does nothing.
    pub fn update(&mut self) -> Result<usize, SessionError> {
        if self.state != SessionState::Connected(Link::Streaming) {
            return Ok(0);
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };
        let pumped = match self.reader.read_frame(source, &self.cancel) {
            Frame::Binary(bytes) => Pumped::Packet(packet::decode(bytes)),
            Frame::Line(line) => {
                debug!(line = %String::from_utf8_lossy(line), "device line");
                Pumped::Nothing
            }
            Frame::NoData => Pumped::Nothing,
            Frame::TransportEnded(err) => Pumped::Ended(err),
        };

        match pumped {
            Pumped::Packet(Ok(raw)) => {
                if self.config.debug {
                    debug!(
                        sample = raw.sample_number,
                        timestamp = raw.timestamp.seconds(),
                        accel = ?raw.accel,
                        gyro = ?raw.gyro,
                        mag = ?raw.mag,
                        "wax9 packet"
                    );
                }
                let sample = Sample::from(&raw);
                self.history.push(sample);
                if let Some(hook) = self.hook.as_mut() {
                    hook.on_sample(&sample);
                }
                Ok(1)
            }
            // already logged by the decoder
            Pumped::Packet(Err(_)) | Pumped::Nothing => Ok(0),
            Pumped::Ended(err) => Err(self.drop_link(err)),
        }
    }

    /// Resets the device and drops the link. Safe to call in any state.
    pub fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(err) = source.write_str(RESET_COMMAND) {
                warn!(%err, "failed to send reset");
            }
            info!("resetting and disconnecting WAX9");
        }
        self.cancel.cancel();
        self.state = SessionState::Disconnected;
    }

    fn drop_link(&mut self, err: TransportError) -> SessionError {
        warn!(%err, "transport failed, disconnecting");
        self.source = None;
        self.cancel.cancel();
        self.state = SessionState::Disconnected;
        err.into()
    }

    fn invalid(&self, op: &'static str) -> SessionError {
        SessionError::InvalidState {
            op,
            state: self.state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected(_))
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Connected(Link::Streaming)
    }

    pub fn is_enabled(&self) -> bool {
        self.cancel.is_enabled()
    }

    /// A handle that aborts in-flight frame reads when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Changes take effect on the next [`DeviceSession::start`]. The history keeps the
    /// capacity it was built with.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut SampleHistory {
        &mut self.history
    }

    pub fn unread(&self) -> usize {
        self.history.unread()
    }

    /// Marks every stored sample read, returning how many were unread.
    pub fn mark_as_read(&mut self) -> usize {
        self.history.drain()
    }

    pub fn sample(&self, index: usize) -> Result<&Sample, HistoryError> {
        self.history.at(index)
    }

    pub fn has_readings(&self) -> bool {
        self.history.has_readings()
    }

    /// Pitch of the newest sample in radians, 0 without samples.
    pub fn pitch(&self) -> f32 {
        self.history.latest().map_or(0.0, Sample::pitch)
    }

    /// Roll of the newest sample in radians, 0 without samples.
    pub fn roll(&self) -> f32 {
        self.history.latest().map_or(0.0, Sample::roll)
    }

    pub fn calibration(&self) -> &MagCalibration {
        &self.calibration
    }

    pub fn set_calibration(&mut self, calibration: MagCalibration) {
        self.calibration = calibration;
    }

    pub fn mag_offset(&self) -> Vector3<f32> {
        self.calibration.offset
    }

    pub fn set_mag_offset(&mut self, offset: Vector3<f32>) {
        self.calibration.offset = offset;
    }

    pub fn mag_scale(&self) -> Vector3<f32> {
        self.calibration.scale
    }

    pub fn set_mag_scale(&mut self, scale: Vector3<f32>) {
        self.calibration.scale = scale;
    }

    pub fn set_orientation_hook(&mut self, hook: impl OrientationHook + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Resets the orientation estimator, if one is attached.
    pub fn reset_orientation(&mut self) -> bool {
        match self.hook.as_mut() {
            Some(hook) => {
                hook.reset();
                true
            }
            None => false,
        }
    }
}

impl<C: Connector> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;
    use nalgebra::vector;

    use super::*;
    use crate::mem::{MemoryConnector, MemorySource};
    use crate::slip;

    fn packet(sample_number: u16, accel_x: i16) -> Vec<u8> {
        let mut bytes = vec![b'9', 1];
        bytes.extend_from_slice(&sample_number.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        for v in [accel_x, 0, 4096, 0, 0, 0, 0, 0, 0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        slip::encode_vec(&bytes)
    }

    fn streaming() -> (DeviceSession<MemoryConnector>, MemorySource) {
        let source = MemorySource::with_bytes(b"OK\r\n");
        let mut session =
            DeviceSession::new(MemoryConnector::new(source.clone()), SessionConfig::default());
        session.open("WAX9").unwrap();
        session.start().unwrap();
        source.clear_written();
        (session, source)
    }

    #[test]
    fn test_start_before_open_is_rejected() {
        let source = MemorySource::new();
        let mut session =
            DeviceSession::new(MemoryConnector::new(source.clone()), SessionConfig::default());
        assert_eq!(
            session.start(),
            Err(SessionError::InvalidState {
                op: "start",
                state: SessionState::Disconnected
            })
        );
        assert_eq!(source.written(), "");
    }

    #[test]
    fn test_update_while_disconnected_is_inert() {
        let source = MemorySource::with_bytes(&packet(1, 0));
        let mut session =
            DeviceSession::new(MemoryConnector::new(source.clone()), SessionConfig::default());
        assert_eq!(session.update(), Ok(0));
        assert!(session.history().is_empty());
        assert_eq!(source.pending(), 28);
    }

    #[test]
    fn test_failed_open_stays_disconnected() {
        let mut session = DeviceSession::new(MemoryConnector::refusing(), SessionConfig::default());
        let err = session.open("WAX9").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Open { .. })
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_start_sends_settings_then_stream() {
        let source = MemorySource::with_bytes(b"\r\nOK\r\n");
        let mut session =
            DeviceSession::new(MemoryConnector::new(source.clone()), SessionConfig::default());
        session.open("WAX9").unwrap();
        assert_eq!(session.state(), SessionState::Connected(Link::Idle));
        session.start().unwrap();
        assert!(session.is_streaming());
        assert_eq!(
            source.written(),
            format!(
                "{}{}",
                SessionConfig::default().settings_command(),
                STREAM_COMMAND
            )
        );
        assert_eq!(
            session.start(),
            Err(SessionError::InvalidState {
                op: "start",
                state: SessionState::Connected(Link::Streaming)
            })
        );
    }

    #[test]
    fn test_start_write_failure_disconnects() {
        let source = MemorySource::with_bytes(b"OK\r\n");
        source.fail_writes(true);
        let mut session =
            DeviceSession::new(MemoryConnector::new(source.clone()), SessionConfig::default());
        session.open("WAX9").unwrap();
        assert!(matches!(
            session.start(),
            Err(SessionError::Transport(TransportError::Write(_)))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_start_waits_for_a_slow_reply() {
        let source = MemorySource::with_bytes(b"OK\r\n");
        source.stall_reads(3);
        let mut session =
            DeviceSession::new(MemoryConnector::new(source.clone()), SessionConfig::default());
        session.open("WAX9").unwrap();
        session.start().unwrap();
        assert!(session.is_streaming());
        assert!(source.written().ends_with(STREAM_COMMAND));
    }

    #[test]
    fn test_start_gives_up_when_the_device_never_replies() {
        let source = MemorySource::new();
        source.stall_reads(usize::MAX);
        let config = SessionConfig {
            reply_timeout_ms: 20,
            ..Default::default()
        };
        let mut session = DeviceSession::new(MemoryConnector::new(source.clone()), config);
        session.open("WAX9").unwrap();
        assert_eq!(
            session.start(),
            Err(SessionError::Transport(TransportError::TimedOut))
        );
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!source.written().contains(STREAM_COMMAND));
    }

    #[test]
    fn test_update_stores_samples() {
        let (mut session, source) = streaming();
        source.feed(b"\r\nOK\r\n");
        source.feed(&packet(1, 4096));
        assert_eq!(session.update(), Ok(0));
        assert_eq!(session.update(), Ok(1));
        assert_eq!(session.update(), Ok(0));
        assert_eq!(session.unread(), 1);
        assert_relative_eq!(session.sample(0).unwrap().accel, vector![1.0, 0.0, 1.0]);
        assert_eq!(session.mark_as_read(), 1);
        assert_eq!(session.unread(), 0);
    }

    #[test]
    fn test_bad_frames_do_not_break_the_stream() {
        let (mut session, source) = streaming();
        source.feed(&slip::encode_vec(b"9short"));
        source.feed(&slip::encode_vec(b"Xnot a packet"));
        source.feed(&packet(2, 0));
        assert_eq!(session.update(), Ok(0));
        assert_eq!(session.update(), Ok(0));
        assert_eq!(session.update(), Ok(1));
        assert!(session.is_streaming());
        assert_eq!(session.sample(0).unwrap().sample_number, 2);
    }

    #[test]
    fn test_transport_end_disconnects() {
        let (mut session, source) = streaming();
        source.close();
        assert_eq!(
            session.update(),
            Err(SessionError::Transport(TransportError::Closed))
        );
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.update(), Ok(0));
    }

    #[test]
    fn test_stop_is_idempotent_and_best_effort() {
        let (mut session, source) = streaming();
        source.fail_writes(true);
        session.stop();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_enabled());
        session.stop();
        assert_eq!(session.state(), SessionState::Disconnected);

        source.fail_writes(false);
        session.open("WAX9").unwrap();
        assert!(session.is_enabled());
        session.stop();
        assert_eq!(source.written(), RESET_COMMAND);
    }

    #[test]
    fn test_cancelled_session_reads_nothing() {
        let (mut session, source) = streaming();
        source.feed(&packet(1, 0));
        session.cancel_token().cancel();
        assert_eq!(session.update(), Ok(0));
        assert_eq!(source.pending(), 28);
    }

    #[test]
    fn test_calibration_accessors() {
        let (mut session, _source) = streaming();
        assert_eq!(session.mag_scale(), vector![1.0, 1.0, 1.0]);
        session.set_mag_offset(vector![1.0, 2.0, 3.0]);
        session.set_mag_scale(vector![2.0, 2.0, 2.0]);
        assert_eq!(session.calibration().offset, vector![1.0, 2.0, 3.0]);
        assert_eq!(session.mag_scale(), vector![2.0, 2.0, 2.0]);
    }

    #[derive(Default)]
    struct Counter {
        samples: Arc<Mutex<Vec<u16>>>,
        resets: Arc<Mutex<usize>>,
    }

    impl OrientationHook for Counter {
        fn on_sample(&mut self, sample: &Sample) {
            self.samples.lock().unwrap().push(sample.sample_number);
        }

        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_orientation_hook_sees_samples() {
        let (mut session, source) = streaming();
        assert!(!session.reset_orientation());

        let counter = Counter::default();
        let samples = counter.samples.clone();
        let resets = counter.resets.clone();
        session.set_orientation_hook(counter);

        source.feed(&packet(5, 0));
        source.feed(&packet(6, 0));
        session.update().unwrap();
        session.update().unwrap();
        assert!(session.reset_orientation());
        assert_eq!(*samples.lock().unwrap(), vec![5, 6]);
        assert_eq!(*resets.lock().unwrap(), 1);
    }

    #[test]
    fn test_tilt_uses_newest_sample() {
        let (mut session, source) = streaming();
        assert_eq!(session.pitch(), 0.0);
        source.feed(&packet(1, 4096));
        session.update().unwrap();
        assert_relative_eq!(session.pitch(), std::f32::consts::FRAC_PI_4);
        assert_relative_eq!(session.roll(), 0.0);
    }
}
