use approx::assert_relative_eq;
use nalgebra::vector;
use wax9::mem::{MemoryConnector, MemorySource};
use wax9::packet::{self, BATTERY_ABSENT, PRESSURE_ABSENT, TEMPERATURE_ABSENT};
use wax9::{DeviceSession, RawPacket, SessionConfig, SessionState, Timestamp, slip};

fn raw(sample_number: u16, accel: [i16; 3]) -> RawPacket {
    RawPacket {
        packet_type: packet::PACKET_TYPE,
        version: packet::VERSION_STANDARD,
        sample_number,
        timestamp: Timestamp(sample_number as u32 * 6554),
        accel,
        gyro: [100, 0, -100],
        mag: [250, -250, 500],
        battery: BATTERY_ABSENT,
        temperature: TEMPERATURE_ABSENT,
        pressure: PRESSURE_ABSENT,
        frame_len: 26,
    }
}

fn wire(packet: &RawPacket) -> Vec<u8> {
    slip::encode_vec(&packet::encode(packet, packet.frame_len))
}

fn session(source: &MemorySource, history_len: usize) -> DeviceSession<MemoryConnector> {
    let config = SessionConfig {
        history_len: history_len.try_into().unwrap(),
        ..Default::default()
    };
    DeviceSession::new(MemoryConnector::new(source.clone()), config)
}

#[test]
fn two_packets_arrive_newest_first() {
    let source = MemorySource::with_bytes(b"OK\r\n");
    let mut session = session(&source, 120);
    session.open("WAX9").unwrap();
    session.start().unwrap();

    let mut stream = wire(&raw(1, [4096, 0, -4096]));
    stream.extend(wire(&raw(2, [0, 2048, 0])));
    source.feed(&stream);

    assert_eq!(session.update().unwrap(), 1);
    assert_eq!(session.update().unwrap(), 1);
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.unread(), 2);

    let newest = session.sample(0).unwrap();
    assert_eq!(newest.sample_number, 2);
    assert_relative_eq!(newest.accel, vector![0.0, 0.5, 0.0]);

    let oldest = session.sample(1).unwrap();
    assert_eq!(oldest.sample_number, 1);
    assert_relative_eq!(oldest.accel, vector![1.0, 0.0, -1.0]);
    assert_relative_eq!(oldest.gyro, vector![7.0, 0.0, -7.0], epsilon = 1e-4);
    assert_relative_eq!(oldest.mag, vector![25.0, -25.0, -50.0], epsilon = 1e-4);

    assert!(session.sample(2).is_err());
    assert_eq!(session.mark_as_read(), 2);
    assert_eq!(session.mark_as_read(), 0);
}

#[test]
fn interleaved_replies_and_escaped_payloads() {
    let source = MemorySource::with_bytes(b"OK\r\n");
    let mut session = session(&source, 120);
    session.open("WAX9").unwrap();
    session.start().unwrap();

    // 0x00c0 and 0x00db put SLIP reserved bytes on the wire
    let escaped = raw(0x00c0, [0x00db, 0, 0]);
    source.feed(b"\r\nOK\r\n");
    source.feed(&wire(&escaped));
    source.feed(b"\r\nOK\r\n");
    source.feed(&wire(&raw(7, [0; 3])));

    let mut produced = 0;
    while source.pending() > 0 {
        produced += session.update().unwrap();
    }
    assert_eq!(produced, 2);
    assert_eq!(session.sample(1).unwrap().sample_number, 0x00c0);
    assert_relative_eq!(session.sample(1).unwrap().accel.x, 0xdb as f32 / 4096.0);
}

#[test]
fn history_is_bounded() {
    let source = MemorySource::with_bytes(b"OK\r\n");
    let mut session = session(&source, 4);
    session.open("WAX9").unwrap();
    session.start().unwrap();

    for n in 0..10 {
        source.feed(&wire(&raw(n, [0; 3])));
    }
    while source.pending() > 0 {
        session.update().unwrap();
    }
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.unread(), 4);
    let numbers: Vec<_> = session.history().iter().map(|s| s.sample_number).collect();
    assert_eq!(numbers, vec![9, 8, 7, 6]);
}

#[test]
fn reconnect_after_transport_loss() {
    let source = MemorySource::with_bytes(b"OK\r\n");
    let mut session = session(&source, 8);
    session.open("WAX9").unwrap();
    session.start().unwrap();
    source.feed(&wire(&raw(1, [0; 3])));
    session.update().unwrap();

    source.close();
    assert!(session.update().is_err());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.start().is_err());

    let fresh = MemorySource::with_bytes(b"OK\r\n");
    let mut session = self::session(&fresh, 8);
    session.open("WAX9").unwrap();
    session.start().unwrap();
    assert!(session.is_streaming());
}
