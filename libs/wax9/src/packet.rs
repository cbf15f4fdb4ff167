//! 9-axis packet layout.
//!
//! Packets are little-endian and transmitted SLIP-encoded. The standard part is 26 bytes;
//! extended packets append battery, temperature and pressure. Frames may stop anywhere
//! past the gyro fields, and whatever they do not cover is filled with an "absent" value.

use tracing::{debug, warn};
use zerocopy::little_endian::{I16, U16, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::FrameError;
use crate::sample::Timestamp;

/// ASCII type marker of a 9-axis packet.
pub const PACKET_TYPE: u8 = b'9';
pub const VERSION_STANDARD: u8 = 0x01;
pub const VERSION_EXTENDED: u8 = 0x02;

/// Header through the gyro fields.
pub const MIN_LEN: usize = 20;
const MAG_END: usize = 26;
const BATTERY_END: usize = 28;
const TEMPERATURE_END: usize = 30;
const PRESSURE_END: usize = 34;

pub const BATTERY_ABSENT: u16 = 0xFFFF;
/// The 0xFFFF bit pattern.
pub const TEMPERATURE_ABSENT: i16 = -1;
pub const PRESSURE_ABSENT: u32 = 0xFFFF_FFFF;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct WirePacket {
    packet_type: u8,
    version: u8,
    sample_number: U16,
    timestamp: U32,
    accel: [I16; 3],
    gyro: [I16; 3],
    mag: [I16; 3],
    battery: U16,
    temperature: I16,
    pressure: U32,
}

const _: () = assert!(size_of::<WirePacket>() == PRESSURE_END);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket {
    pub packet_type: u8,
    pub version: u8,
    /// Resets on configuration change, inactivity and wrap-around.
    pub sample_number: u16,
    pub timestamp: Timestamp,
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    pub mag: [i16; 3],
    /// mV
    pub battery: u16,
    /// 0.1 degrees C
    pub temperature: i16,
    /// Pa
    pub pressure: u32,
    /// Length of the frame this packet was decoded from.
    pub frame_len: usize,
}

impl RawPacket {
    pub fn has_mag(&self) -> bool {
        self.frame_len >= MAG_END
    }

    pub fn battery_mv(&self) -> Option<u16> {
        (self.frame_len >= BATTERY_END).then_some(self.battery)
    }

    pub fn temperature_c(&self) -> Option<f32> {
        (self.frame_len >= TEMPERATURE_END).then(|| self.temperature as f32 * 0.1)
    }

    pub fn pressure_pa(&self) -> Option<u32> {
        (self.frame_len >= PRESSURE_END).then_some(self.pressure)
    }
}

/// Parses one binary frame.
///
/// Bytes past the pressure field (e.g. a device id) are ignored.
pub fn decode(frame: &[u8]) -> Result<RawPacket, FrameError> {
    if frame.first() != Some(&PACKET_TYPE) {
        debug!(len = frame.len(), "unrecognized packet, ignoring");
        return Err(FrameError::NotAPacket);
    }
    let len = frame.len();
    if len < MIN_LEN {
        warn!(len, "unrecognized WAX9 packet, ignoring");
        return Err(FrameError::TooShort { len });
    }

    let mut wire = WirePacket::new_zeroed();
    let covered = len.min(PRESSURE_END);
    wire.as_mut_bytes()[..covered].copy_from_slice(&frame[..covered]);

    let triple = |v: [I16; 3]| v.map(|c| c.get());
    Ok(RawPacket {
        packet_type: wire.packet_type,
        version: wire.version,
        sample_number: wire.sample_number.get(),
        timestamp: Timestamp(wire.timestamp.get()),
        accel: triple(wire.accel),
        gyro: triple(wire.gyro),
        mag: if len >= MAG_END {
            triple(wire.mag)
        } else {
            [0; 3]
        },
        battery: if len >= BATTERY_END {
            wire.battery.get()
        } else {
            BATTERY_ABSENT
        },
        temperature: if len >= TEMPERATURE_END {
            wire.temperature.get()
        } else {
            TEMPERATURE_ABSENT
        },
        pressure: if len >= PRESSURE_END {
            wire.pressure.get()
        } else {
            PRESSURE_ABSENT
        },
        frame_len: len,
    })
}

/// Serializes a packet in the extended layout, truncated to `len` bytes.
///
/// The inverse of [`decode`], used to synthesize device traffic.
pub fn encode(packet: &RawPacket, len: usize) -> Vec<u8> {
    let triple = |v: [i16; 3]| v.map(I16::new);
    let wire = WirePacket {
        packet_type: packet.packet_type,
        version: packet.version,
        sample_number: U16::new(packet.sample_number),
        timestamp: U32::new(packet.timestamp.0),
        accel: triple(packet.accel),
        gyro: triple(packet.gyro),
        mag: triple(packet.mag),
        battery: U16::new(packet.battery),
        temperature: I16::new(packet.temperature),
        pressure: U32::new(packet.pressure),
    };
    wire.as_bytes()[..len.min(PRESSURE_END)].to_vec()
}
