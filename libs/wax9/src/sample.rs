use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::packet::RawPacket;

/// Device counts per g (table 19 of the WAX9 developer guide).
pub const ACCEL_COUNTS_PER_G: f32 = 4096.0;
/// deg/s per gyro count (table 20).
pub const GYRO_DPS_PER_COUNT: f32 = 0.07;
/// uT per magnetometer count.
pub const MAG_UT_PER_COUNT: f32 = 0.1;

/// Device timestamp, 16.16 fixed-point seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u32);

impl Timestamp {
    pub fn seconds(self) -> f64 {
        self.0 as f64 / 65536.0
    }
}

/// A single reading in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sample_number: u16,
    pub timestamp: Timestamp,
    /// g
    pub accel: Vector3<f32>,
    /// deg/s
    pub gyro: Vector3<f32>,
    /// uT, with the device's Z axis inverted
    pub mag: Vector3<f32>,
}

impl Sample {
    /// Rotation about x from the accelerometer alone, in radians.
    pub fn pitch(&self) -> f32 {
        let a = self.accel;
        a.x.atan2((a.y * a.y + a.z * a.z).sqrt())
    }

    /// Rotation about z from the accelerometer alone, in radians.
    pub fn roll(&self) -> f32 {
        let a = self.accel;
        (-a.y).atan2(a.z)
    }
}

impl From<&RawPacket> for Sample {
    fn from(packet: &RawPacket) -> Self {
        convert(packet)
    }
}

pub fn convert(packet: &RawPacket) -> Sample {
    let vec = |v: [i16; 3]| Vector3::new(v[0] as f32, v[1] as f32, v[2] as f32);
    let [mx, my, mz] = packet.mag;
    Sample {
        sample_number: packet.sample_number,
        timestamp: packet.timestamp,
        accel: vec(packet.accel) / ACCEL_COUNTS_PER_G,
        gyro: vec(packet.gyro) * GYRO_DPS_PER_COUNT,
        // widen before negating so i16::MIN flips cleanly
        mag: Vector3::new(mx as f32, my as f32, -(mz as f32)) * MAG_UT_PER_COUNT,
    }
}
