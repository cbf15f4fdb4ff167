use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Hard/soft iron correction for the magnetometer.
///
/// The link only stores this. Estimating it (e.g. centering the bounding box of a
/// figure-eight sweep) and persisting it are left to calibration tooling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagCalibration {
    /// uT
    pub offset: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self {
            offset: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl MagCalibration {
    pub fn apply(&self, mag: Vector3<f32>) -> Vector3<f32> {
        (mag - self.offset).component_mul(&self.scale)
    }
}
