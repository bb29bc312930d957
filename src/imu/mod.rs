use core::fmt::Debug;

use embassy_time::Instant;
use nalgebra::Vector3;

use crate::config::SAMPLE_MAX_AGE;

mod estimator;
pub mod heading;
pub mod mag_cal;

pub use estimator::OrientationEstimator;
pub use mag_cal::{CalibrationStore, MagEnvelope, MagnetometerCalibration};

/// One raw read of the accelerometer, gyroscope and magnetometer.
/// Units only need to be consistent per sensor, all angles are derived from ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuReading {
    pub accel: Vector3<f32>,
    pub gyro: Vector3<f32>,
    pub mag: Vector3<f32>,
}

impl ImuReading {
    pub fn is_finite(&self) -> bool {
        self.accel.iter().chain(self.gyro.iter()).chain(self.mag.iter()).all(|v| v.is_finite())
    }
}

/// Orientation sensor sitting on a shared bus.
/// The bus is borrowed per read, so reads only happen while the bus lock is held.
#[allow(async_fn_in_trait)]
pub trait InertialSensor<BUS> {
    type Error: Debug;

    async fn read(&mut self, bus: &mut BUS) -> Result<ImuReading, Self::Error>;
}

/// Filtered orientation in degrees, yaw in [0, 360)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub valid: bool,
    pub timestamp: Instant,
}

impl OrientationSample {
    /// Zeroed, invalid
    pub const fn invalid(timestamp: Instant) -> Self {
        Self {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            valid: false,
            timestamp,
        }
    }

    /// Valid and taken no longer than [`SAMPLE_MAX_AGE`] before `now`
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.valid && now.saturating_duration_since(self.timestamp) <= SAMPLE_MAX_AGE
    }
}
