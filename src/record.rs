use embassy_time::{Duration, Instant};
use micromath::F32Ext as _;

use crate::{imu::OrientationSample, radar::RangingSample};

/// Target position relative to the device, mm.
/// y points along heading 0, x along heading 90, z up.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub x_mm: f32,
    pub y_mm: f32,
    pub z_mm: f32,
}

impl Coordinates {
    /// From a slant distance along pitch/yaw given in degrees
    pub fn from_polar(distance_mm: f32, pitch: f32, yaw: f32) -> Self {
        let (pitch, yaw) = (pitch.to_radians(), yaw.to_radians());
        let horizontal = distance_mm * pitch.cos();

        Self {
            x_mm: horizontal * yaw.sin(),
            y_mm: horizontal * yaw.cos(),
            z_mm: distance_mm * pitch.sin(),
        }
    }
}

/// One acquisition cycle: both sensor halves, their skew and the derived position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRecord {
    pub timestamp: Instant,
    pub orientation: OrientationSample,
    pub ranging: RangingSample,
    /// From the raw distance, present only when both halves are valid
    pub coordinates: Option<Coordinates>,
    pub sync_delta: Duration,
    pub sync_valid: bool,
}

impl SensorRecord {
    pub fn fuse(
        timestamp: Instant,
        orientation: OrientationSample,
        ranging: RangingSample,
        max_sync_delta: Duration,
    ) -> Self {
        let sync_delta = sync_delta(orientation.timestamp, ranging.timestamp);
        let coordinates = (orientation.valid && ranging.valid).then(|| {
            Coordinates::from_polar(ranging.raw_distance_mm, orientation.pitch, orientation.yaw)
        });

        Self {
            timestamp,
            orientation,
            ranging,
            coordinates,
            sync_delta,
            sync_valid: sync_delta <= max_sync_delta,
        }
    }

    /// Both halves valid and taken close enough together
    pub fn is_valid(&self) -> bool {
        self.orientation.valid && self.ranging.valid && self.sync_valid
    }
}

/// Absolute time between two reads
pub fn sync_delta(a: Instant, b: Instant) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_SYNC_DELTA;

    fn assert_coords(c: Coordinates, x: f32, y: f32, z: f32) {
        assert!((c.x_mm - x).abs() <= 5.0, "x {} != {x}", c.x_mm);
        assert!((c.y_mm - y).abs() <= 5.0, "y {} != {y}", c.y_mm);
        assert!((c.z_mm - z).abs() <= 5.0, "z {} != {z}", c.z_mm);
    }

    #[test]
    fn test_coordinate_scenarios() {
        assert_coords(Coordinates::from_polar(1000.0, 0.0, 0.0), 0.0, 1000.0, 0.0);
        assert_coords(Coordinates::from_polar(1000.0, 0.0, 90.0), 1000.0, 0.0, 0.0);
        assert_coords(Coordinates::from_polar(1000.0, 45.0, 0.0), 0.0, 707.0, 707.0);
        assert_coords(Coordinates::from_polar(1000.0, -30.0, 180.0), 0.0, -866.0, -500.0);
    }

    fn orientation(ms: u64) -> OrientationSample {
        OrientationSample {
            pitch: 0.0,
            roll: 0.0,
            yaw: 90.0,
            valid: true,
            timestamp: Instant::from_millis(ms),
        }
    }

    fn ranging(ms: u64) -> RangingSample {
        RangingSample {
            raw_distance_mm: 1000.0,
            filtered_distance_mm: 1000.0,
            strength: 100.0,
            num_peaks: 1,
            valid: true,
            timestamp: Instant::from_millis(ms),
        }
    }

    #[test]
    fn test_sync_boundary() {
        let at_limit = SensorRecord::fuse(Instant::from_millis(20), orientation(20), ranging(10), MAX_SYNC_DELTA);
        assert_eq!(at_limit.sync_delta, Duration::from_millis(10));
        assert!(at_limit.sync_valid);
        assert!(at_limit.is_valid());

        let past_limit = SensorRecord::fuse(Instant::from_millis(21), orientation(10), ranging(21), MAX_SYNC_DELTA);
        assert_eq!(past_limit.sync_delta, Duration::from_millis(11));
        assert!(!past_limit.sync_valid);
        assert!(!past_limit.is_valid());
        // out of sync records still carry a position
        assert!(past_limit.coordinates.is_some());
    }

    #[test]
    fn test_coordinates_need_both_halves() {
        let mut lost = ranging(0);
        lost.valid = false;
        let record = SensorRecord::fuse(Instant::from_millis(0), orientation(0), lost, MAX_SYNC_DELTA);
        assert_eq!(record.coordinates, None);
        assert!(record.sync_valid);
        assert!(!record.is_valid());

        let record = SensorRecord::fuse(Instant::from_millis(0), orientation(0), ranging(0), MAX_SYNC_DELTA);
        let c = record.coordinates.unwrap();
        assert!((c.x_mm - 1000.0).abs() < 0.01);
    }

    #[test]
    fn test_coordinates_use_raw_distance() {
        let mut lagging = ranging(0);
        lagging.raw_distance_mm = 1100.0;
        lagging.filtered_distance_mm = 1020.0;
        let mut facing_north = orientation(0);
        facing_north.yaw = 0.0;

        let record = SensorRecord::fuse(Instant::from_millis(0), facing_north, lagging, MAX_SYNC_DELTA);
        let c = record.coordinates.unwrap();
        assert!((c.y_mm - 1100.0).abs() < 0.01, "y {}", c.y_mm);
    }
}
