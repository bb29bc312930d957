use embassy_time::Duration;
use log::warn;

use crate::error::Error;

/// Acquisition period, 10Hz
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Longest wait for the sensor bus before a read is skipped
pub const BUS_TIMEOUT: Duration = Duration::from_millis(10);

/// Largest skew between the two halves of a record that still counts as synchronized
pub const MAX_SYNC_DELTA: Duration = Duration::from_millis(10);

/// Length of both calibration windows
pub const CALIBRATION_WINDOW: Duration = Duration::from_secs(20);

/// Age after which a cached sample is no longer fresh
pub const SAMPLE_MAX_AGE: Duration = Duration::from_millis(100);

/// Records kept by the sample queue
pub const QUEUE_CAPACITY: usize = 5;

pub const DEFAULT_PITCH_DEAD_ZONE: f32 = 0.1;
pub const DEFAULT_YAW_DEAD_ZONE: f32 = 0.15;
pub const MAX_DEAD_ZONE: f32 = 5.0;

pub const DEFAULT_RANGE_START_MM: f32 = 250.0;
pub const DEFAULT_RANGE_END_MM: f32 = 1500.0;
pub const RANGE_START_MIN_MM: f32 = 100.0;
pub const RANGE_START_MAX_MM: f32 = 5000.0;
pub const RANGE_END_MAX_MM: f32 = 10_000.0;
/// Smallest allowed distance between window start and end
pub const RANGE_MIN_SPAN_MM: f32 = 100.0;

pub const DEFAULT_SMOOTHING: f32 = 0.2;

/// Jump in the Kalman output treated as a new target instead of noise
pub const REACQUIRE_THRESHOLD_MM: f32 = 400.0;

/// Noise model of the scalar distance filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanParams {
    pub process_noise: f32,
    pub measurement_noise: f32,
    pub initial_error: f32,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 20.0,
            measurement_noise: 10.0,
            initial_error: 0.1,
        }
    }
}

impl KalmanParams {
    /// Checked constructor, measurement noise must be strictly positive
    pub fn new(process_noise: f32, measurement_noise: f32, initial_error: f32) -> Result<Self, Error> {
        let finite = process_noise.is_finite() && measurement_noise.is_finite() && initial_error.is_finite();
        if !finite || process_noise < 0.0 || initial_error < 0.0 || measurement_noise <= 0.0 {
            return Err(Error::InvalidKalmanParameters);
        }

        Ok(Self {
            process_noise,
            measurement_noise,
            initial_error,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationConfig {
    pub pitch_dead_zone: f32,
    pub yaw_dead_zone: f32,
    pub calibration_window: Duration,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            pitch_dead_zone: DEFAULT_PITCH_DEAD_ZONE,
            yaw_dead_zone: DEFAULT_YAW_DEAD_ZONE,
            calibration_window: CALIBRATION_WINDOW,
        }
    }
}

impl OrientationConfig {
    pub fn with_dead_zones(mut self, pitch: f32, yaw: f32) -> Self {
        self.pitch_dead_zone = clamp_dead_zone(pitch, DEFAULT_PITCH_DEAD_ZONE);
        self.yaw_dead_zone = clamp_dead_zone(yaw, DEFAULT_YAW_DEAD_ZONE);
        self
    }

    pub fn with_calibration_window(mut self, window: Duration) -> Self {
        self.calibration_window = window;
        self
    }
}

/// Dead zones live in [0, MAX_DEAD_ZONE] degrees, NaN falls back to `default`
pub fn clamp_dead_zone(value: f32, default: f32) -> f32 {
    if value.is_nan() {
        warn!("NaN dead zone, using {default}");
        return default;
    }
    value.clamp(0.0, MAX_DEAD_ZONE)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingConfig {
    pub range_start_mm: f32,
    pub range_end_mm: f32,
    pub smoothing: f32,
    pub reacquire_threshold_mm: f32,
    pub kalman: KalmanParams,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            range_start_mm: DEFAULT_RANGE_START_MM,
            range_end_mm: DEFAULT_RANGE_END_MM,
            smoothing: DEFAULT_SMOOTHING,
            reacquire_threshold_mm: REACQUIRE_THRESHOLD_MM,
            kalman: KalmanParams::default(),
        }
    }
}

impl RangingConfig {
    pub fn with_range(mut self, start_mm: f32, end_mm: f32) -> Self {
        let (start, end) = clamp_range(start_mm, end_mm);
        self.range_start_mm = start;
        self.range_end_mm = end;
        self
    }

    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = clamp_smoothing(smoothing, self.smoothing);
        self
    }

    pub fn with_kalman(mut self, kalman: KalmanParams) -> Self {
        self.kalman = kalman;
        self
    }
}

/// Start is kept in [100, 5000] mm, end in [start + 100, 10000] mm.
/// NaN bounds are replaced by the defaults.
pub fn clamp_range(start_mm: f32, end_mm: f32) -> (f32, f32) {
    let start = if start_mm.is_nan() { DEFAULT_RANGE_START_MM } else { start_mm };
    let end = if end_mm.is_nan() { DEFAULT_RANGE_END_MM } else { end_mm };

    let start = start.clamp(RANGE_START_MIN_MM, RANGE_START_MAX_MM);
    let end = end.clamp(start + RANGE_MIN_SPAN_MM, RANGE_END_MAX_MM);
    (start, end)
}

/// Smoothing factor lives in [0, 1], NaN keeps `current`
pub fn clamp_smoothing(value: f32, current: f32) -> f32 {
    if value.is_nan() {
        warn!("NaN smoothing factor ignored");
        return current;
    }
    value.clamp(0.0, 1.0)
}

/// Timing of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub period: Duration,
    pub bus_timeout: Duration,
    pub max_sync_delta: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            period: SAMPLE_PERIOD,
            bus_timeout: BUS_TIMEOUT,
            max_sync_delta: MAX_SYNC_DELTA,
        }
    }
}

impl AcquisitionConfig {
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_bus_timeout(mut self, timeout: Duration) -> Self {
        self.bus_timeout = timeout;
        self
    }

    pub fn with_max_sync_delta(mut self, delta: Duration) -> Self {
        self.max_sync_delta = delta;
        self
    }
}
