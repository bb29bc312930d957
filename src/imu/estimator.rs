use embassy_time::Instant;
use log::{debug, info, warn};
use micromath::F32Ext as _;

use super::{
    heading::{angle_difference, map_clamped, normalize_degrees, tilt_compensated_heading, tilt_from_accel},
    CalibrationStore, ImuReading, MagEnvelope, MagnetometerCalibration, OrientationSample,
};
use crate::{
    calibration::{CalibrationKind, CalibrationRun},
    config::{clamp_dead_zone, OrientationConfig},
    error::Error,
};

/// Pitch deltas over this many degrees get the fastest pitch blend
const PITCH_DELTA_SPAN: f32 = 10.0;
const PITCH_ALPHA_MIN: f32 = 0.1;
const PITCH_ALPHA_MAX: f32 = 0.3;

const ROLL_ALPHA: f32 = 0.2;

const YAW_DELTA_SPAN: f32 = 10.0;
const YAW_ALPHA_MIN: f32 = 0.05;
const YAW_ALPHA_MAX: f32 = 0.3;

/// Heading gets noisier as the device tilts, the yaw dead zone grows up to this at 90 degrees
const YAW_DEAD_ZONE_TILTED: f32 = 2.0;
const MAX_INCLINATION: f32 = 90.0;

#[derive(Debug, Clone, Copy)]
struct Smoothed {
    pitch: f32,
    roll: f32,
    yaw: f32,
    // heading kept as a unit vector so blending never crosses the 0/360 seam
    yaw_cos: f32,
    yaw_sin: f32,
}

impl Smoothed {
    fn snap(pitch: f32, roll: f32, yaw: f32) -> Self {
        let rad = yaw.to_radians();
        Self {
            pitch,
            roll,
            yaw,
            yaw_cos: rad.cos(),
            yaw_sin: rad.sin(),
        }
    }
}

/// Turns raw accel + mag reads into smoothed, tilt-compensated pitch/roll/yaw.
/// Owns the magnetometer calibration and its calibration run.
pub struct OrientationEstimator<S> {
    config: OrientationConfig,
    calibration: MagnetometerCalibration,
    calibrated: bool,
    mag_run: CalibrationRun,
    envelope: MagEnvelope,
    smoothed: Option<Smoothed>,
    store: S,
}

impl<S: CalibrationStore> OrientationEstimator<S> {
    /// Loads the stored magnetometer calibration, if any
    pub fn new(config: OrientationConfig, mut store: S) -> Self {
        let config = OrientationConfig {
            pitch_dead_zone: clamp_dead_zone(config.pitch_dead_zone, OrientationConfig::default().pitch_dead_zone),
            yaw_dead_zone: clamp_dead_zone(config.yaw_dead_zone, OrientationConfig::default().yaw_dead_zone),
            ..config
        };

        let (calibration, calibrated) = match store.load() {
            Some(calibration) if calibration.is_valid() => {
                info!(
                    "Loaded magnetometer calibration: offset {:?}, scale {:?}",
                    calibration.offset, calibration.scale
                );
                (calibration, true)
            }
            Some(calibration) => {
                warn!("Ignoring stored magnetometer calibration with bad scale {:?}", calibration.scale);
                (MagnetometerCalibration::default(), false)
            }
            None => {
                info!("No magnetometer calibration stored, heading is uncorrected");
                (MagnetometerCalibration::default(), false)
            }
        };

        Self {
            mag_run: CalibrationRun::new(CalibrationKind::Magnetometer, config.calibration_window),
            config,
            calibration,
            calibrated,
            envelope: MagEnvelope::new(),
            smoothed: None,
            store,
        }
    }

    /// One orientation sample from a read outcome taken at `now`.
    /// A failed read gives a zeroed invalid sample and leaves the filters untouched.
    pub fn sample(&mut self, reading: Result<ImuReading, Error>, now: Instant) -> OrientationSample {
        let reading = match reading {
            Ok(reading) if reading.is_finite() => reading,
            Ok(_) => {
                debug!("Non-finite IMU reading dropped");
                self.poll_mag_calibration(now);
                return OrientationSample::invalid(now);
            }
            Err(_) => {
                self.poll_mag_calibration(now);
                return OrientationSample::invalid(now);
            }
        };

        if self.mag_run.is_in_progress() && self.mag_run.progress_at(now) < 1.0 {
            self.envelope.include(&reading.mag);
        }
        self.poll_mag_calibration(now);

        let (pitch, roll) = tilt_from_accel(&reading.accel);
        let mag = self.calibration.apply(&reading.mag);
        let yaw = tilt_compensated_heading(&mag, pitch, roll);

        let smoothed = self.filter(pitch, roll, yaw);

        OrientationSample {
            pitch: smoothed.pitch,
            roll: smoothed.roll,
            yaw: smoothed.yaw,
            valid: true,
            timestamp: now,
        }
    }

    fn filter(&mut self, pitch: f32, roll: f32, yaw: f32) -> Smoothed {
        let Some(prev) = self.smoothed else {
            let snapped = Smoothed::snap(pitch, roll, yaw);
            self.smoothed = Some(snapped);
            return snapped;
        };

        // dead zone widens with the raw tilt, heading is noisier when tilted
        let inclination = (pitch * pitch + roll * roll).sqrt();
        let yaw_dead_zone = map_clamped(
            inclination,
            0.0,
            MAX_INCLINATION,
            self.config.yaw_dead_zone,
            YAW_DEAD_ZONE_TILTED,
        );

        let alpha = map_clamped(
            (pitch - prev.pitch).abs(),
            0.0,
            PITCH_DELTA_SPAN,
            PITCH_ALPHA_MIN,
            PITCH_ALPHA_MAX,
        );
        let candidate = alpha * pitch + (1.0 - alpha) * prev.pitch;
        let pitch = if (candidate - prev.pitch).abs() >= self.config.pitch_dead_zone {
            candidate
        } else {
            prev.pitch
        };

        let roll = ROLL_ALPHA * roll + (1.0 - ROLL_ALPHA) * prev.roll;

        let alpha = map_clamped(
            angle_difference(yaw, prev.yaw).abs(),
            0.0,
            YAW_DELTA_SPAN,
            YAW_ALPHA_MIN,
            YAW_ALPHA_MAX,
        );
        let rad = yaw.to_radians();
        let yaw_cos = alpha * rad.cos() + (1.0 - alpha) * prev.yaw_cos;
        let yaw_sin = alpha * rad.sin() + (1.0 - alpha) * prev.yaw_sin;
        let candidate = normalize_degrees(yaw_sin.atan2(yaw_cos).to_degrees());

        // the unit vector only moves together with the committed heading
        let (yaw, yaw_cos, yaw_sin) = if angle_difference(candidate, prev.yaw).abs() >= yaw_dead_zone {
            (candidate, yaw_cos, yaw_sin)
        } else {
            (prev.yaw, prev.yaw_cos, prev.yaw_sin)
        };

        let next = Smoothed {
            pitch,
            roll,
            yaw,
            yaw_cos,
            yaw_sin,
        };
        self.smoothed = Some(next);
        next
    }

    /// Next sample snaps straight to the raw angles
    pub fn reset_filters(&mut self) {
        self.smoothed = None;
        debug!("Orientation filters reset");
    }

    /// Both clamped to [0, 5] degrees
    pub fn set_dead_zones(&mut self, pitch: f32, yaw: f32) {
        self.config.pitch_dead_zone = clamp_dead_zone(pitch, self.config.pitch_dead_zone);
        self.config.yaw_dead_zone = clamp_dead_zone(yaw, self.config.yaw_dead_zone);
        info!(
            "Dead zones: pitch {}, yaw {}",
            self.config.pitch_dead_zone, self.config.yaw_dead_zone
        );
    }

    /// (pitch, yaw) dead zones in degrees
    pub fn dead_zones(&self) -> (f32, f32) {
        (self.config.pitch_dead_zone, self.config.yaw_dead_zone)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn calibration(&self) -> MagnetometerCalibration {
        self.calibration
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts collecting the magnetometer envelope. Restarts a run already in progress.
    pub fn start_mag_calibration(&mut self, now: Instant) {
        self.envelope.reset();
        self.mag_run.start(now);
    }

    /// Turns the collected envelope into the active calibration and persists it.
    /// Nothing happens without a run in progress. A flat envelope is discarded
    /// and the previous calibration kept.
    pub fn finish_mag_calibration(&mut self) -> Option<MagnetometerCalibration> {
        if !self.mag_run.is_in_progress() {
            return None;
        }

        let Some(calibration) = MagnetometerCalibration::from_envelope(&self.envelope) else {
            warn!(
                "Magnetometer calibration discarded, envelope too flat after {} samples",
                self.envelope.samples()
            );
            self.mag_run.cancel();
            self.envelope.reset();
            return None;
        };

        self.mag_run.finish();
        self.calibration = calibration;
        self.calibrated = true;
        self.store.save(&calibration);
        info!(
            "Magnetometer calibrated from {} samples: offset {:?}, scale {:?}",
            self.envelope.samples(),
            calibration.offset,
            calibration.scale
        );

        Some(calibration)
    }

    pub fn cancel_mag_calibration(&mut self) {
        if self.mag_run.cancel() {
            self.envelope.reset();
        }
    }

    pub fn is_mag_calibration_in_progress(&self) -> bool {
        self.mag_run.is_in_progress()
    }

    /// Progress in [0, 1], finishes the run once the window is over
    pub fn mag_calibration_progress(&mut self, now: Instant) -> f32 {
        self.poll_mag_calibration(now);
        self.mag_run.progress()
    }

    fn poll_mag_calibration(&mut self, now: Instant) {
        if self.mag_run.advance(now) {
            self.finish_mag_calibration();
        }
    }
}
