use embassy_time::Instant;
use log::{debug, info};
use micromath::F32Ext as _;

use super::{RangingPeak, RangingSample, ScalarKalman};
use crate::{
    config::{clamp_range, clamp_smoothing, KalmanParams, RangingConfig},
    error::Error,
};

/// Read counters since boot or the last [`RangingFilter::reset_statistics`]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RangingStatistics {
    /// Every sampled read, good or bad
    pub total: u32,
    /// Reads with a target inside the window
    pub valid: u32,
    /// Reads that failed or saw no target
    pub errors: u32,
    pub min_distance_mm: Option<f32>,
    pub max_distance_mm: Option<f32>,
}

impl RangingStatistics {
    /// Valid reads over all reads, in percent
    pub fn success_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.valid as f32 * 100.0 / self.total as f32
    }

    fn record_distance(&mut self, distance_mm: f32) {
        self.min_distance_mm = Some(self.min_distance_mm.map_or(distance_mm, |min| min.min(distance_mm)));
        self.max_distance_mm = Some(self.max_distance_mm.map_or(distance_mm, |max| max.max(distance_mm)));
    }
}

/// Kalman -> reacquisition -> EMA chain over raw peak distances
pub struct RangingFilter {
    config: RangingConfig,
    kalman: ScalarKalman,
    filtered: Option<f32>,
    stats: RangingStatistics,
}

impl Default for RangingFilter {
    fn default() -> Self {
        Self::new(RangingConfig::default())
    }
}

impl RangingFilter {
    pub fn new(config: RangingConfig) -> Self {
        let (range_start_mm, range_end_mm) = clamp_range(config.range_start_mm, config.range_end_mm);
        let config = RangingConfig {
            range_start_mm,
            range_end_mm,
            smoothing: clamp_smoothing(config.smoothing, RangingConfig::default().smoothing),
            ..config
        };

        Self {
            kalman: ScalarKalman::new(config.kalman),
            config,
            filtered: None,
            stats: RangingStatistics::default(),
        }
    }

    /// One ranging sample from a read outcome taken at `now`
    pub fn sample(&mut self, peak: Result<Option<RangingPeak>, Error>, now: Instant) -> RangingSample {
        self.stats.total = self.stats.total.saturating_add(1);

        let peak = match peak {
            Ok(Some(peak)) if peak.distance_mm > 0.0 && peak.distance_mm.is_finite() => peak,
            Ok(_) => {
                self.stats.errors = self.stats.errors.saturating_add(1);
                return RangingSample::no_target(self.filtered_distance(), now);
            }
            Err(_) => {
                self.stats.errors = self.stats.errors.saturating_add(1);
                return RangingSample::invalid(now);
            }
        };

        let raw = peak.distance_mm;
        let estimate = self.kalman.update(raw);
        let filtered = match self.filtered {
            None => estimate,
            Some(prev) if (estimate - prev).abs() > self.config.reacquire_threshold_mm => {
                debug!("Target jump {prev} -> {estimate} mm, reacquired");
                estimate
            }
            Some(prev) => self.config.smoothing * estimate + (1.0 - self.config.smoothing) * prev,
        };
        self.filtered = Some(filtered);

        let valid = (self.config.range_start_mm..=self.config.range_end_mm).contains(&raw);
        if valid {
            self.stats.valid = self.stats.valid.saturating_add(1);
        }
        self.stats.record_distance(raw);

        RangingSample {
            raw_distance_mm: raw,
            filtered_distance_mm: filtered,
            strength: peak.strength,
            num_peaks: peak.num_peaks,
            valid,
            timestamp: now,
        }
    }

    /// Invalid sample for a cycle where the sensor could not be read at all.
    /// Counters and filter state are left alone.
    pub fn skipped(&self, now: Instant) -> RangingSample {
        RangingSample::no_target(self.filtered_distance(), now)
    }

    /// Last filtered distance, zero before the first target
    pub fn filtered_distance(&self) -> f32 {
        self.filtered.unwrap_or(0.0)
    }

    /// Start clamped to [100, 5000] mm, end to [start + 100, 10000] mm
    pub fn set_range(&mut self, start_mm: f32, end_mm: f32) {
        let (start, end) = clamp_range(start_mm, end_mm);
        self.config.range_start_mm = start;
        self.config.range_end_mm = end;
        info!("Ranging window {start}..{end} mm");
    }

    pub fn range(&self) -> (f32, f32) {
        (self.config.range_start_mm, self.config.range_end_mm)
    }

    /// Rejects non-finite or negative noise and non-positive measurement noise, keeping the old parameters.
    /// Accepted parameters keep the current estimate and restart its error from `initial_error`.
    pub fn set_kalman_parameters(
        &mut self,
        process_noise: f32,
        measurement_noise: f32,
        initial_error: f32,
    ) -> Result<(), Error> {
        let params = KalmanParams::new(process_noise, measurement_noise, initial_error)?;
        self.config.kalman = params;
        self.kalman.set_params(params);
        info!("Kalman parameters: q {process_noise}, r {measurement_noise}, p0 {initial_error}");
        Ok(())
    }

    pub fn kalman_parameters(&self) -> KalmanParams {
        self.config.kalman
    }

    /// Clamped to [0, 1]
    pub fn set_smoothing_factor(&mut self, factor: f32) {
        self.config.smoothing = clamp_smoothing(factor, self.config.smoothing);
        info!("Ranging smoothing factor {}", self.config.smoothing);
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.config.smoothing
    }

    /// Forgets the estimate, the next target snaps. Configured parameters are kept.
    pub fn reset_filter(&mut self) {
        self.kalman.reset();
        self.filtered = None;
        debug!("Ranging filter reset");
    }

    pub fn statistics(&self) -> RangingStatistics {
        self.stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = RangingStatistics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(distance_mm: f32) -> Result<Option<RangingPeak>, Error> {
        Ok(Some(RangingPeak {
            distance_mm,
            strength: 1500.0,
            num_peaks: 1,
        }))
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_first_sample_equals_raw() {
        let mut filter = RangingFilter::default();
        let sample = filter.sample(peak(812.0), at(0));
        assert!(sample.valid);
        assert_eq!(sample.raw_distance_mm, 812.0);
        assert_eq!(sample.filtered_distance_mm, 812.0);
        assert_eq!(sample.strength, 1500.0);
        assert_eq!(sample.num_peaks, 1);
    }

    #[test]
    fn test_small_changes_are_smoothed() {
        let mut filter = RangingFilter::default();
        filter.sample(peak(1000.0), at(0));
        let sample = filter.sample(peak(1100.0), at(100));
        assert!(sample.filtered_distance_mm > 1000.0);
        assert!(sample.filtered_distance_mm < 1100.0);
    }

    #[test]
    fn test_jump_reacquires_kalman_output() {
        let mut filter = RangingFilter::default();
        let mut shadow = ScalarKalman::new(KalmanParams::default());

        for i in 0..10 {
            filter.sample(peak(600.0), at(i * 100));
            shadow.update(600.0);
        }
        let before = filter.filtered_distance();

        let sample = filter.sample(peak(1400.0), at(1_000));
        let expected = shadow.update(1400.0);
        assert!((expected - before).abs() > 400.0);
        assert_eq!(sample.filtered_distance_mm, expected);
    }

    #[test]
    fn test_missing_target_keeps_last_value() {
        let mut filter = RangingFilter::default();
        filter.sample(peak(700.0), at(0));

        for reading in [Ok(None), peak(0.0), peak(-5.0)] {
            let sample = filter.sample(reading, at(100));
            assert!(!sample.valid);
            assert_eq!(sample.raw_distance_mm, 0.0);
            assert_eq!(sample.filtered_distance_mm, 700.0);
        }

        let stats = filter.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.errors, 3);
    }

    #[test]
    fn test_sensor_error_is_zeroed() {
        let mut filter = RangingFilter::default();
        filter.sample(peak(700.0), at(0));
        let sample = filter.sample(Err(Error::SensorUnavailable), at(100));
        assert_eq!(sample, RangingSample::invalid(at(100)));
        assert_eq!(filter.statistics().errors, 1);
        assert_eq!(filter.filtered_distance(), 700.0);
    }

    #[test]
    fn test_window_gates_validity() {
        let mut filter = RangingFilter::default();
        assert!(!filter.sample(peak(200.0), at(0)).valid);
        assert!(filter.sample(peak(250.0), at(100)).valid);
        assert!(filter.sample(peak(1500.0), at(200)).valid);
        assert!(!filter.sample(peak(1501.0), at(300)).valid);

        filter.set_range(1000.0, 3000.0);
        assert_eq!(filter.range(), (1000.0, 3000.0));
        assert!(filter.sample(peak(2500.0), at(400)).valid);

        let stats = filter.statistics();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.min_distance_mm, Some(200.0));
        assert_eq!(stats.max_distance_mm, Some(2500.0));
        assert!((stats.success_rate() - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_statistics_are_monotonic() {
        let mut filter = RangingFilter::default();
        let mut last = filter.statistics();
        let reads = [peak(500.0), Ok(None), Err(Error::SensorUnavailable), peak(9000.0), peak(510.0)];
        for (i, reading) in reads.into_iter().enumerate() {
            filter.sample(reading, at(i as u64 * 100));
            let stats = filter.statistics();
            assert_eq!(stats.total, last.total + 1);
            assert!(stats.valid >= last.valid);
            assert!(stats.errors >= last.errors);
            last = stats;
        }
    }

    #[test]
    fn test_skipped_touches_nothing() {
        let mut filter = RangingFilter::default();
        filter.sample(peak(640.0), at(0));
        let sample = filter.skipped(at(100));
        assert!(!sample.valid);
        assert_eq!(sample.filtered_distance_mm, 640.0);
        assert_eq!(filter.statistics().total, 1);
    }

    #[test]
    fn test_kalman_parameters_validation() {
        let mut filter = RangingFilter::default();
        assert_eq!(
            filter.set_kalman_parameters(1.0, 0.0, 1.0),
            Err(Error::InvalidKalmanParameters)
        );
        assert_eq!(filter.kalman_parameters(), KalmanParams::default());

        filter.set_kalman_parameters(5.0, 2.0, 1.0).unwrap();
        assert_eq!(filter.kalman_parameters(), KalmanParams::new(5.0, 2.0, 1.0).unwrap());
    }

    #[test]
    fn test_reset_snaps_and_keeps_parameters() {
        let mut filter = RangingFilter::default();
        filter.set_kalman_parameters(5.0, 2.0, 1.0).unwrap();
        filter.set_smoothing_factor(0.5);
        filter.sample(peak(900.0), at(0));
        filter.sample(peak(950.0), at(100));

        filter.reset_filter();
        assert_eq!(filter.sample(peak(1200.0), at(200)).filtered_distance_mm, 1200.0);
        assert_eq!(filter.kalman_parameters(), KalmanParams::new(5.0, 2.0, 1.0).unwrap());
        assert_eq!(filter.smoothing_factor(), 0.5);
    }

    #[test]
    fn test_smoothing_factor_is_clamped() {
        let mut filter = RangingFilter::default();
        filter.set_smoothing_factor(3.0);
        assert_eq!(filter.smoothing_factor(), 1.0);
        filter.set_smoothing_factor(-1.0);
        assert_eq!(filter.smoothing_factor(), 0.0);
    }
}
