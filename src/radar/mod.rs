use core::fmt::Debug;

use embassy_time::Instant;

use crate::config::SAMPLE_MAX_AGE;

mod filter;
pub mod kalman;

pub use filter::{RangingFilter, RangingStatistics};
pub use kalman::ScalarKalman;

/// Strongest echo reported by the ranging sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingPeak {
    pub distance_mm: f32,
    pub strength: f32,
    pub num_peaks: u8,
}

/// Distance sensor sitting on a shared bus.
/// `Ok(None)` means the sensor answered but saw no target.
#[allow(async_fn_in_trait)]
pub trait RangingSensor<BUS> {
    type Error: Debug;

    async fn read_peak(&mut self, bus: &mut BUS) -> Result<Option<RangingPeak>, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingSample {
    pub raw_distance_mm: f32,
    /// Kalman, then reacquisition snap or EMA
    pub filtered_distance_mm: f32,
    pub strength: f32,
    pub num_peaks: u8,
    /// Target seen and inside the configured window
    pub valid: bool,
    pub timestamp: Instant,
}

impl RangingSample {
    /// Zeroed, invalid
    pub const fn invalid(timestamp: Instant) -> Self {
        Self::no_target(0.0, timestamp)
    }

    /// Invalid, carrying the last filtered distance
    pub const fn no_target(filtered_distance_mm: f32, timestamp: Instant) -> Self {
        Self {
            raw_distance_mm: 0.0,
            filtered_distance_mm,
            strength: 0.0,
            num_peaks: 0,
            valid: false,
            timestamp,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.valid && now.saturating_duration_since(self.timestamp) <= SAMPLE_MAX_AGE
    }
}
