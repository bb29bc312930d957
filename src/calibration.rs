//! Time-bounded calibration runs.
//!
//! A run only tracks its state and progress. What is collected while it is in
//! progress (e.g. the magnetometer envelope) belongs to the owner of the run.

use embassy_time::{Duration, Instant};
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationKind {
    Magnetometer,
    Generic,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    #[default]
    Idle,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationRun {
    kind: CalibrationKind,
    state: CalibrationState,
    started_at: Instant,
    progress: f32,
    window: Duration,
}

impl CalibrationRun {
    pub const fn new(kind: CalibrationKind, window: Duration) -> Self {
        Self {
            kind,
            state: CalibrationState::Idle,
            started_at: Instant::MIN,
            progress: 0.0,
            window,
        }
    }

    pub fn kind(&self) -> CalibrationKind {
        self.kind
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == CalibrationState::InProgress
    }

    pub fn is_complete(&self) -> bool {
        self.state == CalibrationState::Complete
    }

    /// Starts the run. A run already in progress is restarted from zero.
    pub fn start(&mut self, now: Instant) {
        if self.is_in_progress() {
            info!(
                "{:?} calibration restarted, {:.0}% discarded",
                self.kind,
                self.progress * 100.0
            );
        } else {
            info!("{:?} calibration started", self.kind);
        }

        self.state = CalibrationState::InProgress;
        self.started_at = now;
        self.progress = 0.0;
    }

    /// Progress the run would have at `now`, in [0, 1]
    pub fn progress_at(&self, now: Instant) -> f32 {
        match self.state {
            CalibrationState::Idle => 0.0,
            CalibrationState::Complete => 1.0,
            CalibrationState::InProgress => {
                let window = self.window.as_micros();
                if window == 0 {
                    return 1.0;
                }
                let elapsed = now.saturating_duration_since(self.started_at).as_micros();
                (elapsed as f32 / window as f32).clamp(0.0, 1.0)
            }
        }
    }

    /// Last progress seen by [`Self::advance`]
    pub fn progress(&self) -> f32 {
        match self.state {
            CalibrationState::Idle => 0.0,
            CalibrationState::Complete => 1.0,
            CalibrationState::InProgress => self.progress,
        }
    }

    /// Updates progress, returns true once the window is over and the run is due to finish
    pub fn advance(&mut self, now: Instant) -> bool {
        if !self.is_in_progress() {
            return false;
        }

        self.progress = self.progress.max(self.progress_at(now));
        self.progress >= 1.0
    }

    /// InProgress -> Complete. No-op otherwise, returns whether it transitioned.
    pub fn finish(&mut self) -> bool {
        if !self.is_in_progress() {
            return false;
        }

        self.state = CalibrationState::Complete;
        self.progress = 1.0;
        info!("{:?} calibration complete", self.kind);
        true
    }

    /// Drops an in-progress run back to Idle
    pub fn cancel(&mut self) -> bool {
        if !self.is_in_progress() {
            return false;
        }

        self.state = CalibrationState::Idle;
        self.progress = 0.0;
        info!("{:?} calibration cancelled", self.kind);
        true
    }
}
