//! State shared between the acquisition task and the foreground (UI) contexts.
//!
//! Everything in here is either behind a blocking mutex and handed out as a
//! copy, or goes through the record queue. Mutation from the foreground is
//! limited to the tuning and calibration calls.

use core::cell::{Cell, RefCell};

use embassy_sync::{
    blocking_mutex::{raw::RawMutex, Mutex},
    signal::Signal,
};
use embassy_time::{Duration, Instant};
use log::info;

use crate::{
    calibration::{CalibrationKind, CalibrationRun},
    config::CALIBRATION_WINDOW,
    error::Error,
    imu::{CalibrationStore, ImuReading, MagnetometerCalibration, OrientationEstimator, OrientationSample},
    queue::SampleQueue,
    radar::{RangingFilter, RangingPeak, RangingSample, RangingStatistics},
    record::SensorRecord,
    stats::{TaskState, TaskStatistics},
};

pub struct SensorHub<M: RawMutex, S, const N: usize> {
    estimator: Mutex<M, RefCell<OrientationEstimator<S>>>,
    ranging: Mutex<M, RefCell<RangingFilter>>,
    background: Mutex<M, Cell<CalibrationRun>>,
    stats: Mutex<M, Cell<TaskStatistics>>,
    latest_orientation: Mutex<M, Cell<OrientationSample>>,
    latest_ranging: Mutex<M, Cell<RangingSample>>,
    queue: SampleQueue<M, N>,
    suspended: Mutex<M, Cell<bool>>,
    resumed: Signal<M, ()>,
}

impl<M: RawMutex, S: CalibrationStore, const N: usize> SensorHub<M, S, N> {
    pub fn new(estimator: OrientationEstimator<S>, ranging: RangingFilter) -> Self {
        Self {
            estimator: Mutex::new(RefCell::new(estimator)),
            ranging: Mutex::new(RefCell::new(ranging)),
            background: Mutex::new(Cell::new(CalibrationRun::new(
                CalibrationKind::Generic,
                CALIBRATION_WINDOW,
            ))),
            stats: Mutex::new(Cell::new(TaskStatistics::default())),
            latest_orientation: Mutex::new(Cell::new(OrientationSample::invalid(Instant::MIN))),
            latest_ranging: Mutex::new(Cell::new(RangingSample::invalid(Instant::MIN))),
            queue: SampleQueue::new(),
            suspended: Mutex::new(Cell::new(false)),
            resumed: Signal::new(),
        }
    }

    /// Window of the background calibration, 20s by default
    pub fn with_calibration_window(self, window: Duration) -> Self {
        self.background
            .lock(|run| run.set(CalibrationRun::new(CalibrationKind::Generic, window)));
        self
    }

    /* Samples */

    /// Last orientation produced by the acquisition task, check [`OrientationSample::is_fresh`]
    pub fn orientation_sample(&self) -> OrientationSample {
        self.latest_orientation.lock(Cell::get)
    }

    /// Last ranging sample produced by the acquisition task, check [`RangingSample::is_fresh`]
    pub fn ranging_sample(&self) -> RangingSample {
        self.latest_ranging.lock(Cell::get)
    }

    pub fn peek_latest(&self) -> Option<SensorRecord> {
        self.queue.peek_latest()
    }

    pub fn try_receive(&self) -> Option<SensorRecord> {
        self.queue.try_receive()
    }

    pub async fn receive(&self, timeout: Duration) -> Option<SensorRecord> {
        self.queue.receive(timeout).await
    }

    pub fn queue(&self) -> &SampleQueue<M, N> {
        &self.queue
    }

    /* Magnetometer calibration */

    pub fn start_mag_calibration(&self) {
        self.with_estimator(|est| est.start_mag_calibration(Instant::now()));
    }

    pub fn finish_mag_calibration(&self) -> Option<MagnetometerCalibration> {
        self.with_estimator(|est| est.finish_mag_calibration())
    }

    pub fn cancel_mag_calibration(&self) {
        self.with_estimator(|est| est.cancel_mag_calibration());
    }

    pub fn is_mag_calibration_in_progress(&self) -> bool {
        self.with_estimator(|est| est.is_mag_calibration_in_progress())
    }

    pub fn mag_calibration_progress(&self) -> f32 {
        self.with_estimator(|est| est.mag_calibration_progress(Instant::now()))
    }

    pub fn is_mag_calibrated(&self) -> bool {
        self.with_estimator(|est| est.is_calibrated())
    }

    pub fn mag_calibration(&self) -> MagnetometerCalibration {
        self.with_estimator(|est| est.calibration())
    }

    /* Background calibration */

    /// Restarts a run already in progress
    pub fn start_background_calibration(&self) {
        self.background.lock(|cell| {
            let mut run = cell.get();
            run.start(Instant::now());
            cell.set(run);
        });
        if !self.is_suspended() {
            self.set_state(TaskState::Calibrating);
        }
    }

    pub fn cancel_background_calibration(&self) {
        self.background.lock(|cell| {
            let mut run = cell.get();
            run.cancel();
            cell.set(run);
        });
    }

    pub fn is_calibration_complete(&self) -> bool {
        self.background.lock(|cell| cell.get().is_complete())
    }

    pub fn is_calibration_in_progress(&self) -> bool {
        self.background.lock(|cell| cell.get().is_in_progress())
    }

    pub fn calibration_progress(&self) -> f32 {
        self.background.lock(|cell| cell.get().progress())
    }

    /* Tuning */

    pub fn set_dead_zones(&self, pitch: f32, yaw: f32) {
        self.with_estimator(|est| est.set_dead_zones(pitch, yaw));
    }

    pub fn dead_zones(&self) -> (f32, f32) {
        self.with_estimator(|est| est.dead_zones())
    }

    pub fn reset_orientation_filters(&self) {
        self.with_estimator(|est| est.reset_filters());
    }

    pub fn set_smoothing_factor(&self, factor: f32) {
        self.with_ranging(|filter| filter.set_smoothing_factor(factor));
    }

    pub fn set_kalman_parameters(
        &self,
        process_noise: f32,
        measurement_noise: f32,
        initial_error: f32,
    ) -> Result<(), Error> {
        self.with_ranging(|filter| {
            filter.set_kalman_parameters(process_noise, measurement_noise, initial_error)
        })
    }

    pub fn set_radar_range(&self, start_mm: f32, end_mm: f32) {
        self.with_ranging(|filter| filter.set_range(start_mm, end_mm));
    }

    pub fn reset_ranging_filter(&self) {
        self.with_ranging(|filter| filter.reset_filter());
    }

    pub fn ranging_statistics(&self) -> RangingStatistics {
        self.with_ranging(|filter| filter.statistics())
    }

    pub fn reset_ranging_statistics(&self) {
        self.with_ranging(|filter| filter.reset_statistics());
    }

    /* Task control */

    pub fn stats(&self) -> TaskStatistics {
        self.stats.lock(Cell::get)
    }

    /// Task counters only, ranging counters keep accumulating
    pub fn reset_stats(&self) {
        self.update_stats(TaskStatistics::reset);
        info!("Statistics reset");
    }

    /// Acquisition stops after the cycle in flight
    pub fn suspend(&self) {
        self.suspended.lock(|flag| flag.set(true));
        self.resumed.reset();
        self.set_state(TaskState::Suspended);
        info!("Acquisition suspended");
    }

    pub fn resume(&self) {
        self.suspended.lock(|flag| flag.set(false));
        self.resumed.signal(());
        info!("Acquisition resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.lock(Cell::get)
    }

    /* Acquisition side */

    pub(crate) async fn wait_resumed(&self) {
        while self.is_suspended() {
            self.resumed.wait().await;
        }
    }

    pub(crate) fn sample_orientation(&self, reading: Result<ImuReading, Error>, now: Instant) -> OrientationSample {
        let sample = self.with_estimator(|est| est.sample(reading, now));
        self.latest_orientation.lock(|cell| cell.set(sample));
        sample
    }

    pub(crate) fn sample_ranging(&self, peak: Result<Option<RangingPeak>, Error>, now: Instant) -> RangingSample {
        let sample = self.with_ranging(|filter| filter.sample(peak, now));
        self.latest_ranging.lock(|cell| cell.set(sample));
        sample
    }

    pub(crate) fn skip_ranging(&self, now: Instant) -> RangingSample {
        let sample = self.with_ranging(|filter| filter.skipped(now));
        self.latest_ranging.lock(|cell| cell.set(sample));
        sample
    }

    /// Books a finished cycle: statistics, queue, background calibration and task state
    pub(crate) fn finish_cycle(&self, record: SensorRecord, faulted: bool, now: Instant) -> bool {
        let evicted = self.queue.publish(record);
        let calibrating = self.background.lock(|cell| {
            let mut run = cell.get();
            if run.advance(now) {
                run.finish();
            }
            cell.set(run);
            run.is_in_progress()
        });

        let state = if self.is_suspended() {
            TaskState::Suspended
        } else if calibrating {
            TaskState::Calibrating
        } else if faulted {
            TaskState::Error
        } else {
            TaskState::Running
        };

        self.update_stats(|stats| {
            stats.record_cycle(record.sync_delta, record.sync_valid);
            if evicted {
                stats.record_overflow();
            }
            stats.state = state;
        });

        evicted
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.update_stats(|stats| stats.state = state);
    }

    fn update_stats(&self, f: impl FnOnce(&mut TaskStatistics)) {
        self.stats.lock(|cell| {
            let mut stats = cell.get();
            f(&mut stats);
            cell.set(stats);
        });
    }

    fn with_estimator<R>(&self, f: impl FnOnce(&mut OrientationEstimator<S>) -> R) -> R {
        self.estimator.lock(|est| f(&mut est.borrow_mut()))
    }

    fn with_ranging<R>(&self, f: impl FnOnce(&mut RangingFilter) -> R) -> R {
        self.ranging.lock(|filter| f(&mut filter.borrow_mut()))
    }
}
