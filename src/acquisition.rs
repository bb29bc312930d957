use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};
use embassy_time::{with_timeout, Instant, Ticker};
use log::{debug, info, warn};

use crate::{
    config::AcquisitionConfig,
    error::Error,
    hub::SensorHub,
    imu::{CalibrationStore, InertialSensor, OrientationSample},
    radar::{RangingSample, RangingSensor},
    record::SensorRecord,
    stats::TaskState,
};

/// Periodic producer of [`SensorRecord`]s.
///
/// Each cycle locks the shared bus twice, once per sensor, so no single lock
/// is held for a whole cycle. A lock not granted within the bus timeout
/// invalidates that half of the record and the cycle carries on.
pub struct AcquisitionTask<'a, M, BUS, IMU, RADAR, S, const N: usize>
where
    M: RawMutex,
{
    bus: &'a Mutex<M, BUS>,
    imu: IMU,
    radar: RADAR,
    hub: &'a SensorHub<M, S, N>,
    config: AcquisitionConfig,
    imu_fault: Option<Error>,
    radar_fault: Option<Error>,
}

impl<'a, M, BUS, IMU, RADAR, S, const N: usize> AcquisitionTask<'a, M, BUS, IMU, RADAR, S, N>
where
    M: RawMutex,
    IMU: InertialSensor<BUS>,
    RADAR: RangingSensor<BUS>,
    S: CalibrationStore,
{
    pub fn new(
        bus: &'a Mutex<M, BUS>,
        imu: IMU,
        radar: RADAR,
        hub: &'a SensorHub<M, S, N>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            bus,
            imu,
            radar,
            hub,
            config,
            imu_fault: None,
            radar_fault: None,
        }
    }

    /// Runs cycles at the configured period until dropped.
    /// The schedule stays anchored to the first tick, after an overrun the missed ticks fire back to back.
    pub async fn run(mut self) {
        info!("Acquisition running every {} ms", self.config.period.as_millis());
        if !self.hub.is_suspended() {
            self.hub.set_state(TaskState::Running);
        }

        let mut ticker = Ticker::every(self.config.period);
        loop {
            if self.hub.is_suspended() {
                self.hub.wait_resumed().await;
                ticker.reset();
            }

            self.cycle().await;
            ticker.next().await;
        }
    }

    /// One acquisition cycle, always yields a record
    pub async fn cycle(&mut self) -> SensorRecord {
        let ranging = self.read_ranging().await;
        let orientation = self.read_orientation().await;

        let now = Instant::now();
        let record = SensorRecord::fuse(now, orientation, ranging, self.config.max_sync_delta);
        if !record.sync_valid {
            debug!("Sync delta {} us over limit", record.sync_delta.as_micros());
        }

        if self.hub.finish_cycle(record, self.is_faulted(), now) {
            warn!("Sample queue full, oldest record dropped");
        }

        record
    }

    async fn read_ranging(&mut self) -> RangingSample {
        let Ok(mut bus) = with_timeout(self.config.bus_timeout, self.bus.lock()).await else {
            note_fault(&mut self.radar_fault, "Ranging sensor", Some(Error::BusTimeout));
            return self.hub.skip_ranging(Instant::now());
        };

        let peak = self.radar.read_peak(&mut *bus).await;
        let now = Instant::now();
        drop(bus);

        let peak = peak.map_err(|err| {
            debug!("Ranging read error: {err:?}");
            Error::SensorUnavailable
        });
        let fault = match peak {
            Ok(Some(_)) => None,
            Ok(None) => Some(Error::NoTarget),
            Err(err) => Some(err),
        };
        note_fault(&mut self.radar_fault, "Ranging sensor", fault);

        self.hub.sample_ranging(peak, now)
    }

    async fn read_orientation(&mut self) -> OrientationSample {
        let Ok(mut bus) = with_timeout(self.config.bus_timeout, self.bus.lock()).await else {
            note_fault(&mut self.imu_fault, "IMU", Some(Error::BusTimeout));
            return self.hub.sample_orientation(Err(Error::BusTimeout), Instant::now());
        };

        let reading = self.imu.read(&mut *bus).await;
        let now = Instant::now();
        drop(bus);

        let reading = reading.map_err(|err| {
            debug!("IMU read error: {err:?}");
            Error::SensorUnavailable
        });
        note_fault(&mut self.imu_fault, "IMU", reading.err());

        self.hub.sample_orientation(reading, now)
    }

    /// Neither sensor could be read in the last cycle
    fn is_faulted(&self) -> bool {
        let failed = |fault: Option<Error>| matches!(fault, Some(err) if err != Error::NoTarget);
        failed(self.imu_fault) && failed(self.radar_fault)
    }
}

/// Logs a fault when it appears or changes and once more when it clears
fn note_fault(slot: &mut Option<Error>, source: &str, fault: Option<Error>) {
    if *slot == fault {
        return;
    }

    match (fault, *slot) {
        (Some(Error::NoTarget), _) => debug!("{source}: {}", Error::NoTarget),
        (Some(err), _) => warn!("{source}: {err}"),
        (None, Some(prev)) => info!("{source} recovered from {prev}"),
        (None, None) => {}
    }
    *slot = fault;
}
