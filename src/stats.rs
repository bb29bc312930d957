//! Health counters of the acquisition task.

use embassy_time::Duration;

/// Weight of the history in the running sync delta average
const SYNC_AVG_DECAY: f32 = 0.95;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Task not started yet
    #[default]
    Init,
    Running,
    /// Background calibration in progress
    Calibrating,
    Suspended,
    /// Neither sensor answered in the last cycle
    Error,
}

/// Copy-out snapshot of the acquisition counters.
/// All counters only grow until [`TaskStatistics::reset`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TaskStatistics {
    /// Completed cycles, valid or not
    pub samples_acquired: u32,
    pub sync_success: u32,
    pub sync_failures: u32,
    /// Records evicted from a full queue
    pub queue_overflows: u32,
    /// Exponential average of the skew of synchronized cycles
    pub avg_sync_delta_ms: f32,
    /// Largest skew seen, synchronized or not
    pub max_sync_delta_ms: f32,
    pub state: TaskState,
}

impl TaskStatistics {
    pub fn record_cycle(&mut self, sync_delta: Duration, sync_valid: bool) {
        let delta_ms = sync_delta.as_micros() as f32 / 1_000.0;

        self.samples_acquired = self.samples_acquired.saturating_add(1);
        if sync_valid {
            self.sync_success = self.sync_success.saturating_add(1);
            self.avg_sync_delta_ms =
                self.avg_sync_delta_ms * SYNC_AVG_DECAY + delta_ms * (1.0 - SYNC_AVG_DECAY);
        } else {
            self.sync_failures = self.sync_failures.saturating_add(1);
        }
        self.max_sync_delta_ms = self.max_sync_delta_ms.max(delta_ms);
    }

    pub fn record_overflow(&mut self) {
        self.queue_overflows = self.queue_overflows.saturating_add(1);
    }

    /// Share of synchronized cycles, in percent
    pub fn sync_rate(&self) -> f32 {
        if self.samples_acquired == 0 {
            return 0.0;
        }
        self.sync_success as f32 * 100.0 / self.samples_acquired as f32
    }

    /// Zeroes the counters, the task state is kept
    pub fn reset(&mut self) {
        *self = Self {
            state: self.state,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counting() {
        let mut stats = TaskStatistics::default();
        stats.record_cycle(Duration::from_millis(4), true);
        stats.record_cycle(Duration::from_millis(30), false);
        stats.record_cycle(Duration::from_millis(2), true);

        assert_eq!(stats.samples_acquired, 3);
        assert_eq!(stats.sync_success, 2);
        assert_eq!(stats.sync_failures, 1);
        assert_eq!(stats.max_sync_delta_ms, 30.0);
        // 0 -> 0.2 -> 0.29, the failed cycle does not enter the average
        assert!((stats.avg_sync_delta_ms - 0.29).abs() < 1e-4, "{}", stats.avg_sync_delta_ms);
        assert!((stats.sync_rate() - 200.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_samples_increment_once_per_cycle() {
        let mut stats = TaskStatistics::default();
        for i in 0..50u32 {
            stats.record_cycle(Duration::from_millis(i as u64 % 15), i % 3 != 0);
            assert_eq!(stats.samples_acquired, i + 1);
            assert_eq!(stats.sync_success + stats.sync_failures, i + 1);
        }
    }

    #[test]
    fn test_reset_keeps_state() {
        let mut stats = TaskStatistics {
            state: TaskState::Calibrating,
            ..Default::default()
        };
        stats.record_cycle(Duration::from_millis(3), true);
        stats.record_overflow();
        stats.reset();

        assert_eq!(
            stats,
            TaskStatistics {
                state: TaskState::Calibrating,
                ..Default::default()
            }
        );
    }
}
