use core::fmt;

/// All possible errors in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Sensor bus was not released within the bounded wait
    BusTimeout,
    /// Sensor did not answer or returned garbage
    SensorUnavailable,
    /// Ranging sensor reported no peak
    NoTarget,
    /// Kalman noise parameters must be finite, non-negative, with positive measurement noise
    InvalidKalmanParameters,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BusTimeout => f.write_str("sensor bus timeout"),
            Error::SensorUnavailable => f.write_str("sensor unavailable"),
            Error::NoTarget => f.write_str("no target in view"),
            Error::InvalidKalmanParameters => f.write_str("invalid kalman parameters"),
        }
    }
}
