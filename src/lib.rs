#![cfg_attr(not(test), no_std)]
#![deny(unused_must_use)]

//! Acquisition core of a handheld rangefinder: an IMU and a ranging sensor
//! sharing one bus, fused into timestamped orientation + distance records.

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod error;
pub mod hub;
pub mod imu;
pub mod queue;
pub mod radar;
pub mod record;
pub mod stats;

pub use acquisition::AcquisitionTask;
pub use error::Error;
pub use hub::SensorHub;
pub use record::{Coordinates, SensorRecord};
