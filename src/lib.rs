#![cfg_attr(not(test), no_std)]

pub(crate) mod fmt;

pub mod units;
pub mod profile;
pub mod parameters;
pub mod drivers;
pub mod waveform;
pub mod packet;
pub mod queue;
pub mod acquisition;
pub mod controller;

pub use acquisition::AcquisitionEngine;
pub use controller::{MeasurementController, MeasurementState};
pub use parameters::{MeasurementConfig, OperatingMode, Parameter};
pub use profile::HardwareProfile;
