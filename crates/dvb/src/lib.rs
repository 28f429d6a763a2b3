//! Linux DVB (API v5) device boundary.
//!
//! This crate owns the vocabulary of the platform broadcast-tuner API
//! (property codes, filter parameters, status bits) and the handle types
//! for the three device nodes a capture session touches: the frontend
//! (tuner control), one demux filter per selected PID, and the dvr node
//! the raw transport stream is read from.
//!
//! The integer codes are defined by `linux/dvb/frontend.h` and
//! `linux/dvb/dmx.h` and are passed through to the hardware unchanged.
//! Everything above the ioctl layer talks to the [`DeviceBackend`] trait,
//! so capture logic can run against simulated devices in tests.

pub mod backend;
pub mod error;
pub mod properties;

#[cfg(target_os = "linux")]
mod linux;

pub use backend::{DemuxFilter, DeviceBackend, Frontend, StreamSource, TunerStatus};
pub use error::DeviceError;
pub use properties::Property;

#[cfg(target_os = "linux")]
pub use linux::LinuxBackend;

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;
