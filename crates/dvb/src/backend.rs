//! Device access traits.
//!
//! The capture pipeline never touches `/dev/dvb` directly; it drives
//! these traits. [`LinuxBackend`](crate::LinuxBackend) implements them
//! over the real device nodes, and tests substitute scripted fakes.

use crate::{Property, Result, properties::FE_HAS_LOCK};

/// Frontend status word as read from the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TunerStatus(pub u32);

impl TunerStatus {
    /// Whether the tuner has synchronized to the configured signal.
    pub const fn has_lock(&self) -> bool {
        self.0 & FE_HAS_LOCK != 0
    }
}

/// Factory for the three device handles of a capture session.
///
/// Handles are exclusively owned by their caller and released on drop;
/// they are never shared or recycled across sessions.
pub trait DeviceBackend: Send + Sync {
    /// Open the tuner control node for the given adapter/frontend index.
    fn open_frontend(&self, adapter: u32, frontend: u32) -> Result<Box<dyn Frontend>>;

    /// Open one stream-filter node on the given adapter/demux index.
    /// The filter does nothing until [`DemuxFilter::start`] is called.
    fn open_filter(&self, adapter: u32, demux: u32) -> Result<Box<dyn DemuxFilter>>;

    /// Open the raw stream-source node (read-only).
    fn open_source(&self, adapter: u32, dvr: u32) -> Result<Box<dyn StreamSource>>;
}

/// Tuner control handle.
pub trait Frontend: Send {
    /// Probe the driver's tuning API version.
    fn api_version(&mut self) -> Result<u32>;

    /// Apply a property sequence atomically as one batched call.
    fn set_properties(&mut self, properties: &[Property]) -> Result<()>;

    /// Read the current frontend status word.
    fn read_status(&mut self) -> Result<TunerStatus>;
}

/// One programmed stream filter. The handle keeps the filter alive;
/// dropping it releases the underlying device node.
pub trait DemuxFilter: Send {
    /// Program the filter to select `pid` with immediate-start semantics.
    fn start(&mut self, pid: u16) -> Result<()>;
}

/// Raw transport-stream source.
pub trait StreamSource: Send {
    /// One blocking read into `buf`. Returns the number of bytes read;
    /// zero means end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}
