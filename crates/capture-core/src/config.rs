//! Session configuration and tuning-property normalization.

use std::path::PathBuf;
use std::time::Duration;

use dvb::Property;
use dvb::properties::{DEFAULT_BANDWIDTH_HZ, DTV_BANDWIDTH_HZ};

/// Everything a capture session needs to know, validated by the caller
/// and immutable once constructed.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// `/dev/dvb/adapterA` index
    pub adapter: u32,
    /// `frontendB` index under the adapter
    pub frontend: u32,
    /// `demuxC` index under the adapter
    pub demux: u32,
    /// `dvrD` index under the adapter
    pub dvr: u32,
    /// Destination file for the raw transport stream
    pub output: PathBuf,
    /// Ordered hardware tuning parameters as supplied by the caller
    pub properties: Vec<Property>,
    /// PID filters; empty means "capture the entire multiplex"
    pub pids: Vec<u16>,
}

/// Prepare a caller-supplied property list for the batched
/// `FE_SET_PROPERTY` call.
///
/// Caller-supplied clear/tune markers are stripped, a default bandwidth
/// is injected if none is present, and the sequence is wrapped so it
/// always begins with the clear marker and ends with the tune marker.
/// Order of the remaining entries is preserved, and applying this twice
/// yields the same sequence as applying it once.
pub fn normalize_properties(supplied: &[Property]) -> Vec<Property> {
    let mut body: Vec<Property> = supplied
        .iter()
        .copied()
        .filter(|p| !p.is_marker())
        .collect();

    if !body.iter().any(|p| p.code == DTV_BANDWIDTH_HZ) {
        body.push(Property::new(DTV_BANDWIDTH_HZ, DEFAULT_BANDWIDTH_HZ));
    }

    let mut sequence = Vec::with_capacity(body.len() + 2);
    sequence.push(Property::clear());
    sequence.extend(body);
    sequence.push(Property::tune());
    sequence
}

/// Tunables of the receptor stage and the session as a whole.
/// Defaults match the production values; tests tighten them.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Size of each device read and of every chunk's backing buffer.
    /// 64 KiB is roughly 26 milliseconds worth of transport stream.
    pub chunk_capacity: usize,
    /// Number of frontend status polls before giving up on lock
    pub lock_attempts: u32,
    /// Delay between lock polls
    pub lock_interval: Duration,
    /// Writer-stage tunables
    pub writer: WriterOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_capacity: 64 * 1024,
            // 120 polls 25 ms apart, a ceiling of about 3 seconds
            lock_attempts: 120,
            lock_interval: Duration::from_millis(25),
            writer: WriterOptions::default(),
        }
    }
}

/// Tunables of the writer stage.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Maximum estimated outstanding unwritten memory before queued
    /// chunks are dropped instead of retried. 750 MB is about five
    /// minutes of capture at the nominal chunk rate.
    pub overrun_ceiling: usize,
    /// Suppression window for repeated notifications of one subject
    pub notify_cooldown: Duration,
    /// Period of the queue-health self-check
    pub health_interval: Duration,
    /// Pending-message count that flags the queue as busy
    pub queue_high_water: usize,
    /// Pending-message count below which a busy queue is ok again
    pub queue_low_water: usize,
    /// Pause between attempts at rewriting a failed chunk
    pub retry_backoff: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            overrun_ceiling: 786_432_000,
            notify_cooldown: Duration::from_secs(5),
            health_interval: Duration::from_secs(5),
            queue_high_water: 100,
            queue_low_water: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}
