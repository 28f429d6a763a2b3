//! Frontend tuning properties and the fixed integer vocabulary of the
//! DVB API (`linux/dvb/frontend.h`). The enumeration values must be
//! preserved bit-for-bit for hardware compatibility.

/// No-op / placeholder property value
pub const DTV_UNDEFINED: u32 = 0;
/// Commit the accumulated property set to the hardware
pub const DTV_TUNE: u32 = 1;
/// Reset the frontend property cache
pub const DTV_CLEAR: u32 = 2;
/// Carrier frequency in Hz (kHz for satellite)
pub const DTV_FREQUENCY: u32 = 3;
/// Modulation scheme
pub const DTV_MODULATION: u32 = 4;
/// Channel bandwidth in Hz
pub const DTV_BANDWIDTH_HZ: u32 = 5;
/// Spectral inversion
pub const DTV_INVERSION: u32 = 6;
/// Symbol rate (satellite/cable)
pub const DTV_SYMBOL_RATE: u32 = 8;
/// Inner forward error correction (satellite/cable)
pub const DTV_INNER_FEC: u32 = 9;
/// Pilot tones (DVB-S2)
pub const DTV_PILOT: u32 = 12;
/// Rolloff factor (DVB-S2)
pub const DTV_ROLLOFF: u32 = 13;
/// Delivery system (DVB-T, DVB-T2, DVB-S, ...)
pub const DTV_DELIVERY_SYSTEM: u32 = 17;
/// DVB API version probe
pub const DTV_API_VERSION: u32 = 35;
/// Code rate, high-priority stream (terrestrial)
pub const DTV_CODE_RATE_HP: u32 = 36;
/// Code rate, low-priority stream (terrestrial)
pub const DTV_CODE_RATE_LP: u32 = 37;
/// Guard interval (terrestrial)
pub const DTV_GUARD_INTERVAL: u32 = 38;
/// Transmission mode (terrestrial)
pub const DTV_TRANSMISSION_MODE: u32 = 39;
/// Hierarchy (terrestrial)
pub const DTV_HIERARCHY: u32 = 40;

/// `FE_HAS_LOCK` bit of the frontend status word: the tuner has
/// synchronized to the configured signal.
pub const FE_HAS_LOCK: u32 = 0x10;

/// Reserved demux PID meaning "capture the entire multiplex unfiltered"
pub const PID_WILDCARD: u16 = 0x2000;

/// Default channel bandwidth injected when the caller supplies none
/// (8 MHz, used in Europe).
pub const DEFAULT_BANDWIDTH_HZ: u32 = 8_000_000;

/// One hardware tuning parameter: a (code, value) pair from the DVB
/// property vocabulary above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub code: u32,
    pub value: u32,
}

impl Property {
    pub const fn new(code: u32, value: u32) -> Self {
        Self { code, value }
    }

    /// The clear marker that must open every batched property set.
    pub const fn clear() -> Self {
        Self::new(DTV_CLEAR, DTV_UNDEFINED)
    }

    /// The tune marker that must close every batched property set.
    pub const fn tune() -> Self {
        Self::new(DTV_TUNE, DTV_UNDEFINED)
    }

    /// Whether this entry is one of the clear/tune batch markers.
    pub const fn is_marker(&self) -> bool {
        matches!(self.code, DTV_CLEAR | DTV_TUNE)
    }
}
