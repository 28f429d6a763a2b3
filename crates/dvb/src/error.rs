use std::io;

/// Error from a device open/configure/read operation.
///
/// Every system call at the device boundary reports failure through this
/// type, carrying the operation it was performing and the underlying OS
/// error. Conditions with no OS error attached (lock-poll ceiling,
/// end-of-stream) use a synthesized [`io::Error`] so callers can treat
/// every failure uniformly.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {source}")]
pub struct DeviceError {
    /// The failing operation, e.g. `open /dev/dvb/adapter0/frontend0`
    pub op: String,
    #[source]
    pub source: io::Error,
}

impl DeviceError {
    pub fn io(op: impl Into<String>, source: io::Error) -> Self {
        Self {
            op: op.into(),
            source,
        }
    }

    /// Lock polling reached its ceiling without the tuner locking.
    pub fn timed_out(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            source: io::Error::new(io::ErrorKind::TimedOut, "tuner lock timed out"),
        }
    }

    /// The stream source reported end-of-stream (a zero-length read).
    pub fn end_of_stream(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream"),
        }
    }

    /// Human-readable text of the underlying system error, for
    /// diagnostic lines.
    pub fn os_text(&self) -> String {
        self.source.to_string()
    }
}
