//! Simulated devices and faulty outputs for exercising the pipeline
//! without hardware. Used by this crate's integration tests; kept in
//! the library so downstream crates can reuse the doubles.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dvb::{
    DemuxFilter, DeviceBackend, DeviceError, Frontend, Property, StreamSource, TunerStatus,
    properties::FE_HAS_LOCK,
};

use crate::writer::{FsOpener, OutputFile, OutputOpener};

/// Where a scripted backend should fail, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    FrontendOpen,
    ApiProbe,
    Configure,
    Lock,
    DemuxOpen,
    DemuxStart,
    SourceOpen,
}

/// A backend whose source replays a scripted list of reads, then idles
/// until the session token is cancelled. Counts handle opens so tests
/// can assert which stages were reached.
pub struct MockBackend {
    fail: Option<FailPoint>,
    reads: Mutex<VecDeque<Vec<u8>>>,
    token: CancellationToken,
    pub filters_opened: AtomicUsize,
    pub sources_opened: AtomicUsize,
    pub filter_pids: Arc<Mutex<Vec<u16>>>,
}

impl MockBackend {
    /// A healthy backend delivering `reads` in order. `token` must be
    /// the session's cancellation token; the source uses it to return
    /// cleanly at teardown instead of blocking forever.
    pub fn new(reads: Vec<Vec<u8>>, token: CancellationToken) -> Self {
        Self {
            fail: None,
            reads: Mutex::new(reads.into()),
            token,
            filters_opened: AtomicUsize::new(0),
            sources_opened: AtomicUsize::new(0),
            filter_pids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_at(fail: FailPoint, token: CancellationToken) -> Self {
        let mut backend = Self::new(Vec::new(), token);
        backend.fail = Some(fail);
        backend
    }

    fn refused(op: &str) -> DeviceError {
        DeviceError::io(op.to_string(), io::Error::from_raw_os_error(2)) // ENOENT
    }
}

impl DeviceBackend for MockBackend {
    fn open_frontend(&self, adapter: u32, frontend: u32) -> dvb::Result<Box<dyn Frontend>> {
        if self.fail == Some(FailPoint::FrontendOpen) {
            return Err(Self::refused(&format!(
                "open /dev/dvb/adapter{adapter}/frontend{frontend}"
            )));
        }
        Ok(Box::new(MockFrontend { fail: self.fail }))
    }

    fn open_filter(&self, _adapter: u32, _demux: u32) -> dvb::Result<Box<dyn DemuxFilter>> {
        if self.fail == Some(FailPoint::DemuxOpen) {
            return Err(Self::refused("open demux"));
        }
        self.filters_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockFilter {
            fail: self.fail,
            pids: self.filter_pids.clone(),
        }))
    }

    fn open_source(&self, _adapter: u32, _dvr: u32) -> dvb::Result<Box<dyn StreamSource>> {
        if self.fail == Some(FailPoint::SourceOpen) {
            return Err(Self::refused("open dvr"));
        }
        self.sources_opened.fetch_add(1, Ordering::SeqCst);
        let reads = std::mem::take(&mut *self.reads.lock().unwrap());
        Ok(Box::new(MockSource {
            reads,
            token: self.token.clone(),
        }))
    }
}

struct MockFrontend {
    fail: Option<FailPoint>,
}

impl Frontend for MockFrontend {
    fn api_version(&mut self) -> dvb::Result<u32> {
        if self.fail == Some(FailPoint::ApiProbe) {
            return Err(DeviceError::io(
                "FE_GET_PROPERTY",
                io::Error::from_raw_os_error(25), // ENOTTY
            ));
        }
        Ok(0x050b)
    }

    fn set_properties(&mut self, _properties: &[Property]) -> dvb::Result<()> {
        if self.fail == Some(FailPoint::Configure) {
            return Err(DeviceError::io(
                "FE_SET_PROPERTY",
                io::Error::from_raw_os_error(22), // EINVAL
            ));
        }
        Ok(())
    }

    fn read_status(&mut self) -> dvb::Result<TunerStatus> {
        if self.fail == Some(FailPoint::Lock) {
            return Ok(TunerStatus(0)); // never locks
        }
        Ok(TunerStatus(FE_HAS_LOCK))
    }
}

struct MockFilter {
    fail: Option<FailPoint>,
    pids: Arc<Mutex<Vec<u16>>>,
}

impl DemuxFilter for MockFilter {
    fn start(&mut self, pid: u16) -> dvb::Result<()> {
        if self.fail == Some(FailPoint::DemuxStart) {
            return Err(DeviceError::io(
                "DMX_SET_PES_FILTER",
                io::Error::from_raw_os_error(22),
            ));
        }
        self.pids.lock().unwrap().push(pid);
        Ok(())
    }
}

struct MockSource {
    reads: VecDeque<Vec<u8>>,
    token: CancellationToken,
}

impl StreamSource for MockSource {
    fn read(&mut self, buf: &mut [u8]) -> dvb::Result<usize> {
        if let Some(data) = self.reads.pop_front() {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            return Ok(n);
        }
        // Script exhausted: idle like a quiet multiplex until teardown.
        while !self.token.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(0)
    }
}

/// Opener that injects a scripted number of write failures (disk-full)
/// before delegating to the real file.
pub struct FlakyOpener {
    write_failures: AtomicUsize,
}

impl FlakyOpener {
    pub fn new(write_failures: usize) -> Self {
        Self {
            write_failures: AtomicUsize::new(write_failures),
        }
    }
}

impl OutputOpener for FlakyOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn OutputFile>> {
        let inner = FsOpener.open(path)?;
        Ok(Box::new(FlakyFile {
            inner,
            failures_left: self.write_failures.swap(0, Ordering::SeqCst),
        }))
    }
}

struct FlakyFile {
    inner: Box<dyn OutputFile>,
    failures_left: usize,
}

impl OutputFile for FlakyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(io::Error::from_raw_os_error(28)); // ENOSPC
        }
        self.inner.write(buf)
    }
}
