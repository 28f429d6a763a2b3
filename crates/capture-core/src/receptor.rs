//! Receptor stage: device lifecycle and the capture loop.
//!
//! A single-pass state machine: open and probe the frontend, apply the
//! normalized property batch, poll for lock, program the demux filters,
//! open the stream source, then read fixed-size chunks back-to-back and
//! forward them downstream. Any failure is fatal for the session; the
//! diagnostic is queued at the writer before the scheduler is signaled,
//! so it is surfaced even though the session is being torn down.
//!
//! Like the writer, this is a synchronous worker meant for
//! `tokio::task::spawn_blocking`; the blocking device read stalls only
//! this stage. All device handles live in [`DeviceSession`] and are
//! released together when it drops, at teardown.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use dvb::{
    DemuxFilter, DeviceBackend, DeviceError, Frontend, StreamSource, properties::PID_WILDCARD,
};

use crate::{
    chunk::Chunk,
    config::{CaptureConfig, SessionOptions, normalize_properties},
    messages::{FatalSignal, WriterMessage},
    notify::Notification,
};

/// All device handles of one session. Dropping this releases the
/// frontend, every demux filter, and the stream source together.
struct DeviceSession {
    _frontend: Box<dyn Frontend>,
    _filters: Vec<Box<dyn DemuxFilter>>,
    source: Box<dyn StreamSource>,
}

/// An unrecoverable condition: the human-readable subject plus the
/// device error whose OS text becomes the diagnostic detail.
struct FatalProblem {
    subject: &'static str,
    error: DeviceError,
}

impl FatalProblem {
    fn new(subject: &'static str) -> impl FnOnce(DeviceError) -> FatalProblem {
        move |error| FatalProblem { subject, error }
    }
}

pub(crate) struct Receptor {
    pub(crate) config: Arc<CaptureConfig>,
    pub(crate) backend: Arc<dyn DeviceBackend>,
    pub(crate) writer: UnboundedSender<WriterMessage>,
    pub(crate) fatal: UnboundedSender<FatalSignal>,
    pub(crate) token: CancellationToken,
    pub(crate) options: SessionOptions,
}

impl Receptor {
    /// Run the stage to completion: either the steady-state capture
    /// loop until teardown, or a fatal report.
    pub(crate) fn run(mut self) {
        match self.acquire() {
            Ok(session) => self.capture(session),
            Err(problem) => self.report_fatal(problem),
        }
    }

    /// The tune-and-lock sequence, performed exactly once.
    fn acquire(&mut self) -> Result<DeviceSession, FatalProblem> {
        let config = &self.config;

        let mut frontend = self
            .backend
            .open_frontend(config.adapter, config.frontend)
            .map_err(FatalProblem::new("FATAL: error opening frontend"))?;

        let version = frontend
            .api_version()
            .map_err(FatalProblem::new("FATAL: DVB driver doesn't support DVB API v5"))?;
        debug!(version = format_args!("{version:#x}"), "tuning API present");

        let properties = normalize_properties(&config.properties);
        frontend
            .set_properties(&properties)
            .map_err(FatalProblem::new("FATAL: error configuring frontend"))?;

        self.poll_for_lock(frontend.as_mut())?;
        info!("tuner locked");

        // An empty PID list means the whole multiplex.
        let pids = if config.pids.is_empty() {
            vec![PID_WILDCARD]
        } else {
            config.pids.clone()
        };

        let mut filters = Vec::with_capacity(pids.len());
        for pid in pids {
            let mut filter = self
                .backend
                .open_filter(config.adapter, config.demux)
                .map_err(FatalProblem::new("FATAL: error opening demux"))?;
            filter
                .start(pid)
                .map_err(FatalProblem::new("FATAL: error configuring demux"))?;
            filters.push(filter);
        }

        let source = self
            .backend
            .open_source(config.adapter, config.dvr)
            .map_err(FatalProblem::new("FATAL: error opening dvr"))?;

        Ok(DeviceSession {
            _frontend: frontend,
            _filters: filters,
            source,
        })
    }

    fn poll_for_lock(&self, frontend: &mut dyn Frontend) -> Result<(), FatalProblem> {
        for _ in 0..self.options.lock_attempts {
            let status = frontend
                .read_status()
                .map_err(FatalProblem::new("FATAL: could not tune"))?;
            if status.has_lock() {
                return Ok(());
            }
            std::thread::sleep(self.options.lock_interval);
        }
        Err(FatalProblem {
            subject: "FATAL: could not tune",
            error: DeviceError::timed_out("poll frontend lock"),
        })
    }

    /// The indefinite reception loop: one fixed-size read per pass,
    /// one chunk forwarded per successful read.
    fn capture(&mut self, mut session: DeviceSession) {
        let capacity = self.options.chunk_capacity;
        info!(capacity, "capture loop started");

        loop {
            if self.token.is_cancelled() {
                break;
            }

            let mut buffer = BytesMut::zeroed(capacity);
            let result = session.source.read(&mut buffer);

            // Teardown may have been signaled while the read blocked;
            // whatever it returned is no longer part of the session.
            if self.token.is_cancelled() {
                break;
            }

            match result {
                Ok(0) => {
                    self.report_fatal(FatalProblem {
                        subject: "error receiving data",
                        error: DeviceError::end_of_stream("read dvr"),
                    });
                    break;
                }
                Ok(n) => {
                    buffer.truncate(n);
                    let chunk = Chunk::new(buffer.freeze(), capacity);
                    if self.writer.send(WriterMessage::Chunk(chunk)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    self.report_fatal(FatalProblem {
                        subject: "error receiving data",
                        error: e,
                    });
                    break;
                }
            }
        }
        debug!("capture loop stopped");
    }

    /// Fatal protocol: queue the diagnostic at the writer first, then
    /// signal the scheduler, then stop. The ordering guarantees the
    /// diagnostic is in the writer's mailbox before teardown starts.
    fn report_fatal(&mut self, problem: FatalProblem) {
        error!(subject = problem.subject, error = %problem.error, "receptor fatal");
        let _ = self.writer.send(WriterMessage::Notify(Notification::new(
            problem.subject,
            format!(": {}", problem.error.os_text()),
        )));
        let _ = self.fatal.send(FatalSignal);
    }
}
