//! Scheduler stage: session lifetime.
//!
//! The scheduler owns the capture window. It arms the one-shot start
//! timer, brings up the writer and receptor, and tears the session down
//! when the window closes or a fatal signal arrives — whichever comes
//! first. There are no retries at this level: a fatal signal always
//! ends the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dvb::DeviceBackend;

use crate::{
    config::{CaptureConfig, SessionOptions},
    messages::{FatalSignal, WriterMessage},
    notify::{DiagnosticSink, StderrSink},
    receptor::Receptor,
    writer::{self, FsOpener, OutputOpener, WriterCore},
};

/// The pre-computed relative delays of the capture window: time until
/// capture begins (zero if the window has already opened) and,
/// optionally, time until it ends (none means "until torn down").
#[derive(Debug, Clone, Copy)]
pub struct CaptureWindow {
    pub start_delay: Duration,
    pub end_delay: Option<Duration>,
}

impl CaptureWindow {
    /// A window that opens immediately and never closes on its own.
    pub fn open_ended() -> Self {
        Self {
            start_delay: Duration::ZERO,
            end_delay: None,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The capture window closed cleanly
    Completed,
    /// A stage reported an unrecoverable condition
    Fatal,
}

/// One capture session: configuration plus the seams the pipeline runs
/// against. Defaults target production (real stderr, real files);
/// builder methods substitute test doubles.
pub struct Session {
    config: Arc<CaptureConfig>,
    backend: Arc<dyn DeviceBackend>,
    sink: Arc<dyn DiagnosticSink>,
    opener: Box<dyn OutputOpener>,
    options: SessionOptions,
    token: CancellationToken,
}

impl Session {
    pub fn new(config: CaptureConfig, backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            sink: Arc::new(StderrSink),
            opener: Box::new(FsOpener),
            options: SessionOptions::default(),
            token: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_opener(mut self, opener: Box<dyn OutputOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a caller-supplied cancellation token instead of a fresh one,
    /// so the caller can wire external stop sources to the session.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token cancelled when the session tears down; external callers
    /// (signal handlers, tests) may also cancel it to stop the session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run the session through its capture window and report how it
    /// ended. Returns only after both worker stages have stopped and
    /// the writer has drained its mailbox, so no buffered chunk is
    /// silently lost at shutdown.
    pub async fn run(self, window: CaptureWindow) -> SessionOutcome {
        tokio::time::sleep(window.start_delay).await;
        info!(output = %self.config.output.display(), "capture window opened");

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<FatalSignal>();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<WriterMessage>();

        let core = WriterCore::new(self.options.writer.clone(), self.sink.clone(), self.opener);
        let writer_task = tokio::task::spawn_blocking(move || writer::run(writer_rx, core));

        // Configuration is always the writer's first message.
        let _ = writer_tx.send(WriterMessage::Config(self.config.clone()));

        let ticker_task = {
            let tx = writer_tx.clone();
            let token = self.token.clone();
            let period = self.options.writer.health_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await; // the immediate first tick
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            if tx.send(WriterMessage::Tick).is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let receptor = Receptor {
            config: self.config.clone(),
            backend: self.backend.clone(),
            writer: writer_tx,
            fatal: fatal_tx,
            token: self.token.clone(),
            options: self.options.clone(),
        };
        let receptor_task = tokio::task::spawn_blocking(move || receptor.run());

        let outcome = tokio::select! {
            _ = window_close(window.end_delay) => {
                info!("capture window closed");
                SessionOutcome::Completed
            }
            signal = fatal_rx.recv() => {
                if signal.is_some() {
                    warn!("fatal signal received, ending session");
                    SessionOutcome::Fatal
                } else {
                    // Every sender gone without a signal: the receptor
                    // stopped because teardown was already underway.
                    SessionOutcome::Completed
                }
            }
        };

        // Teardown: stop the producers, then wait for the writer to
        // drain everything that is already queued.
        self.token.cancel();
        let _ = receptor_task.await;
        let _ = ticker_task.await;
        let _ = writer_task.await;

        outcome
    }
}

async fn window_close(end_delay: Option<Duration>) {
    match end_delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}
