//! Writer stage: best-effort persistence with bounded-memory retry.
//!
//! The writer is a synchronous mailbox loop intended to run under
//! `tokio::task::spawn_blocking`, so file I/O never stalls the async
//! runtime. A chunk that cannot be (fully) written stays in a
//! front-of-queue pending slot and is reattempted before any newer
//! message, preserving output byte order; slow disks therefore cause
//! queued retries, not data loss, until the estimated outstanding
//! memory crosses the overrun ceiling.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::{
    chunk::Chunk,
    config::{CaptureConfig, WriterOptions},
    messages::WriterMessage,
    notify::{DiagnosticSink, Notification},
};

/// Destination file handle, as much of it as the writer needs.
/// A seam so tests can inject short writes and transient failures.
pub trait OutputFile: Send {
    /// One write attempt. May write fewer bytes than supplied.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Opens the destination lazily, on the first chunk.
pub trait OutputOpener: Send {
    fn open(&self, path: &Path) -> io::Result<Box<dyn OutputFile>>;
}

/// Production opener: create-or-truncate the destination, then append
/// sequentially for the whole session.
pub struct FsOpener;

impl OutputOpener for FsOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn OutputFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(FsFile { file }))
    }
}

struct FsFile {
    file: std::fs::File,
}

impl OutputFile for FsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }
}

/// What became of one chunk-processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkOutcome {
    /// Live window fully written
    Written,
    /// Not written; keep it at the front of the queue and try again
    Retry,
    /// Not written and over the memory ceiling; discarded
    Dropped,
}

/// Writer state machine, separate from the mailbox loop so the
/// policies (dedup, hysteresis, backpressure) are unit-testable.
pub(crate) struct WriterCore {
    options: WriterOptions,
    sink: Arc<dyn DiagnosticSink>,
    opener: Box<dyn OutputOpener>,
    output: Option<PathBuf>,
    file: Option<Box<dyn OutputFile>>,
    in_error: bool,
    busy: bool,
    recent: HashMap<String, Instant>,
}

impl WriterCore {
    pub(crate) fn new(
        options: WriterOptions,
        sink: Arc<dyn DiagnosticSink>,
        opener: Box<dyn OutputOpener>,
    ) -> Self {
        Self {
            options,
            sink,
            opener,
            output: None,
            file: None,
            in_error: false,
            busy: false,
            recent: HashMap::new(),
        }
    }

    /// First message of every session: establishes the destination.
    pub(crate) fn on_config(&mut self, config: &CaptureConfig) {
        self.output = Some(config.output.clone());
    }

    /// Process one chunk. `queued` is the number of messages currently
    /// pending for this stage, this one included; it drives the
    /// outstanding-memory estimate of the backpressure policy.
    pub(crate) fn on_chunk(&mut self, chunk: &mut Chunk, queued: usize) -> ChunkOutcome {
        if self.file.is_none() {
            if let Some(path) = self.output.clone() {
                match self.opener.open(&path) {
                    Ok(file) => self.file = Some(file),
                    Err(e) => {
                        self.in_error = true;
                        self.notify(Notification::new(
                            "open error",
                            format!(": {e} for '{}'", path.display()),
                        ));
                    }
                }
            }
        }

        let mut written = false;
        let attempt = self.file.as_mut().map(|file| file.write(chunk.as_slice()));
        match attempt {
            Some(Ok(n)) if n == chunk.len() => written = true,
            Some(Ok(n)) => {
                // Short write: keep only the unwritten remainder.
                self.in_error = true;
                self.notify(Notification::new("write error", ": short write"));
                chunk.advance(n);
            }
            Some(Err(e)) => {
                self.in_error = true;
                self.notify(Notification::new("write error", format!(": {e}")));
            }
            None => {}
        }

        if written && self.in_error {
            self.in_error = false;
            self.on_health_tick(queued);
            self.notify(Notification::new("error recovered", " - no data lost"));
        }

        if written {
            return ChunkOutcome::Written;
        }
        if chunk.capacity() * queued < self.options.overrun_ceiling {
            ChunkOutcome::Retry
        } else {
            self.discard_notice();
            ChunkOutcome::Dropped
        }
    }

    pub(crate) fn on_notification(&mut self, notification: Notification) {
        self.notify(notification);
    }

    /// Queue-health self-check with hysteresis: one warning when the
    /// pending count crosses the high-water mark, one all-clear once it
    /// has drained below the low-water mark.
    pub(crate) fn on_health_tick(&mut self, queued: usize) {
        if self.busy && queued < self.options.queue_low_water {
            self.busy = false;
            self.notify(Notification::new("queue ok", " - no data pending to write"));
        }
        if queued > self.options.queue_high_water && !self.busy {
            self.busy = true;
            self.notify(Notification::new(
                "queue warning",
                format!(": pending to write ({queued} messages)"),
            ));
        }
    }

    /// The only intentional data-loss path, always signaled.
    pub(crate) fn discard_notice(&mut self) {
        warn!("overrun ceiling reached, discarding captured data");
        self.notify(Notification::new("buffer overrun", " - discarding data"));
    }

    /// Emit unless the same subject was printed within the cool-down
    /// window. A suppressed repeat does not refresh the window.
    fn notify(&mut self, notification: Notification) {
        let now = Instant::now();
        let print = match self.recent.get(&notification.subject) {
            Some(last) => now.duration_since(*last) > self.options.notify_cooldown,
            None => true,
        };
        if print {
            self.recent.insert(notification.subject.clone(), now);
            self.sink.emit(&notification.line());
        }
    }
}

/// The writer mailbox loop. Runs until every sender is gone and the
/// mailbox is drained, so no buffered chunk is silently discarded on
/// shutdown (short of the overrun policy).
pub(crate) fn run(mut rx: UnboundedReceiver<WriterMessage>, mut core: WriterCore) {
    let mut pending: Option<Chunk> = None;

    loop {
        // The retry slot is drained before any newer inbound message so
        // output bytes never reorder.
        if let Some(mut chunk) = pending.take() {
            if core.on_chunk(&mut chunk, rx.len() + 1) == ChunkOutcome::Retry {
                if rx.is_closed() {
                    // Upstream is gone; that was the last attempt this
                    // chunk gets, and it falls under the overrun policy.
                    core.discard_notice();
                } else {
                    pending = Some(chunk);
                    std::thread::sleep(core.options.retry_backoff);
                }
            }
            continue;
        }

        match rx.blocking_recv() {
            None => break,
            Some(WriterMessage::Config(config)) => core.on_config(&config),
            Some(WriterMessage::Chunk(chunk)) => pending = Some(chunk),
            Some(WriterMessage::Notify(notification)) => core.on_notification(notification),
            Some(WriterMessage::Tick) => core.on_health_tick(rx.len()),
        }
    }
    debug!("writer mailbox drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemorySink;
    use bytes::Bytes;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory output file with a scripted number of failures.
    struct ScriptedFile {
        content: Arc<Mutex<Vec<u8>>>,
        failures_left: usize,
        short_write: Option<usize>,
    }

    impl OutputFile for ScriptedFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(io::Error::from_raw_os_error(28)); // ENOSPC
            }
            let n = self.short_write.take().unwrap_or(buf.len()).min(buf.len());
            self.content.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    struct ScriptedOpener {
        content: Arc<Mutex<Vec<u8>>>,
        write_failures: usize,
        short_write: Option<usize>,
        open_failures: usize,
        opens: Arc<Mutex<usize>>,
    }

    impl ScriptedOpener {
        fn writable(content: Arc<Mutex<Vec<u8>>>) -> Self {
            Self {
                content,
                write_failures: 0,
                short_write: None,
                open_failures: 0,
                opens: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl OutputOpener for ScriptedOpener {
        fn open(&self, _path: &Path) -> io::Result<Box<dyn OutputFile>> {
            let mut opens = self.opens.lock().unwrap();
            *opens += 1;
            if *opens <= self.open_failures {
                return Err(io::Error::from_raw_os_error(13)); // EACCES
            }
            Ok(Box::new(ScriptedFile {
                content: self.content.clone(),
                failures_left: self.write_failures,
                short_write: self.short_write,
            }))
        }
    }

    fn core_with(
        opener: ScriptedOpener,
        options: WriterOptions,
    ) -> (WriterCore, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let mut core = WriterCore::new(options, sink.clone(), Box::new(opener));
        core.on_config(&CaptureConfig {
            adapter: 0,
            frontend: 0,
            demux: 0,
            dvr: 0,
            output: PathBuf::from("capture.mts"),
            properties: vec![],
            pids: vec![],
        });
        (core, sink)
    }

    fn chunk(bytes: &'static [u8], capacity: usize) -> Chunk {
        Chunk::new(Bytes::from_static(bytes), capacity)
    }

    #[test]
    fn clean_writes_concatenate_in_order() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let (mut core, sink) = core_with(
            ScriptedOpener::writable(content.clone()),
            WriterOptions::default(),
        );

        for payload in [b"aaa".as_slice(), b"bb", b"cccc"] {
            let mut c = Chunk::new(Bytes::copy_from_slice(payload), 16);
            assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Written);
        }
        assert_eq!(content.lock().unwrap().as_slice(), b"aaabbcccc");
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn write_failure_then_success_recovers_without_loss() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let mut opener = ScriptedOpener::writable(content.clone());
        opener.write_failures = 1;
        let (mut core, sink) = core_with(opener, WriterOptions::default());

        let mut c = chunk(b"payload", 16);
        assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Retry);
        assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Written);

        assert_eq!(content.lock().unwrap().as_slice(), b"payload");
        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("write error"));
        assert_eq!(lines[1], "error recovered - no data lost");
    }

    #[test]
    fn short_write_advances_live_window() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let mut opener = ScriptedOpener::writable(content.clone());
        opener.short_write = Some(3);
        let (mut core, sink) = core_with(opener, WriterOptions::default());

        let mut c = chunk(b"abcdef", 16);
        assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Retry);
        assert_eq!(c.as_slice(), b"def");
        assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Written);
        assert_eq!(content.lock().unwrap().as_slice(), b"abcdef");
        assert!(sink.lines().iter().any(|l| l.starts_with("write error")));
    }

    #[test]
    fn open_failure_notifies_and_retries() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let mut opener = ScriptedOpener::writable(content);
        opener.open_failures = 1;
        let (mut core, sink) = core_with(opener, WriterOptions::default());

        let mut c = chunk(b"x", 16);
        assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Retry);
        assert!(sink.lines()[0].starts_with("open error"));
        // Second attempt opens successfully and recovers.
        assert_eq!(core.on_chunk(&mut c, 1), ChunkOutcome::Written);
        assert_eq!(sink.lines().last().unwrap(), "error recovered - no data lost");
    }

    #[test]
    fn backpressure_retries_below_ceiling_and_drops_at_it() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let mut opener = ScriptedOpener::writable(content);
        opener.write_failures = usize::MAX;
        let options = WriterOptions {
            overrun_ceiling: 1_000,
            notify_cooldown: Duration::ZERO,
            ..WriterOptions::default()
        };
        let (mut core, sink) = core_with(opener, options);

        // capacity 100 x 5 queued = 500 < 1000: must retry, not drop
        let mut c = chunk(b"abc", 100);
        assert_eq!(core.on_chunk(&mut c, 5), ChunkOutcome::Retry);
        assert!(!sink.lines().iter().any(|l| l.starts_with("buffer overrun")));

        // capacity 100 x 10 queued = 1000, bound reached: drop once
        assert_eq!(core.on_chunk(&mut c, 10), ChunkOutcome::Dropped);
        let overruns = sink
            .lines()
            .iter()
            .filter(|l| l.starts_with("buffer overrun"))
            .count();
        assert_eq!(overruns, 1);
    }

    #[test]
    fn run_discards_pending_chunk_once_upstream_is_gone() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let mut opener = ScriptedOpener::writable(content.clone());
        opener.write_failures = usize::MAX;
        let options = WriterOptions {
            retry_backoff: Duration::from_millis(1),
            ..WriterOptions::default()
        };
        let (core, sink) = core_with(opener, options);

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(WriterMessage::Chunk(chunk(b"doomed", 16))).unwrap();
        drop(tx);

        // Must return: a dead disk ends in a signaled discard, not an
        // endless retry loop.
        run(rx, core);

        assert!(content.lock().unwrap().is_empty());
        let lines = sink.lines();
        assert!(lines.iter().any(|l| l.starts_with("write error")));
        assert_eq!(lines.last().unwrap(), "buffer overrun - discarding data");
    }

    #[test]
    fn notification_dedup_within_cooldown() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let options = WriterOptions {
            notify_cooldown: Duration::from_millis(40),
            ..WriterOptions::default()
        };
        let (mut core, sink) = core_with(ScriptedOpener::writable(content), options);

        core.on_notification(Notification::new("subject", ": detail"));
        core.on_notification(Notification::new("subject", ": detail"));
        assert_eq!(sink.lines().len(), 1);

        std::thread::sleep(Duration::from_millis(60));
        core.on_notification(Notification::new("subject", ": detail"));
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn dedup_is_keyed_on_subject_alone() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let (mut core, sink) = core_with(
            ScriptedOpener::writable(content),
            WriterOptions::default(),
        );
        core.on_notification(Notification::new("subject", ": first detail"));
        core.on_notification(Notification::new("subject", ": other detail"));
        core.on_notification(Notification::new("another", ": first detail"));
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn queue_health_hysteresis() {
        let content = Arc::new(Mutex::new(Vec::new()));
        let options = WriterOptions {
            notify_cooldown: Duration::ZERO,
            ..WriterOptions::default()
        };
        let (mut core, sink) = core_with(ScriptedOpener::writable(content), options);

        core.on_health_tick(150);
        core.on_health_tick(150);
        core.on_health_tick(50); // between the marks: no change
        let warnings = |sink: &MemorySink| {
            sink.lines()
                .iter()
                .filter(|l| l.starts_with("queue warning"))
                .count()
        };
        assert_eq!(warnings(&sink), 1);
        assert!(!sink.lines().iter().any(|l| l.starts_with("queue ok")));

        core.on_health_tick(2);
        assert_eq!(
            sink.lines()
                .iter()
                .filter(|l| l.starts_with("queue ok"))
                .count(),
            1
        );

        std::thread::sleep(Duration::from_millis(2));
        core.on_health_tick(150);
        assert_eq!(warnings(&sink), 2);
    }
}
