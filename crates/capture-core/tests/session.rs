//! End-to-end session tests against simulated devices and real files.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use capture_core::testing::{FailPoint, FlakyOpener, MockBackend};
use capture_core::{
    CaptureConfig, CaptureWindow, MemorySink, Session, SessionOptions, SessionOutcome,
    WriterOptions,
};
use dvb::properties::PID_WILDCARD;

fn config(output: PathBuf) -> CaptureConfig {
    CaptureConfig {
        adapter: 0,
        frontend: 0,
        demux: 0,
        dvr: 0,
        output,
        properties: vec![],
        pids: vec![],
    }
}

fn tight_options() -> SessionOptions {
    SessionOptions {
        lock_attempts: 5,
        lock_interval: Duration::from_millis(2),
        writer: WriterOptions {
            retry_backoff: Duration::from_millis(5),
            ..WriterOptions::default()
        },
        ..SessionOptions::default()
    }
}

fn window(end: Duration) -> CaptureWindow {
    CaptureWindow {
        start_delay: Duration::ZERO,
        end_delay: Some(end),
    }
}

#[tokio::test]
async fn captures_scripted_stream_to_file() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("capture.mts");
    let sink = Arc::new(MemorySink::new());
    let token = CancellationToken::new();

    let reads: Vec<Vec<u8>> = (0u8..3).map(|i| vec![i; 64 * 1024]).collect();
    let backend = Arc::new(MockBackend::new(reads, token.clone()));

    let outcome = Session::new(config(output.clone()), backend.clone())
        .with_sink(sink.clone())
        .with_options(tight_options())
        .with_token(token)
        .run(window(Duration::from_millis(300)))
        .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    let written = std::fs::read(&output).unwrap();
    assert_eq!(written.len(), 3 * 64 * 1024);
    assert!(written[..64 * 1024].iter().all(|&b| b == 0));
    assert!(written[2 * 64 * 1024..].iter().all(|&b| b == 2));
    assert!(sink.lines().is_empty());

    // No explicit PID list: a single wildcard filter spans the mux.
    assert_eq!(backend.filter_pids.lock().unwrap().as_slice(), &[
        PID_WILDCARD
    ]);
}

#[tokio::test]
async fn frontend_open_failure_is_fatal_before_any_capture() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("capture.mts");
    let sink = Arc::new(MemorySink::new());
    let token = CancellationToken::new();

    let backend = Arc::new(MockBackend::failing_at(
        FailPoint::FrontendOpen,
        token.clone(),
    ));

    let outcome = Session::new(config(output.clone()), backend.clone())
        .with_sink(sink.clone())
        .with_options(tight_options())
        .with_token(token)
        .run(window(Duration::from_secs(10)))
        .await;

    assert_eq!(outcome, SessionOutcome::Fatal);
    assert_eq!(backend.filters_opened.load(Ordering::SeqCst), 0);
    assert_eq!(backend.sources_opened.load(Ordering::SeqCst), 0);
    // Nothing captured: the destination was never even created.
    assert!(!output.exists());

    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("frontend"), "unexpected line: {}", lines[0]);
}

#[tokio::test]
async fn transient_write_failure_recovers_without_loss() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("capture.mts");
    let sink = Arc::new(MemorySink::new());
    let token = CancellationToken::new();

    let reads = vec![vec![0xaa; 4096], vec![0xbb; 4096]];
    let backend = Arc::new(MockBackend::new(reads, token.clone()));

    let outcome = Session::new(config(output.clone()), backend)
        .with_sink(sink.clone())
        .with_opener(Box::new(FlakyOpener::new(1)))
        .with_options(tight_options())
        .with_token(token)
        .run(window(Duration::from_millis(300)))
        .await;

    assert_eq!(outcome, SessionOutcome::Completed);

    let written = std::fs::read(&output).unwrap();
    assert_eq!(written.len(), 8192);
    assert!(written[..4096].iter().all(|&b| b == 0xaa));
    assert!(written[4096..].iter().all(|&b| b == 0xbb));

    let lines = sink.lines();
    assert_eq!(lines.len(), 2, "lines: {lines:?}");
    assert!(lines[0].starts_with("write error"));
    assert_eq!(lines[1], "error recovered - no data lost");
}

#[tokio::test]
async fn teardown_completes_when_disk_never_recovers() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("capture.mts");
    let sink = Arc::new(MemorySink::new());
    let token = CancellationToken::new();

    let backend = Arc::new(MockBackend::new(vec![vec![0x55; 1024]], token.clone()));

    let run = Session::new(config(output), backend)
        .with_sink(sink.clone())
        .with_opener(Box::new(FlakyOpener::new(usize::MAX)))
        .with_options(tight_options())
        .with_token(token)
        .run(window(Duration::from_millis(100)));

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("session must tear down even though every write fails");

    assert_eq!(outcome, SessionOutcome::Completed);
    let lines = sink.lines();
    assert!(lines.iter().any(|l| l.starts_with("write error")));
    assert_eq!(lines.last().unwrap(), "buffer overrun - discarding data");
}

#[tokio::test]
async fn lock_timeout_is_fatal() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("capture.mts");
    let sink = Arc::new(MemorySink::new());
    let token = CancellationToken::new();

    let backend = Arc::new(MockBackend::failing_at(FailPoint::Lock, token.clone()));

    let outcome = Session::new(config(output), backend)
        .with_sink(sink.clone())
        .with_options(tight_options())
        .with_token(token)
        .run(window(Duration::from_secs(10)))
        .await;

    assert_eq!(outcome, SessionOutcome::Fatal);
    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("could not tune"));
}

#[tokio::test]
async fn explicit_pid_list_programs_one_filter_per_pid() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("capture.mts");
    let token = CancellationToken::new();

    let backend = Arc::new(MockBackend::new(vec![vec![1u8; 188]], token.clone()));
    let mut cfg = config(output);
    cfg.pids = vec![0x100, 0x101, 0x1fff];

    let outcome = Session::new(cfg, backend.clone())
        .with_sink(Arc::new(MemorySink::new()))
        .with_options(tight_options())
        .with_token(token)
        .run(window(Duration::from_millis(150)))
        .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(backend.filters_opened.load(Ordering::SeqCst), 3);
    assert_eq!(backend.filter_pids.lock().unwrap().as_slice(), &[
        0x100, 0x101, 0x1fff
    ]);
}
