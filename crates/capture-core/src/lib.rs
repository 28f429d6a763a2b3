//! Continuous DVB capture pipeline.
//!
//! Three stages connected by FIFO mailboxes: the scheduler owns the
//! capture window and the lifetime of the other two, the receptor tunes
//! the device and reads the transport stream in fixed-size chunks, and
//! the writer persists chunks to disk while absorbing transient output
//! failures through retry and backpressure. Stage workers are
//! synchronous and run on the blocking thread pool; only the scheduler
//! is async.
//!
//! The entry point is [`Session`]: configure it, pick a
//! [`CaptureWindow`], and `run` it to a [`SessionOutcome`].

pub mod chunk;
pub mod config;
mod messages;
pub mod notify;
mod receptor;
pub mod scheduler;
pub mod testing;
pub mod writer;

pub use chunk::Chunk;
pub use config::{CaptureConfig, SessionOptions, WriterOptions, normalize_properties};
pub use notify::{DiagnosticSink, MemorySink, Notification, StderrSink};
pub use scheduler::{CaptureWindow, Session, SessionOutcome};
pub use writer::{FsOpener, OutputFile, OutputOpener};
