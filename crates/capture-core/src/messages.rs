//! Message contracts between the pipeline stages.
//!
//! Each stage owns one FIFO mailbox of tagged variants and processes
//! them strictly in arrival order. Sends are fire-and-forget; ownership
//! of a chunk transfers fully to the recipient on send.

use std::sync::Arc;

use crate::{chunk::Chunk, config::CaptureConfig, notify::Notification};

/// Inbound mailbox traffic of the writer stage.
pub enum WriterMessage {
    /// Session configuration, always the first message delivered
    Config(Arc<CaptureConfig>),
    /// One unit of captured data to persist
    Chunk(Chunk),
    /// A diagnostic from any producer, surfaced on the writer's sink
    Notify(Notification),
    /// Periodic queue-health self-check
    Tick,
}

/// Payload-free sentinel: the receptor (or writer, transitively) hit an
/// unrecoverable condition. Delivered to the scheduler at most once per
/// failing session.
pub struct FatalSignal;
