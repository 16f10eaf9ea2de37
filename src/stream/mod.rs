//! Incremental delivery of one analysis as an ordered sequence of typed chunks.
//!
//! A run goes through fixed stages:
//!
//! 1. `start`
//! 2. `text` chunks of the input, with a `progress` chunk after every fifth one
//! 3. up to `depth.max_insights()` `insight` chunks, then a `progress` chunk at 75%
//! 4. `narrative`, then `summary`
//! 5. `complete` carrying the assembled result
//!
//! Cancellation and stage failures arrive in-band as a single terminal `error` chunk.
//! Every run emits exactly one terminal chunk, and nothing follows it.

mod chunk;
mod controller;
mod pipeline;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub use chunk::{ChunkKind, ChunkPayload, ErrorCode, StreamChunk};
pub use controller::StreamController;
pub use pipeline::{split_text, StreamingPipeline};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("a stream is already active on this pipeline")]
    AlreadyActive,
}

/// Snapshot of the pipeline's current or most recent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamState {
    pub is_active: bool,
    pub is_paused: bool,
    pub is_cancelled: bool,
    pub chunks_emitted: u64,
    /// Bytes of input text emitted so far.
    pub bytes_processed: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub last_chunk_time: Option<DateTime<Utc>>,
}

pub type ChunkCallback = Arc<dyn Fn(&StreamChunk) + Send + Sync>;

/// Observers notified synchronously as chunks are emitted.
///
/// `on_chunk` sees every chunk. The kind-specific hooks fire after it for
/// `start`, `progress`, `complete`, and `error` chunks.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    pub on_start: Option<ChunkCallback>,
    pub on_chunk: Option<ChunkCallback>,
    pub on_progress: Option<ChunkCallback>,
    pub on_complete: Option<ChunkCallback>,
    pub on_error: Option<ChunkCallback>,
}

impl StreamCallbacks {
    pub(crate) fn notify(&self, chunk: &StreamChunk) {
        if let Some(on_chunk) = &self.on_chunk {
            on_chunk(chunk);
        }
        let specific = match chunk.kind() {
            ChunkKind::Start => &self.on_start,
            ChunkKind::Progress => &self.on_progress,
            ChunkKind::Complete => &self.on_complete,
            ChunkKind::Error => &self.on_error,
            _ => return,
        };
        if let Some(callback) = specific {
            callback(chunk);
        }
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_chunk", &self.on_chunk.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
