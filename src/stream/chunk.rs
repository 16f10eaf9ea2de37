//! Typed increments emitted by a streaming run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResult, Insight, NarrativeAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Start,
    Text,
    Insight,
    Narrative,
    Summary,
    Progress,
    Complete,
    Error,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Text => "text",
            Self::Insight => "insight",
            Self::Narrative => "narrative",
            Self::Summary => "summary",
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended with an error chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The controller aborted the run.
    #[serde(rename = "STREAM_CANCELLED")]
    StreamCancelled,
    /// A stage failed.
    #[serde(rename = "STREAM_ERROR")]
    StreamError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamCancelled => "STREAM_CANCELLED",
            Self::StreamError => "STREAM_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkPayload {
    Start {
        request_id: String,
        total_estimated_chunks: usize,
    },
    Text {
        content: String,
        /// Byte offset of `content` within the input.
        offset: usize,
        length: usize,
    },
    Insight {
        insight: Insight,
        index: usize,
    },
    Narrative {
        narrative: NarrativeAnalysis,
    },
    Summary {
        summary: String,
    },
    Progress {
        percent: u8,
        stage: String,
        message: String,
    },
    Complete {
        response: Box<AnalysisResult>,
        duration_ms: u64,
    },
    Error {
        code: ErrorCode,
        message: String,
        recoverable: bool,
    },
}

impl ChunkPayload {
    pub fn kind(&self) -> ChunkKind {
        match self {
            Self::Start { .. } => ChunkKind::Start,
            Self::Text { .. } => ChunkKind::Text,
            Self::Insight { .. } => ChunkKind::Insight,
            Self::Narrative { .. } => ChunkKind::Narrative,
            Self::Summary { .. } => ChunkKind::Summary,
            Self::Progress { .. } => ChunkKind::Progress,
            Self::Complete { .. } => ChunkKind::Complete,
            Self::Error { .. } => ChunkKind::Error,
        }
    }
}

/// One increment of a run. `sequence` is the chunk's 0-based position in the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ChunkPayload,
}

impl StreamChunk {
    pub fn kind(&self) -> ChunkKind {
        self.payload.kind()
    }

    /// `true` for `complete` and `error`, the only chunks that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), ChunkKind::Complete | ChunkKind::Error)
    }
}
