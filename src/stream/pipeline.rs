use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    ChunkPayload, ErrorCode, PipelineError, StreamCallbacks, StreamChunk, StreamController,
    StreamState,
};
use crate::analysis::{
    AnalysisDepth, AnalysisResult, Analyzer, Insight, KeywordAnalyzer, NarrativeAnalysis,
    ResultMetadata,
};
use crate::config::StreamConfig;
use crate::metrics::{Metrics, OP_STREAM};

const PROGRESS_EVERY: usize = 5;
const MODEL_NAME: &str = "streaming-pipeline";
const CANCELLED_MESSAGE: &str = "Stream was cancelled by user";

/// Split `text` into pieces of at most `chunk_size` bytes, breaking only between
/// whitespace and non-whitespace runs. A single run longer than `chunk_size`
/// becomes its own oversized piece. Concatenating the pieces yields `text`.
pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for token in runs(text) {
        if !current.is_empty() && current.len() + token.len() > chunk_size {
            pieces.push(std::mem::take(&mut current));
        }
        current.push_str(token);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Maximal runs of whitespace or non-whitespace characters.
fn runs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_ws = None;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        if prev_ws.is_some_and(|prev| prev != ws) {
            out.push(&text[start..i]);
            start = i;
        }
        prev_ws = Some(ws);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

struct Shared {
    state: Mutex<StreamState>,
    controller: Mutex<Option<StreamController>>,
}

/// Produces chunk sequences for analyses, one run at a time.
pub struct StreamingPipeline {
    config: StreamConfig,
    analyzer: Arc<dyn Analyzer>,
    callbacks: Mutex<StreamCallbacks>,
    shared: Arc<Shared>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for StreamingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingPipeline")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamingPipeline {
    pub fn new(config: StreamConfig) -> Self {
        Self::with_analyzer(config, Arc::new(KeywordAnalyzer::new()))
    }

    pub fn with_analyzer(config: StreamConfig, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            config,
            analyzer,
            callbacks: Mutex::new(StreamCallbacks::default()),
            shared: Arc::new(Shared {
                state: Mutex::new(StreamState::default()),
                controller: Mutex::new(None),
            }),
            metrics: None,
        }
    }

    /// Report chunk counts, run durations, errors and active runs to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Replace the observers used by subsequent runs.
    pub fn set_callbacks(&self, callbacks: StreamCallbacks) {
        *crate::lock(&self.callbacks) = callbacks;
    }

    /// Snapshot of the current or most recent run. `is_paused` follows the active
    /// run's controller and is `false` once no run is active.
    pub fn state(&self) -> StreamState {
        let mut state = crate::lock(&self.shared.state).clone();
        if let Some(controller) = crate::lock(&self.shared.controller).as_ref() {
            state.is_paused = controller.is_paused();
        }
        state
    }

    /// Controller of the active run, if any.
    pub fn controller(&self) -> Option<StreamController> {
        crate::lock(&self.shared.controller).clone()
    }

    /// Start a run over `text`. Nothing happens until the returned stream is
    /// polled, and dropping it releases the pipeline for another run.
    ///
    /// Passing a controller lets the caller pause or abort the run; otherwise one
    /// is created and reachable through [`controller`](Self::controller).
    pub fn stream_analysis(
        &self,
        text: &str,
        depth: AnalysisDepth,
        controller: Option<StreamController>,
    ) -> Result<BoxStream<'static, StreamChunk>, PipelineError> {
        let controller = controller.unwrap_or_default();
        {
            let mut state = crate::lock(&self.shared.state);
            if state.is_active {
                return Err(PipelineError::AlreadyActive);
            }
            *state = StreamState {
                is_active: true,
                start_time: Some(Utc::now()),
                ..StreamState::default()
            };
        }
        *crate::lock(&self.shared.controller) = Some(controller.clone());
        if let Some(metrics) = &self.metrics {
            metrics.stream_started();
        }

        let run = Run {
            stage: Stage::Start,
            request_id: format!("stream-{}", uuid::Uuid::now_v7()),
            depth,
            pieces: split_text(text, self.config.chunk_size),
            processed: String::with_capacity(text.len()),
            insights: None,
            narrative: None,
            summary: String::new(),
            started: Instant::now(),
            chunk_delay: Duration::from_millis(self.config.chunk_delay_ms),
            progress_updates: self.config.progress_updates,
            delay_pending: false,
            released: false,
            analyzer: Arc::clone(&self.analyzer),
            callbacks: crate::lock(&self.callbacks).clone(),
            controller,
            shared: Arc::clone(&self.shared),
            metrics: self.metrics.clone(),
        };

        Ok(stream::unfold(run, |mut run| async move {
            let chunk = run.advance().await?;
            Some((chunk, run))
        })
        .boxed())
    }

    /// Drive a run to its end and collect every chunk.
    pub async fn collect_chunks(
        &self,
        text: &str,
        depth: AnalysisDepth,
        controller: Option<StreamController>,
    ) -> Result<Vec<StreamChunk>, PipelineError> {
        Ok(self
            .stream_analysis(text, depth, controller)?
            .collect()
            .await)
    }

    /// Drive a run to its end and return the completed result. A run ending in an
    /// error chunk is reported as an error with the chunk's message.
    pub async fn get_response(&self, text: &str, depth: AnalysisDepth) -> Result<AnalysisResult> {
        let mut chunks = self.stream_analysis(text, depth, None)?;
        while let Some(chunk) = chunks.next().await {
            match chunk.payload {
                ChunkPayload::Complete { response, .. } => return Ok(*response),
                ChunkPayload::Error { code, message, .. } => bail!("{code}: {message}"),
                _ => {}
            }
        }
        Err(anyhow!("stream ended without a terminal chunk"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    Text(usize),
    TextProgress(usize),
    Insight(usize),
    Analysis,
    Narrative,
    Summary,
    Complete,
    Done,
}

/// State carried between polls of one run.
struct Run {
    stage: Stage,
    request_id: String,
    depth: AnalysisDepth,
    pieces: Vec<String>,
    processed: String,
    insights: Option<Vec<Insight>>,
    narrative: Option<NarrativeAnalysis>,
    summary: String,
    started: Instant,
    chunk_delay: Duration,
    progress_updates: bool,
    delay_pending: bool,
    released: bool,
    analyzer: Arc<dyn Analyzer>,
    callbacks: StreamCallbacks,
    controller: StreamController,
    shared: Arc<Shared>,
    metrics: Option<Arc<Metrics>>,
}

impl Run {
    async fn advance(&mut self) -> Option<StreamChunk> {
        if self.stage == Stage::Done {
            return None;
        }

        if self.stage != Stage::Start {
            if std::mem::take(&mut self.delay_pending) && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            self.controller.wait_if_paused().await;
            if self.controller.is_aborted() {
                crate::lock(&self.shared.state).is_cancelled = true;
                info!(request_id = %self.request_id, "stream cancelled");
                return Some(self.finish(ChunkPayload::Error {
                    code: ErrorCode::StreamCancelled,
                    message: CANCELLED_MESSAGE.into(),
                    recoverable: false,
                }));
            }
        }

        match self.step() {
            Ok(payload @ ChunkPayload::Complete { .. }) => Some(self.finish(payload)),
            Ok(payload) => Some(self.emit(payload)),
            Err(e) => {
                warn!(request_id = %self.request_id, error = %e, "stream failed");
                Some(self.finish(ChunkPayload::Error {
                    code: ErrorCode::StreamError,
                    message: e.to_string(),
                    recoverable: false,
                }))
            }
        }
    }

    /// Produce the payload for the current stage and move to the next one.
    fn step(&mut self) -> Result<ChunkPayload> {
        match self.stage {
            Stage::Start => {
                info!(
                    request_id = %self.request_id,
                    depth = %self.depth,
                    pieces = self.pieces.len(),
                    "stream started"
                );
                self.stage = self.after_text(0);
                Ok(ChunkPayload::Start {
                    request_id: self.request_id.clone(),
                    total_estimated_chunks: self.pieces.len() + 4,
                })
            }
            Stage::Text(i) => {
                let content = self.pieces[i].clone();
                let offset = self.processed.len();
                self.processed.push_str(&content);
                crate::lock(&self.shared.state).bytes_processed += content.len() as u64;

                let progress_due = self.progress_updates && i % PROGRESS_EVERY == 0;
                self.stage = if progress_due {
                    Stage::TextProgress(i)
                } else {
                    self.after_text(i + 1)
                };
                self.delay_pending = !progress_due;
                Ok(ChunkPayload::Text {
                    length: content.len(),
                    content,
                    offset,
                })
            }
            Stage::TextProgress(i) => {
                let total = self.pieces.len();
                self.stage = self.after_text(i + 1);
                self.delay_pending = true;
                Ok(ChunkPayload::Progress {
                    percent: ((i as f64 / total as f64) * 50.0).round() as u8,
                    stage: "processing".into(),
                    message: format!("Processing text chunk {}/{}", i + 1, total),
                })
            }
            Stage::Insight(i) => {
                if self.insights.is_none() {
                    let mut found = self.analyzer.detect_insights(&self.processed, self.depth)?;
                    found.truncate(self.depth.max_insights());
                    debug!(request_id = %self.request_id, count = found.len(), "insights detected");
                    self.insights = Some(found);
                }
                let insights = self.insights.as_deref().unwrap_or_default();
                match insights.get(i) {
                    Some(insight) => {
                        let insight = insight.clone();
                        self.stage = if i + 1 < insights.len() {
                            Stage::Insight(i + 1)
                        } else {
                            Stage::Analysis
                        };
                        self.delay_pending = true;
                        Ok(ChunkPayload::Insight { insight, index: i })
                    }
                    None => {
                        self.stage = Stage::Narrative;
                        Ok(analysis_progress())
                    }
                }
            }
            Stage::Analysis => {
                self.stage = Stage::Narrative;
                Ok(analysis_progress())
            }
            Stage::Narrative => {
                let narrative = self.analyzer.narrate(&self.processed)?;
                self.narrative = Some(narrative.clone());
                self.stage = Stage::Summary;
                Ok(ChunkPayload::Narrative { narrative })
            }
            Stage::Summary => {
                let insights = self.insights.as_deref().unwrap_or_default();
                self.summary = self.analyzer.summarize(insights)?;
                self.stage = Stage::Complete;
                Ok(ChunkPayload::Summary {
                    summary: self.summary.clone(),
                })
            }
            Stage::Complete => {
                let duration_ms = self.started.elapsed().as_millis() as u64;
                let response = AnalysisResult {
                    id: self.request_id.clone(),
                    text: self.processed.clone(),
                    insights: self.insights.take().unwrap_or_default(),
                    narrative: self.narrative.take(),
                    summary: std::mem::take(&mut self.summary),
                    recommendations: None,
                    metadata: ResultMetadata {
                        model: MODEL_NAME.into(),
                        tokens_used: self.processed.len() as u64,
                        processing_time_ms: duration_ms,
                        cached: false,
                        timestamp: Utc::now(),
                    },
                };
                self.stage = Stage::Done;
                Ok(ChunkPayload::Complete {
                    response: Box::new(response),
                    duration_ms,
                })
            }
            Stage::Done => Err(anyhow!("stream already finished")),
        }
    }

    fn after_text(&self, next: usize) -> Stage {
        if next < self.pieces.len() {
            Stage::Text(next)
        } else {
            Stage::Insight(0)
        }
    }

    /// Stamp and publish a chunk. Timestamps never go backwards within a run.
    fn emit(&mut self, payload: ChunkPayload) -> StreamChunk {
        let chunk = {
            let mut state = crate::lock(&self.shared.state);
            let now = Utc::now();
            let timestamp = state.last_chunk_time.map_or(now, |last| last.max(now));
            let sequence = state.chunks_emitted;
            state.chunks_emitted += 1;
            state.last_chunk_time = Some(timestamp);
            StreamChunk {
                sequence,
                timestamp,
                payload,
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_chunk(chunk.kind().as_str());
        }
        self.callbacks.notify(&chunk);
        chunk
    }

    /// Publish the terminal chunk and release the pipeline.
    fn finish(&mut self, payload: ChunkPayload) -> StreamChunk {
        let chunk = self.emit(payload);
        self.stage = Stage::Done;
        if let Some(metrics) = &self.metrics {
            match &chunk.payload {
                ChunkPayload::Complete { response, .. } => {
                    metrics.record_analysis(OP_STREAM, response, self.started.elapsed());
                }
                ChunkPayload::Error { code, .. } => metrics.record_error(code.as_str()),
                _ => {}
            }
        }
        self.release();
        info!(
            request_id = %self.request_id,
            kind = %chunk.kind(),
            chunks = chunk.sequence + 1,
            "stream finished"
        );
        chunk
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        {
            let mut state = crate::lock(&self.shared.state);
            state.is_active = false;
            state.is_paused = false;
        }
        *crate::lock(&self.shared.controller) = None;
        if let Some(metrics) = &self.metrics {
            metrics.stream_ended();
        }
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        if !self.released {
            debug!(request_id = %self.request_id, "stream dropped before completion");
            self.release();
        }
    }
}

fn analysis_progress() -> ChunkPayload {
    ChunkPayload::Progress {
        percent: 75,
        stage: "analysis".into(),
        message: "Generating narrative analysis".into(),
    }
}
