use anyhow::{bail, Result};
use augur::analysis::AnalysisDepth;
use augur::config::AugurConfig;
use augur::stream::{ChunkPayload, StreamChunk, StreamingPipeline};
use futures::StreamExt;

/// Stream one analysis to stdout, one line per chunk.
pub async fn stream(config: &AugurConfig, text: &str, depth: AnalysisDepth, json: bool) -> Result<()> {
    let pipeline = StreamingPipeline::new(config.stream.clone());
    let mut chunks = pipeline.stream_analysis(text, depth, None)?;

    let mut failure = None;
    while let Some(chunk) = chunks.next().await {
        if json {
            println!("{}", serde_json::to_string(&chunk)?);
        } else {
            println!("{}", describe(&chunk));
        }
        if let ChunkPayload::Error { code, message, .. } = &chunk.payload {
            failure = Some(format!("{code}: {message}"));
        }
    }

    if let Some(failure) = failure {
        bail!(failure);
    }
    Ok(())
}

fn describe(chunk: &StreamChunk) -> String {
    let body = match &chunk.payload {
        ChunkPayload::Start {
            request_id,
            total_estimated_chunks,
        } => format!("{request_id} (~{total_estimated_chunks} chunks)"),
        ChunkPayload::Text { content, offset, .. } => format!("@{offset} {content:?}"),
        ChunkPayload::Insight { insight, index } => format!(
            "#{index} {} (confidence: {:.2}, evidence: {})",
            insight.emotion,
            insight.confidence,
            insight.evidence.join(", ")
        ),
        ChunkPayload::Narrative { narrative } => format!(
            "tone: {}, complexity: {}, themes: {}",
            narrative.style.tone,
            narrative.style.complexity,
            narrative.themes.join(", ")
        ),
        ChunkPayload::Summary { summary } => summary.clone(),
        ChunkPayload::Progress {
            percent, message, ..
        } => format!("{percent:>3}% {message}"),
        ChunkPayload::Complete { duration_ms, .. } => format!("done in {duration_ms}ms"),
        ChunkPayload::Error { code, message, .. } => format!("{code}: {message}"),
    };
    format!("{:>3} {:<9} {body}", chunk.sequence, chunk.kind().as_str())
}
