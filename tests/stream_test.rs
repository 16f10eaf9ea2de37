mod helpers;

use augur::analysis::AnalysisDepth;
use augur::stream::{
    ChunkKind, ChunkPayload, ErrorCode, PipelineError, StreamChunk, StreamController,
    StreamingPipeline,
};
use futures::StreamExt;
use helpers::stream_config;
use std::time::Duration;

const STORY: &str = "We began the journey with hope. The forest was dark and we were afraid. \
    Then the sun rose and we were happy, full of joy and wonder. \
    Perhaps we had been lost all along, but the trust we shared carried us home.";

fn kinds(chunks: &[StreamChunk]) -> Vec<ChunkKind> {
    chunks.iter().map(StreamChunk::kind).collect()
}

#[tokio::test]
async fn run_emits_ordered_stages() {
    let pipeline = StreamingPipeline::new(stream_config(40));
    let chunks = pipeline
        .collect_chunks(STORY, AnalysisDepth::Standard, None)
        .await
        .unwrap();

    assert_eq!(chunks.first().unwrap().kind(), ChunkKind::Start);
    assert_eq!(chunks.last().unwrap().kind(), ChunkKind::Complete);
    assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence, i as u64, "sequence must match position");
    }

    // stages never go backwards
    let rank = |kind: ChunkKind| match kind {
        ChunkKind::Start => 0,
        ChunkKind::Text => 1,
        ChunkKind::Insight => 2,
        ChunkKind::Narrative => 3,
        ChunkKind::Summary => 4,
        ChunkKind::Complete | ChunkKind::Error => 5,
        ChunkKind::Progress => -1,
    };
    let ranks: Vec<i32> = kinds(&chunks).into_iter().map(rank).filter(|r| *r >= 0).collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "out of order: {ranks:?}");

    let insights = chunks.iter().filter(|c| c.kind() == ChunkKind::Insight).count();
    assert!(insights >= 1 && insights <= AnalysisDepth::Standard.max_insights());

    let state = pipeline.state();
    assert!(!state.is_active);
    assert!(!state.is_cancelled);
    assert_eq!(state.chunks_emitted, chunks.len() as u64);
    assert_eq!(state.bytes_processed, STORY.len() as u64);
    assert!(state.start_time.unwrap() <= state.last_chunk_time.unwrap());
}

#[tokio::test]
async fn start_estimates_chunk_count() {
    let pipeline = StreamingPipeline::new(stream_config(40));
    let chunks = pipeline
        .collect_chunks(STORY, AnalysisDepth::Quick, None)
        .await
        .unwrap();

    let texts = chunks.iter().filter(|c| c.kind() == ChunkKind::Text).count();
    match &chunks[0].payload {
        ChunkPayload::Start {
            total_estimated_chunks,
            ..
        } => assert_eq!(*total_estimated_chunks, texts + 4),
        other => panic!("expected start, got {other:?}"),
    }
}

#[tokio::test]
async fn complete_response_matches_streamed_pieces() {
    let pipeline = StreamingPipeline::new(stream_config(25));
    let chunks = pipeline
        .collect_chunks(STORY, AnalysisDepth::Deep, None)
        .await
        .unwrap();

    let streamed_insights: Vec<_> = chunks
        .iter()
        .filter_map(|c| match &c.payload {
            ChunkPayload::Insight { insight, .. } => Some(insight.clone()),
            _ => None,
        })
        .collect();
    let streamed_summary = chunks.iter().find_map(|c| match &c.payload {
        ChunkPayload::Summary { summary } => Some(summary.clone()),
        _ => None,
    });

    match &chunks.last().unwrap().payload {
        ChunkPayload::Complete { response, .. } => {
            assert_eq!(response.text, STORY);
            assert_eq!(response.insights, streamed_insights);
            assert_eq!(Some(response.summary.clone()), streamed_summary);
            assert!(response.narrative.is_some());
            assert!(response.id.starts_with("stream-"));
        }
        other => panic!("expected complete, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_text_still_completes() {
    let pipeline = StreamingPipeline::new(stream_config(10));
    let chunks = pipeline
        .collect_chunks("", AnalysisDepth::Quick, None)
        .await
        .unwrap();

    assert!(!chunks.iter().any(|c| c.kind() == ChunkKind::Text));
    assert_eq!(chunks.last().unwrap().kind(), ChunkKind::Complete);
}

#[tokio::test]
async fn abort_mid_text_ends_with_cancelled_error() {
    let pipeline = StreamingPipeline::new(stream_config(10));
    let controller = StreamController::new();
    let mut stream = pipeline
        .stream_analysis(STORY, AnalysisDepth::Standard, Some(controller.clone()))
        .unwrap();

    let mut seen = Vec::new();
    while let Some(chunk) = stream.next().await {
        if chunk.kind() == ChunkKind::Text && !controller.is_aborted() {
            controller.abort();
        }
        seen.push(chunk);
    }

    let last = seen.last().unwrap();
    match &last.payload {
        ChunkPayload::Error {
            code, recoverable, ..
        } => {
            assert_eq!(*code, ErrorCode::StreamCancelled);
            assert!(!recoverable);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(seen.iter().filter(|c| c.is_terminal()).count(), 1);
    assert!(!seen.iter().any(|c| c.kind() == ChunkKind::Insight));
    assert!(pipeline.state().is_cancelled);
}

#[tokio::test]
async fn pause_and_resume_through_pipeline_controller() {
    let mut config = stream_config(40);
    config.chunk_delay_ms = 1;
    let pipeline = StreamingPipeline::new(config);
    let mut stream = pipeline
        .stream_analysis(STORY, AnalysisDepth::Quick, None)
        .unwrap();

    stream.next().await.unwrap();
    let controller = pipeline.controller().expect("active run has a controller");
    controller.pause();

    let emitted = pipeline.state().chunks_emitted;
    let held = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(held.is_err());
    assert_eq!(pipeline.state().chunks_emitted, emitted);

    controller.resume();
    let rest: Vec<StreamChunk> = stream.collect().await;
    assert_eq!(rest.last().unwrap().kind(), ChunkKind::Complete);
    assert!(pipeline.controller().is_none());
}

#[tokio::test]
async fn second_run_rejected_while_first_active() {
    let pipeline = StreamingPipeline::new(stream_config(40));
    let mut first = pipeline
        .stream_analysis(STORY, AnalysisDepth::Quick, None)
        .unwrap();
    first.next().await.unwrap();

    let err = pipeline
        .stream_analysis("other", AnalysisDepth::Quick, None)
        .err()
        .unwrap();
    assert_eq!(err, PipelineError::AlreadyActive);
    assert!(pipeline.get_response("other", AnalysisDepth::Quick).await.is_err());

    while first.next().await.is_some() {}
    let second = pipeline
        .get_response("a happy ending", AnalysisDepth::Quick)
        .await
        .unwrap();
    assert_eq!(second.text, "a happy ending");
}

#[tokio::test]
async fn identical_inputs_give_identical_kind_sequences() {
    let pipeline = StreamingPipeline::new(stream_config(30));
    let first = pipeline
        .collect_chunks(STORY, AnalysisDepth::Deep, None)
        .await
        .unwrap();
    let second = pipeline
        .collect_chunks(STORY, AnalysisDepth::Deep, None)
        .await
        .unwrap();

    assert_eq!(kinds(&first), kinds(&second));
    assert_ne!(
        match &first[0].payload {
            ChunkPayload::Start { request_id, .. } => request_id.clone(),
            _ => unreachable!(),
        },
        match &second[0].payload {
            ChunkPayload::Start { request_id, .. } => request_id.clone(),
            _ => unreachable!(),
        }
    );
}
