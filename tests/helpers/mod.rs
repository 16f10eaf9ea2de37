#![allow(dead_code)]

use augur::analysis::{AnalysisResult, Insight, ResultMetadata};
use augur::config::{CacheConfig, ContextConfig, StreamConfig};
use chrono::{DateTime, Utc};

/// An insight with the given emotion and confidence.
pub fn insight(emotion: &str, confidence: f64) -> Insight {
    Insight {
        emotion: emotion.to_string(),
        confidence,
        evidence: vec![emotion.to_string()],
        intensity: 0.5,
    }
}

/// A result with fixed metadata, timestamped now.
pub fn result(id: &str, text: &str, emotions: &[(&str, f64)]) -> AnalysisResult {
    result_at(id, text, emotions, Utc::now())
}

/// A result timestamped at `timestamp`, for ordering-sensitive context tests.
pub fn result_at(
    id: &str,
    text: &str,
    emotions: &[(&str, f64)],
    timestamp: DateTime<Utc>,
) -> AnalysisResult {
    AnalysisResult {
        id: id.to_string(),
        text: text.to_string(),
        insights: emotions.iter().map(|(e, c)| insight(e, *c)).collect(),
        narrative: None,
        summary: format!("summary of {id}"),
        recommendations: None,
        metadata: ResultMetadata {
            model: "test".into(),
            tokens_used: 0,
            processing_time_ms: 0,
            cached: false,
            timestamp,
        },
    }
}

/// Cache config with generous bounds and a one-hour TTL.
pub fn cache_config() -> CacheConfig {
    CacheConfig {
        max_size_bytes: 10 * 1024 * 1024,
        max_entries: 100,
        default_ttl_secs: 3600,
        lru: true,
    }
}

/// Context config with background decay off.
pub fn context_config(max_entries: usize) -> ContextConfig {
    ContextConfig {
        max_entries,
        decay_rate: 0.1,
        min_weight: 0.01,
        auto_decay: false,
        decay_interval_ms: 60_000,
    }
}

/// Stream config without inter-chunk delay.
pub fn stream_config(chunk_size: usize) -> StreamConfig {
    StreamConfig {
        chunk_size,
        chunk_delay_ms: 0,
        progress_updates: true,
    }
}
