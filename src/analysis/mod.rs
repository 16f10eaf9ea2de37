//! Text analysis boundary.
//!
//! Provides the [`Analyzer`] trait, the seam between raw text and the
//! [`AnalysisResult`] records consumed by the cache, context window, and streaming
//! pipeline, plus [`KeywordAnalyzer`], a heuristic implementation used by default.

pub mod keyword;
pub mod types;

use anyhow::Result;
use std::time::Instant;

pub use keyword::KeywordAnalyzer;
pub use types::{
    AnalysisDepth, AnalysisResult, Insight, NarrativeAnalysis, NarrativeStructure,
    NarrativeStyle, ResultMetadata,
};

/// Trait for turning text into analysis results.
///
/// Each stage is separately callable so incremental producers (the streaming
/// pipeline) can run them one at a time. All methods are synchronous.
pub trait Analyzer: Send + Sync {
    /// Detect emotions in `text`. Implementations return at most
    /// `depth.max_insights()` entries.
    fn detect_insights(&self, text: &str, depth: AnalysisDepth) -> Result<Vec<Insight>>;

    /// Produce structural and stylistic notes about `text`.
    fn narrate(&self, text: &str) -> Result<NarrativeAnalysis>;

    /// Summarize a set of insights in one sentence or two.
    fn summarize(&self, insights: &[Insight]) -> Result<String>;

    /// Name recorded in [`ResultMetadata::model`].
    fn model_name(&self) -> &str {
        "keyword-analyzer"
    }

    /// Run every stage and assemble a complete result.
    fn analyze(&self, text: &str, depth: AnalysisDepth) -> Result<AnalysisResult> {
        let started = Instant::now();
        let insights = self.detect_insights(text, depth)?;
        let narrative = self.narrate(text)?;
        let summary = self.summarize(&insights)?;

        Ok(AnalysisResult {
            id: uuid::Uuid::now_v7().to_string(),
            text: text.to_string(),
            insights,
            narrative: Some(narrative),
            summary,
            recommendations: None,
            metadata: ResultMetadata {
                model: self.model_name().to_string(),
                tokens_used: estimate_tokens(text),
                processing_time_ms: started.elapsed().as_millis() as u64,
                cached: false,
                timestamp: chrono::Utc::now(),
            },
        })
    }
}

/// Rough token count: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(4) as u64
}
