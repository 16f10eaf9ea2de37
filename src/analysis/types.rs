//! Analysis result type definitions.
//!
//! Defines [`AnalysisDepth`] (how much work an analysis does), [`Insight`] (one
//! detected emotion), [`NarrativeAnalysis`], and [`AnalysisResult`], the record that
//! the cache, context window, and streaming pipeline all exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How thorough an analysis should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    /// Fast pass, at most two insights.
    Quick,
    /// Default pass, at most three insights.
    #[default]
    Standard,
    /// Thorough pass, at most five insights.
    Deep,
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }

    /// Upper bound on the number of insights produced at this depth.
    pub fn max_insights(&self) -> usize {
        match self {
            Self::Quick => 2,
            Self::Standard => 3,
            Self::Deep => 5,
        }
    }
}

impl std::fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            "deep" => Ok(Self::Deep),
            _ => Err(format!("unknown analysis depth: {s}")),
        }
    }
}

/// One detected emotion for a span of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Emotion label, e.g. `"joy"`.
    pub emotion: String,
    /// Detection confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Words or phrases that triggered the detection.
    pub evidence: Vec<String>,
    /// How strongly the emotion is expressed, in `[0.0, 1.0]`.
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeStructure {
    pub introduction: String,
    pub development: Vec<String>,
    pub conclusion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeStyle {
    pub tone: String,
    pub complexity: String,
    pub readability_score: f64,
}

/// Structural and stylistic notes about a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeAnalysis {
    pub structure: NarrativeStructure,
    pub style: NarrativeStyle,
    pub themes: Vec<String>,
}

/// Bookkeeping attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Name of the analyzer that produced the result.
    pub model: String,
    /// Rough token estimate for the analyzed text.
    pub tokens_used: u64,
    /// Wall-clock time spent producing the result.
    pub processing_time_ms: u64,
    /// `true` when the result was served from a cache.
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

/// The output of one analysis. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    /// The analyzed source text.
    pub text: String,
    /// Detected emotions, strongest first as the analyzer ordered them.
    pub insights: Vec<Insight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativeAnalysis>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    pub metadata: ResultMetadata,
}
