//! Emotional profile computations over context entries: dominance ranking, trend
//! extraction, and pairwise comparison.
//!
//! Every function here takes entries already in insertion order and is pure, so the
//! window can call them under its lock and tests can call them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ContextEntry;

/// Half-to-half mean difference needed to call a trend.
const TREND_DETECTION_THRESHOLD: f64 = 0.1;

/// Per-emotion confidence difference above which an emotion is divergent.
const EMOTION_DIVERGENCE_THRESHOLD: f64 = 0.2;

const HIGH_SIMILARITY_THRESHOLD: f64 = 0.8;
const MODERATE_SIMILARITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Weighted confidence samples for one emotion, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionTrend {
    pub emotion: String,
    /// `confidence × weight` per occurrence.
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub trend: Trend,
    pub average: f64,
    /// Population variance of `values`.
    pub variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergentEmotion {
    pub emotion: String,
    pub diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// `1 − distance / |union of emotions|`, in `[0, 1]`.
    pub similarity: f64,
    pub shared_emotions: Vec<String>,
    /// Sorted by `diff`, largest first.
    pub divergent_emotions: Vec<DivergentEmotion>,
    /// Sum of absolute confidence differences over the emotion union.
    pub emotional_distance: f64,
    pub narrative: String,
}

/// Rank emotions by `Σ confidence × weight`, highest first. Ties keep first-seen
/// order.
pub fn dominant_emotions(entries: &[&ContextEntry], limit: usize) -> Vec<String> {
    let mut scores: Vec<(String, f64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        for insight in &entry.insights {
            let score = insight.confidence * entry.weight;
            match index.get(&insight.emotion) {
                Some(&i) => scores[i].1 += score,
                None => {
                    index.insert(insight.emotion.clone(), scores.len());
                    scores.push((insight.emotion.clone(), score));
                }
            }
        }
    }

    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores.into_iter().take(limit).map(|(emotion, _)| emotion).collect()
}

/// Per-emotion trend lines, sorted by average (highest first).
pub fn emotion_trends(entries: &[&ContextEntry]) -> Vec<EmotionTrend> {
    let mut chronological: Vec<&ContextEntry> = entries.to_vec();
    // stable sort keeps insertion order for equal timestamps
    chronological.sort_by_key(|entry| entry.timestamp);

    let mut samples: Vec<(String, Vec<f64>, Vec<DateTime<Utc>>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for entry in chronological {
        for insight in &entry.insights {
            let i = *index.entry(insight.emotion.clone()).or_insert_with(|| {
                samples.push((insight.emotion.clone(), Vec::new(), Vec::new()));
                samples.len() - 1
            });
            samples[i].1.push(insight.confidence * entry.weight);
            samples[i].2.push(entry.timestamp);
        }
    }

    let mut trends: Vec<EmotionTrend> = samples
        .into_iter()
        .map(|(emotion, values, timestamps)| {
            let (trend, average, variance) = classify(&values);
            EmotionTrend {
                emotion,
                values,
                timestamps,
                trend,
                average,
                variance,
            }
        })
        .collect();

    trends.sort_by(|a, b| b.average.total_cmp(&a.average));
    trends
}

/// Returns `(trend, mean, variance)` for a chronological sample list.
fn classify(values: &[f64]) -> (Trend, f64, f64) {
    if values.len() < 2 {
        return (Trend::Stable, values.first().copied().unwrap_or(0.0), 0.0);
    }

    let average = mean(values);
    let variance =
        values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / values.len() as f64;

    let mid = values.len() / 2;
    let diff = mean(&values[mid..]) - mean(&values[..mid]);
    let trend = if diff > TREND_DETECTION_THRESHOLD {
        Trend::Increasing
    } else if diff < -TREND_DETECTION_THRESHOLD {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    (trend, average, variance)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Emotion → confidence for one entry. A repeated emotion keeps its first position
/// and its last confidence.
fn confidence_profile(entry: &ContextEntry) -> Vec<(&str, f64)> {
    let mut profile: Vec<(&str, f64)> = Vec::new();
    for insight in &entry.insights {
        match profile.iter_mut().find(|(e, _)| *e == insight.emotion) {
            Some(slot) => slot.1 = insight.confidence,
            None => profile.push((insight.emotion.as_str(), insight.confidence)),
        }
    }
    profile
}

/// Confidence for `emotion`, zero when absent.
fn confidence_of(profile: &[(&str, f64)], emotion: &str) -> f64 {
    profile
        .iter()
        .find(|(e, _)| *e == emotion)
        .map(|(_, c)| *c)
        .unwrap_or(0.0)
}

/// Compare the emotional profiles of two entries.
pub fn compare_entries(a: &ContextEntry, b: &ContextEntry) -> ComparisonResult {
    let left = confidence_profile(a);
    let right = confidence_profile(b);

    let mut union: Vec<&str> = left.iter().map(|(e, _)| *e).collect();
    for (emotion, _) in &right {
        if !union.contains(emotion) {
            union.push(*emotion);
        }
    }

    let mut shared_emotions = Vec::new();
    let mut divergent_emotions = Vec::new();
    let mut distance = 0.0;

    for &emotion in &union {
        let v1 = confidence_of(&left, emotion);
        let v2 = confidence_of(&right, emotion);

        if v1 > 0.0 && v2 > 0.0 {
            shared_emotions.push(emotion.to_string());
        }

        let diff = (v1 - v2).abs();
        distance += diff;
        if diff > EMOTION_DIVERGENCE_THRESHOLD {
            divergent_emotions.push(DivergentEmotion {
                emotion: emotion.to_string(),
                diff,
            });
        }
    }

    let similarity = if union.is_empty() {
        1.0
    } else {
        (1.0 - distance / union.len() as f64).clamp(0.0, 1.0)
    };

    divergent_emotions.sort_by(|x, y| y.diff.total_cmp(&x.diff));

    let narrative = if similarity > HIGH_SIMILARITY_THRESHOLD {
        format!(
            "Very similar emotional profiles with {} shared emotions.",
            shared_emotions.len()
        )
    } else if similarity > MODERATE_SIMILARITY_THRESHOLD {
        let names = divergent_emotions
            .iter()
            .map(|d| d.emotion.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("Moderate similarity. Key differences in: {names}.")
    } else {
        format!(
            "Significantly different emotional profiles. Major divergence in {} emotions.",
            divergent_emotions.len()
        )
    };

    ComparisonResult {
        similarity,
        shared_emotions,
        divergent_emotions,
        emotional_distance: distance,
        narrative,
    }
}

/// Most frequent tags, highest count first, ties in first-seen order.
pub fn top_tags(entries: &[&ContextEntry], limit: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for entry in entries {
        for tag in &entry.tags {
            match counts.iter_mut().find(|(t, _)| t == tag) {
                Some(slot) => slot.1 += 1,
                None => counts.push((tag.clone(), 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(limit).map(|(tag, _)| tag).collect()
}
