//! Keyword heuristics for emotion, tone, and theme detection.

use anyhow::Result;

use super::types::{AnalysisDepth, Insight, NarrativeAnalysis, NarrativeStructure, NarrativeStyle};
use super::Analyzer;

const EMOTION_KEYWORDS: &[(&str, &[&str])] = &[
    ("joy", &["happy", "joy", "wonderful", "great", "amazing", "love", "beautiful"]),
    ("sadness", &["sad", "unhappy", "depressed", "grief", "sorrow", "cry", "tears"]),
    ("anger", &["angry", "furious", "rage", "hate", "frustrated", "annoyed"]),
    ("fear", &["afraid", "scared", "terrified", "anxious", "worried", "nervous"]),
    ("surprise", &["surprised", "shocked", "amazed", "unexpected", "astonished"]),
    ("trust", &["trust", "believe", "faith", "confident", "reliable", "honest"]),
    ("anticipation", &["expect", "hope", "wait", "looking forward", "anticipate"]),
    ("disgust", &["disgusted", "revolted", "sick", "repulsed", "awful"]),
];

const THEME_KEYWORDS: &[(&str, &[&str])] = &[
    ("love", &["love", "heart", "romance", "passion"]),
    ("adventure", &["journey", "quest", "adventure", "explore"]),
    ("conflict", &["fight", "battle", "war", "struggle"]),
    ("growth", &["learn", "grow", "change", "develop"]),
    ("nature", &["forest", "ocean", "mountain", "nature"]),
];

/// Texts longer than this many words are reported as `complex`.
const COMPLEX_WORD_COUNT: usize = 100;

/// Heuristic analyzer: substring matches against fixed keyword tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for KeywordAnalyzer {
    fn detect_insights(&self, text: &str, depth: AnalysisDepth) -> Result<Vec<Insight>> {
        let lower = text.to_lowercase();
        let mut insights: Vec<Insight> = EMOTION_KEYWORDS
            .iter()
            .filter_map(|(emotion, keywords)| {
                let matches: Vec<&str> = keywords
                    .iter()
                    .copied()
                    .filter(|kw| lower.contains(kw))
                    .collect();
                if matches.is_empty() {
                    return None;
                }
                let n = matches.len() as f64;
                Some(Insight {
                    emotion: emotion.to_string(),
                    confidence: (0.5 + n * 0.15).min(0.95),
                    evidence: matches.iter().take(3).map(|m| m.to_string()).collect(),
                    intensity: (0.4 + n * 0.1).min(0.9),
                })
            })
            .collect();

        if insights.is_empty() {
            insights.push(Insight {
                emotion: "neutral".into(),
                confidence: 0.7,
                evidence: vec![format!("{} words analyzed", text.split_whitespace().count())],
                intensity: 0.3,
            });
        }

        insights.truncate(depth.max_insights());
        Ok(insights)
    }

    fn narrate(&self, text: &str) -> Result<NarrativeAnalysis> {
        let sentences: Vec<&str> = text
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let word_count = text.split_whitespace().count();

        let introduction = sentences.first().map(|s| s.to_string()).unwrap_or_default();
        let conclusion = if sentences.len() > 1 {
            sentences[sentences.len() - 1].to_string()
        } else {
            String::new()
        };
        let development = if sentences.len() > 2 {
            sentences[1..sentences.len() - 1]
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            Vec::new()
        };

        let complexity = if word_count > COMPLEX_WORD_COUNT { "complex" } else { "simple" };

        Ok(NarrativeAnalysis {
            structure: NarrativeStructure {
                introduction,
                development,
                conclusion,
            },
            style: NarrativeStyle {
                tone: detect_tone(text).to_string(),
                complexity: complexity.to_string(),
                readability_score: (100.0 - word_count as f64 / 10.0).clamp(0.0, 100.0),
            },
            themes: extract_themes(text),
        })
    }

    fn summarize(&self, insights: &[Insight]) -> Result<String> {
        if insights.is_empty() {
            return Ok("No significant emotional patterns detected.".into());
        }

        let emotions = insights
            .iter()
            .map(|i| i.emotion.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let avg_confidence =
            insights.iter().map(|i| i.confidence).sum::<f64>() / insights.len() as f64;

        Ok(format!(
            "Analysis detected {} emotional pattern(s): {emotions}. Average confidence: {:.1}%.",
            insights.len(),
            avg_confidence * 100.0
        ))
    }
}

fn detect_tone(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has_any(&["!", "amazing", "great"]) {
        "enthusiastic"
    } else if has_any(&["must", "should", "important"]) {
        "authoritative"
    } else if has_any(&["perhaps", "maybe", "might"]) {
        "tentative"
    } else {
        "neutral"
    }
}

fn extract_themes(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let themes: Vec<String> = THEME_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(theme, _)| theme.to_string())
        .collect();

    if themes.is_empty() {
        vec!["general".into()]
    } else {
        themes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_joy() {
        let insights = KeywordAnalyzer
            .detect_insights("The happy fox jumped with joy.", AnalysisDepth::Quick)
            .unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].emotion, "joy");
        // two matches: happy, joy
        assert!((insights[0].confidence - 0.8).abs() < 1e-9);
        assert!((insights[0].intensity - 0.6).abs() < 1e-9);
        assert_eq!(insights[0].evidence, vec!["happy", "joy"]);
    }

    #[test]
    fn test_neutral_fallback() {
        let insights = KeywordAnalyzer
            .detect_insights("The table has four legs", AnalysisDepth::Standard)
            .unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].emotion, "neutral");
        assert_eq!(insights[0].evidence, vec!["5 words analyzed"]);

        // whitespace-only input counts no words
        let blank = KeywordAnalyzer
            .detect_insights("   ", AnalysisDepth::Quick)
            .unwrap();
        assert_eq!(blank[0].evidence, vec!["0 words analyzed"]);
    }

    #[test]
    fn test_depth_truncates() {
        let text = "I was happy, then sad, then angry and afraid, surprised and full of trust.";
        let quick = KeywordAnalyzer.detect_insights(text, AnalysisDepth::Quick).unwrap();
        let deep = KeywordAnalyzer.detect_insights(text, AnalysisDepth::Deep).unwrap();
        assert_eq!(quick.len(), 2);
        assert_eq!(deep.len(), 5);
    }

    #[test]
    fn test_confidence_caps() {
        let text = "happy joy wonderful great amazing love beautiful";
        let insights = KeywordAnalyzer.detect_insights(text, AnalysisDepth::Quick).unwrap();
        assert_eq!(insights[0].confidence, 0.95);
        assert_eq!(insights[0].intensity, 0.9);
        assert_eq!(insights[0].evidence.len(), 3);
    }

    #[test]
    fn test_narrative_structure() {
        let narrative = KeywordAnalyzer
            .narrate("We began the journey. The forest was dark. Perhaps we were lost.")
            .unwrap();
        assert_eq!(narrative.structure.introduction, "We began the journey");
        assert_eq!(narrative.structure.development, vec!["The forest was dark"]);
        assert_eq!(narrative.structure.conclusion, "Perhaps we were lost");
        assert_eq!(narrative.style.tone, "tentative");
        assert_eq!(narrative.style.complexity, "simple");
        assert_eq!(narrative.themes, vec!["adventure", "nature"]);
    }

    #[test]
    fn test_narrative_of_empty_text() {
        let narrative = KeywordAnalyzer.narrate("").unwrap();
        assert!(narrative.structure.introduction.is_empty());
        assert!(narrative.structure.conclusion.is_empty());
        assert_eq!(narrative.style.readability_score, 100.0);
        assert_eq!(narrative.themes, vec!["general"]);
    }

    #[test]
    fn test_summary_wording() {
        let insights = KeywordAnalyzer
            .detect_insights("The happy fox jumped with joy.", AnalysisDepth::Quick)
            .unwrap();
        let summary = KeywordAnalyzer.summarize(&insights).unwrap();
        assert_eq!(
            summary,
            "Analysis detected 1 emotional pattern(s): joy. Average confidence: 80.0%."
        );
        assert_eq!(
            KeywordAnalyzer.summarize(&[]).unwrap(),
            "No significant emotional patterns detected."
        );
    }
}
