//! Context window: a decaying, weighted memory of recent analysis results.
//!
//! Each entry starts at weight 1.0. [`ContextWindow::apply_decay`] multiplies every
//! weight by `1 − decay_rate` and drops entries that fall below `min_weight`; an
//! optional background task runs the same cycle on a timer. When the window is full,
//! adding an entry evicts the lowest-weight one.

mod decay;
pub mod profile;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::analysis::{AnalysisResult, Insight};
use crate::config::ContextConfig;
use decay::DecayTask;

pub use profile::{ComparisonResult, DivergentEmotion, EmotionTrend, Trend};

/// Number of emotions and tags reported by [`ContextWindow::summary`].
const SUMMARY_TOP_N: usize = 5;

/// One remembered analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub text: String,
    pub insights: Vec<Insight>,
    pub timestamp: DateTime<Utc>,
    /// Relevance in `[0, 1]`; decays over time, raised by boosts.
    pub weight: f64,
    /// Distinct labels in the order they were first given.
    pub tags: Vec<String>,
    #[serde(skip)]
    seq: u64,
}

impl ContextEntry {
    pub fn new(
        id: String,
        text: String,
        insights: Vec<Insight>,
        timestamp: DateTime<Utc>,
        weight: f64,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id,
            text,
            insights,
            timestamp,
            weight: weight.clamp(0.0, 1.0),
            tags: dedup_tags(tags),
            seq: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timespan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub entry_count: usize,
    pub total_weight: f64,
    pub dominant_emotions: Vec<String>,
    pub trends: Vec<EmotionTrend>,
    /// Most frequent tags.
    pub themes: Vec<String>,
    /// `None` when the window is empty.
    pub timespan: Option<Timespan>,
}

/// Lock-protected window contents, shared with the decay task.
pub(crate) struct ContextState {
    config: ContextConfig,
    entries: HashMap<String, ContextEntry>,
    next_seq: u64,
}

impl ContextState {
    fn new(config: ContextConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in insertion order.
    fn ordered(&self) -> Vec<&ContextEntry> {
        let mut entries: Vec<&ContextEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }

    fn insert(&mut self, mut entry: ContextEntry) {
        self.next_seq += 1;
        entry.seq = self.next_seq;
        self.entries.insert(entry.id.clone(), entry);
    }

    /// The only path by which weights decrease.
    pub(crate) fn apply_decay(&mut self) -> usize {
        let factor = 1.0 - self.config.decay_rate;
        let min_weight = self.config.min_weight;
        for entry in self.entries.values_mut() {
            entry.weight *= factor;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.weight >= min_weight);
        before - self.entries.len()
    }

    /// Evict the lowest-weight entry, oldest first on ties.
    fn remove_lowest_weight(&mut self) -> bool {
        let victim = self
            .entries
            .values()
            .min_by(|a, b| a.weight.total_cmp(&b.weight).then(a.seq.cmp(&b.seq)))
            .map(|entry| entry.id.clone());

        match victim {
            Some(id) => {
                self.entries.remove(&id);
                debug!(id = %id, "evicted lowest-weight context entry");
                true
            }
            None => false,
        }
    }

    fn trim_to(&mut self, limit: usize) {
        while self.entries.len() > limit && self.remove_lowest_weight() {}
    }
}

pub struct ContextWindow {
    state: Arc<Mutex<ContextState>>,
    decay_task: Mutex<Option<DecayTask>>,
}

impl ContextWindow {
    /// Create a window. With `auto_decay` set, the background decay task starts on
    /// the current tokio runtime.
    pub fn new(config: ContextConfig) -> Self {
        let auto_decay = config.auto_decay;
        let window = Self {
            state: Arc::new(Mutex::new(ContextState::new(config))),
            decay_task: Mutex::new(None),
        };
        if auto_decay {
            window.start_decay_task();
        }
        window
    }

    pub fn config(&self) -> ContextConfig {
        crate::lock(&self.state).config.clone()
    }

    /// Remember `result` under its id. Returns the id.
    pub fn add_entry<I, S>(&self, result: &AnalysisResult, tags: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = crate::lock(&self.state);
        if !state.entries.contains_key(&result.id) {
            let limit = state.config.max_entries.saturating_sub(1);
            state.trim_to(limit);
        }

        let entry = ContextEntry::new(
            result.id.clone(),
            result.text.clone(),
            result.insights.clone(),
            result.metadata.timestamp,
            1.0,
            tags.into_iter().map(Into::into).collect(),
        );
        state.insert(entry);
        result.id.clone()
    }

    pub fn get_entry(&self, id: &str) -> Option<ContextEntry> {
        crate::lock(&self.state).entries.get(id).cloned()
    }

    pub fn remove_entry(&self, id: &str) -> bool {
        crate::lock(&self.state).entries.remove(id).is_some()
    }

    /// All entries in insertion order.
    pub fn all_entries(&self) -> Vec<ContextEntry> {
        crate::lock(&self.state).ordered().into_iter().cloned().collect()
    }

    pub fn entries_by_tag(&self, tag: &str) -> Vec<ContextEntry> {
        crate::lock(&self.state)
            .ordered()
            .into_iter()
            .filter(|entry| entry.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }

    /// Run one decay cycle. Returns how many entries fell below `min_weight` and
    /// were removed.
    pub fn apply_decay(&self) -> usize {
        let removed = crate::lock(&self.state).apply_decay();
        debug!(removed, "applied context decay");
        removed
    }

    /// Raise an entry's weight by `amount`, capped at 1.0. Negative amounts are
    /// ignored; only decay lowers weight.
    pub fn boost_entry(&self, id: &str, amount: f64) -> bool {
        let mut state = crate::lock(&self.state);
        match state.entries.get_mut(id) {
            Some(entry) => {
                entry.weight = (entry.weight + amount.max(0.0)).min(1.0);
                true
            }
            None => false,
        }
    }

    pub fn dominant_emotions(&self, limit: usize) -> Vec<String> {
        let state = crate::lock(&self.state);
        profile::dominant_emotions(&state.ordered(), limit)
    }

    pub fn emotion_trends(&self) -> Vec<EmotionTrend> {
        let state = crate::lock(&self.state);
        profile::emotion_trends(&state.ordered())
    }

    /// Compare two entries. `None` if either id is unknown.
    pub fn compare(&self, id1: &str, id2: &str) -> Option<ComparisonResult> {
        let state = crate::lock(&self.state);
        let a = state.entries.get(id1)?;
        let b = state.entries.get(id2)?;
        Some(profile::compare_entries(a, b))
    }

    /// Other entries at least `threshold` similar to `id`, heaviest first.
    pub fn find_similar(&self, id: &str, threshold: f64) -> Vec<ContextEntry> {
        let state = crate::lock(&self.state);
        let Some(target) = state.entries.get(id) else {
            return Vec::new();
        };

        let mut similar: Vec<&ContextEntry> = state
            .ordered()
            .into_iter()
            .filter(|entry| entry.id != id)
            .filter(|entry| profile::compare_entries(target, entry).similarity >= threshold)
            .collect();
        similar.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        similar.into_iter().cloned().collect()
    }

    pub fn summary(&self) -> ContextSummary {
        let state = crate::lock(&self.state);
        let entries = state.ordered();

        let timespan = entries
            .iter()
            .map(|entry| entry.timestamp)
            .min()
            .zip(entries.iter().map(|entry| entry.timestamp).max())
            .map(|(start, end)| Timespan { start, end });

        ContextSummary {
            entry_count: entries.len(),
            total_weight: entries.iter().map(|entry| entry.weight).sum(),
            dominant_emotions: profile::dominant_emotions(&entries, SUMMARY_TOP_N),
            trends: profile::emotion_trends(&entries),
            themes: profile::top_tags(&entries, SUMMARY_TOP_N),
            timespan,
        }
    }

    pub fn len(&self) -> usize {
        crate::lock(&self.state).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        crate::lock(&self.state).entries.clear();
    }

    /// Snapshot of every entry, in insertion order.
    pub fn export(&self) -> Vec<ContextEntry> {
        self.all_entries()
    }

    /// Merge exported entries, replacing any with the same id. Entries already
    /// below `min_weight` are skipped, then the window is trimmed to `max_entries`
    /// by dropping the lowest weights.
    pub fn import(&self, entries: Vec<ContextEntry>) {
        let mut state = crate::lock(&self.state);
        let min_weight = state.config.min_weight;
        for entry in entries {
            if entry.weight < min_weight {
                debug!(id = %entry.id, weight = entry.weight, "skipped decayed context entry on import");
                continue;
            }
            let entry = ContextEntry::new(
                entry.id,
                entry.text,
                entry.insights,
                entry.timestamp,
                entry.weight,
                entry.tags,
            );
            state.insert(entry);
        }
        let limit = state.config.max_entries;
        state.trim_to(limit);
    }

    /// Start the background decay task, replacing any running one. Returns `false`
    /// when no tokio runtime is available.
    pub fn start_decay_task(&self) -> bool {
        self.stop_decay_task();
        let period = Duration::from_millis(crate::lock(&self.state).config.decay_interval_ms);
        let task = DecayTask::spawn(Arc::downgrade(&self.state), period);
        let started = task.is_some();
        *crate::lock(&self.decay_task) = task;
        started
    }

    /// Stop the background decay task. Safe to call repeatedly.
    pub fn stop_decay_task(&self) {
        if let Some(task) = crate::lock(&self.decay_task).take() {
            let _state = crate::lock(&self.state);
            task.stop();
        }
    }

    /// `true` while a background decay task is owned by this window.
    pub fn is_decaying(&self) -> bool {
        crate::lock(&self.decay_task).is_some()
    }

    /// Stop background decay and drop every entry. Idempotent.
    pub fn dispose(&self) {
        self.stop_decay_task();
        self.clear();
    }
}

impl Drop for ContextWindow {
    fn drop(&mut self) {
        self.stop_decay_task();
    }
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        if !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}
