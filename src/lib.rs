//! In-process memory and delivery for AI text analysis.
//!
//! An analyzer turns a block of text into an [`AnalysisResult`](analysis::AnalysisResult)
//! (detected emotions, narrative notes, a summary). Augur manages what happens to
//! those results: deduplicating them, remembering them across a session, and
//! delivering them incrementally. Three sibling components share only the result
//! shape:
//!
//! | Component | Bounded by | Discipline |
//! |-----------|------------|------------|
//! | [`ResponseCache`](cache::ResponseCache) | bytes, entry count, TTL | LRU or insertion-order eviction, lazy expiry |
//! | [`ContextWindow`](context::ContextWindow) | entry count | multiplicative weight decay, lowest-weight eviction |
//! | [`StreamingPipeline`](stream::StreamingPipeline) | input length | ordered, pausable, cancellable chunk sequence |
//!
//! # Modules
//!
//! - [`analysis`]: Result types, the [`Analyzer`](analysis::Analyzer) trait, and the keyword analyzer
//! - [`cache`]: Response cache and request fingerprinting
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`context`]: Decaying context window with trend and similarity queries
//! - [`metrics`]: Prometheus instruments, timer percentiles and performance reports
//! - [`stream`]: Incremental delivery of one analysis as typed chunks

pub mod analysis;
pub mod cache;
pub mod config;
pub mod context;
pub mod metrics;
pub mod stream;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
