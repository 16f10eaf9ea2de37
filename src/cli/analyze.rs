use anyhow::Result;
use augur::analysis::{AnalysisDepth, Analyzer, KeywordAnalyzer};
use augur::cache::{generate_key, ResponseCache};
use augur::config::AugurConfig;
use augur::context::ContextWindow;
use augur::metrics::{Metrics, OP_ANALYZE};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Analyze each text through the cache and context window, then print cache stats,
/// the context summary and a performance report as JSON.
pub async fn analyze(config: &AugurConfig, texts: &[String], depth: AnalysisDepth) -> Result<()> {
    let analyzer = KeywordAnalyzer::new();
    let metrics = Arc::new(Metrics::new(config.metrics.clone())?);
    let mut cache = ResponseCache::new(config.cache.clone()).with_metrics(Arc::clone(&metrics));
    let context = ContextWindow::new(config.context.clone());
    let options = serde_json::Value::Object(Default::default());

    for text in texts {
        let key = generate_key(text, depth, &options);
        let result = match cache.get(&key) {
            Some(mut hit) => {
                debug!(%key, "cache hit");
                hit.metadata.cached = true;
                hit
            }
            None => {
                let started = Instant::now();
                let result = analyzer
                    .analyze(text, depth)
                    .inspect_err(|_| metrics.record_error("ANALYSIS_ERROR"))?;
                metrics.record_analysis(OP_ANALYZE, &result, started.elapsed());
                cache.set(key, result.clone(), None);
                result
            }
        };

        println!(
            "{}  {}",
            if result.metadata.cached { "cached" } else { "fresh " },
            result.summary
        );
        context.add_entry(&result, [depth.as_str()]);
    }

    let report = serde_json::json!({
        "cache": cache.stats(),
        "context": context.summary(),
        "metrics": metrics.report(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    context.dispose();
    Ok(())
}
