pub mod analyze;
pub mod stream;

use anyhow::{Context, Result};
use augur::analysis::AnalysisDepth;
use augur::cache::generate_key;

/// Print the cache key for `text` at `depth` with optional JSON `options`.
pub fn key(text: &str, depth: AnalysisDepth, options: Option<&str>) -> Result<()> {
    let options = parse_options(options)?;
    println!("{}", generate_key(text, depth, &options));
    Ok(())
}

fn parse_options(options: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = options else {
        return Ok(serde_json::Value::Object(Default::default()));
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--options is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "--options must be a JSON object");
    Ok(value)
}
