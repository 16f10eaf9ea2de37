//! Request fingerprinting for the response cache.

use serde_json::Value;

use crate::analysis::AnalysisDepth;

/// Derive an opaque cache key from an analysis request.
///
/// The key is a pure function of its inputs: object keys in `options` are
/// canonicalized (sorted) before hashing, and the text is length-prefixed so no two
/// distinct `(text, depth)` pairs share an encoding.
pub fn generate_key(text: &str, depth: AnalysisDepth, options: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    hasher.update(depth.as_str().as_bytes());
    hasher.update(&[0]);

    let mut canonical = String::new();
    write_canonical(options, &mut canonical);
    hasher.update(canonical.as_bytes());

    let hex = hasher.finalize().to_hex();
    format!("oracle:{}", &hex.as_str()[..32])
}

/// Write `value` as JSON with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
