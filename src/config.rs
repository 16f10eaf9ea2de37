use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AugurConfig {
    pub log: LogConfig,
    pub cache: CacheConfig,
    pub context: ContextConfig,
    pub stream: StreamConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on the summed size estimates of all entries.
    pub max_size_bytes: usize,
    pub max_entries: usize,
    /// TTL applied when `set` is called without one.
    pub default_ttl_secs: u64,
    /// Evict by last access when `true`, by insertion order otherwise.
    pub lru: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    pub max_entries: usize,
    /// Fraction of weight lost per decay cycle, in `[0, 1]`.
    pub decay_rate: f64,
    /// Entries whose weight falls below this are dropped.
    pub min_weight: f64,
    /// Run decay on a background task.
    pub auto_decay: bool,
    pub decay_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Soft upper bound, in bytes, on each text chunk.
    pub chunk_size: usize,
    /// Pause between emitted chunks. Zero disables it.
    pub chunk_delay_ms: u64,
    /// Interleave progress chunks with text chunks.
    pub progress_updates: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 50 * 1024 * 1024,
            max_entries: 1000,
            default_ttl_secs: 3600,
            lru: true,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            decay_rate: 0.1,
            min_weight: 0.01,
            auto_decay: true,
            decay_interval_ms: 60_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_samples: 1000,
            histogram_buckets: vec![
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ],
            retention_secs: 3600,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            chunk_delay_ms: 10,
            progress_updates: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Samples kept per timed operation for percentile stats.
    pub max_samples: usize,
    /// Upper bounds of the duration histogram buckets, in milliseconds.
    pub histogram_buckets: Vec<f64>,
    /// Series and samples older than this are dropped by `cleanup`.
    pub retention_secs: u64,
}

/// Returns `~/.augur/`
pub fn default_augur_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".augur")
}

/// Returns the default config file path: `~/.augur/config.toml`
pub fn default_config_path() -> PathBuf {
    default_augur_dir().join("config.toml")
}

impl AugurConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AugurConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (AUGUR_LOG_LEVEL, AUGUR_CACHE_TTL_SECS,
    /// AUGUR_CONTEXT_MAX_ENTRIES, AUGUR_STREAM_CHUNK_SIZE, AUGUR_METRICS_ENABLED).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("AUGUR_LOG_LEVEL") {
            self.log.level = val;
        }
        if let Ok(val) = std::env::var("AUGUR_CACHE_TTL_SECS") {
            self.cache.default_ttl_secs = val
                .parse()
                .with_context(|| format!("AUGUR_CACHE_TTL_SECS is not a number: {val}"))?;
        }
        if let Ok(val) = std::env::var("AUGUR_CONTEXT_MAX_ENTRIES") {
            self.context.max_entries = val
                .parse()
                .with_context(|| format!("AUGUR_CONTEXT_MAX_ENTRIES is not a number: {val}"))?;
        }
        if let Ok(val) = std::env::var("AUGUR_STREAM_CHUNK_SIZE") {
            self.stream.chunk_size = val
                .parse()
                .with_context(|| format!("AUGUR_STREAM_CHUNK_SIZE is not a number: {val}"))?;
        }
        if let Ok(val) = std::env::var("AUGUR_METRICS_ENABLED") {
            self.metrics.enabled = val
                .parse()
                .with_context(|| format!("AUGUR_METRICS_ENABLED is not true/false: {val}"))?;
        }
        Ok(())
    }

    /// Reject settings that would break the cache and context bounds.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.cache.max_entries > 0, "cache.max_entries must be at least 1");
        ensure!(self.context.max_entries > 0, "context.max_entries must be at least 1");
        ensure!(
            (0.0..=1.0).contains(&self.context.decay_rate),
            "context.decay_rate must be between 0.0 and 1.0"
        );
        ensure!(
            (0.0..=1.0).contains(&self.context.min_weight),
            "context.min_weight must be between 0.0 and 1.0"
        );
        ensure!(
            !self.context.auto_decay || self.context.decay_interval_ms > 0,
            "context.decay_interval_ms must be positive when auto_decay is on"
        );
        ensure!(self.stream.chunk_size > 0, "stream.chunk_size must be at least 1");
        ensure!(self.metrics.max_samples > 0, "metrics.max_samples must be at least 1");
        ensure!(
            self.metrics
                .histogram_buckets
                .windows(2)
                .all(|pair| pair[0] < pair[1]),
            "metrics.histogram_buckets must be strictly increasing"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AugurConfig::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert!(config.cache.lru);
        assert_eq!(config.context.max_entries, 100);
        assert_eq!(config.context.decay_rate, 0.1);
        assert_eq!(config.stream.chunk_size, 100);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.max_samples, 1000);
        assert_eq!(config.metrics.histogram_buckets.len(), 11);
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[log]
level = "debug"

[cache]
max_entries = 10
lru = false

[context]
decay_rate = 0.25
auto_decay = false
"#;
        let config: AugurConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.cache.max_entries, 10);
        assert!(!config.cache.lru);
        assert_eq!(config.context.decay_rate, 0.25);
        assert!(!config.context.auto_decay);
        // defaults still apply for unset fields
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert_eq!(config.context.min_weight, 0.01);
        assert_eq!(config.stream.chunk_delay_ms, 10);
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stream]\nchunk_size = 42\n").unwrap();

        let config = AugurConfig::load_from(&path).unwrap();
        assert_eq!(config.stream.chunk_size, 42);

        let missing = AugurConfig::load_from(dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.stream.chunk_size, 100);
    }

    #[test]
    fn validate_rejects_bad_rates() {
        let mut config = AugurConfig::default();
        config.context.decay_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = AugurConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = AugurConfig::default();
        config.metrics.histogram_buckets = vec![5.0, 5.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_metrics_section() {
        let config: AugurConfig = toml::from_str(
            "[metrics]\nenabled = false\nhistogram_buckets = [1.0, 2.0]\n",
        )
        .unwrap();
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.histogram_buckets, vec![1.0, 2.0]);
        assert_eq!(config.metrics.retention_secs, 3600);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AugurConfig::default();
        std::env::set_var("AUGUR_LOG_LEVEL", "trace");
        std::env::set_var("AUGUR_CACHE_TTL_SECS", "60");
        std::env::set_var("AUGUR_CONTEXT_MAX_ENTRIES", "7");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.log.level, "trace");
        assert_eq!(config.cache.default_ttl_secs, 60);
        assert_eq!(config.context.max_entries, 7);

        // Clean up
        std::env::remove_var("AUGUR_LOG_LEVEL");
        std::env::remove_var("AUGUR_CACHE_TTL_SECS");
        std::env::remove_var("AUGUR_CONTEXT_MAX_ENTRIES");
    }
}
