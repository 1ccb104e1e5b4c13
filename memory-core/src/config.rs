//! Layered engine configuration: hard-coded defaults, overridden by an
//! optional `memory.toml`, overridden by `MEMORY_*` environment variables.

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::constants::{
    DEFAULT_CACHE_MAX_TOTAL_BYTES, DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD,
    DEFAULT_WORKSPACE_LRU_CAPACITY, MIN_COMPRESSION_SAVINGS,
};
use crate::error::{Error, Result};

/// Engine-wide configuration. Every field has a default; `memory.toml` and
/// environment variables only need to mention the ones they override.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for `memory/global.db`, `projects/`, and `backups/`.
    pub storage_root: String,
    /// Total byte budget for the core cache.
    pub cache_max_total_bytes: u64,
    /// Fraction of the cache budget at which compression kicks in.
    pub cache_compression_threshold: f64,
    /// Minimum fractional byte savings to keep a compressed block.
    pub cache_min_compression_savings: f64,
    /// Default similarity threshold for write-time deduplication.
    pub default_similarity_threshold: f32,
    /// Number of simultaneously open per-project backends before LRU
    /// eviction.
    pub workspace_lru_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_root: "./memory-data".to_string(),
            cache_max_total_bytes: DEFAULT_CACHE_MAX_TOTAL_BYTES,
            cache_compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            cache_min_compression_savings: MIN_COMPRESSION_SAVINGS,
            default_similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            workspace_lru_capacity: DEFAULT_WORKSPACE_LRU_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Derive the cache configuration this engine config implies.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_total_bytes: self.cache_max_total_bytes,
            compression_threshold: self.cache_compression_threshold,
            min_compression_savings: self.cache_min_compression_savings,
        }
    }

    /// Load defaults, then a TOML file at `path` if it exists, then
    /// `MEMORY_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the file exists but fails to
    /// parse, or if an environment override fails to parse as the
    /// expected type.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)?;
                config = toml::from_str(&raw).map_err(|e| Error::Configuration(format!("{path:?}: {e}")))?;
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("MEMORY_STORAGE_ROOT") {
            self.storage_root = v;
        }
        if let Ok(v) = std::env::var("MEMORY_CACHE_MAX_TOTAL_BYTES") {
            self.cache_max_total_bytes = v
                .parse()
                .map_err(|_| Error::Configuration(format!("MEMORY_CACHE_MAX_TOTAL_BYTES: invalid u64 {v:?}")))?;
        }
        if let Ok(v) = std::env::var("MEMORY_CACHE_COMPRESSION_THRESHOLD") {
            self.cache_compression_threshold = v
                .parse()
                .map_err(|_| Error::Configuration(format!("MEMORY_CACHE_COMPRESSION_THRESHOLD: invalid f64 {v:?}")))?;
        }
        if let Ok(v) = std::env::var("MEMORY_DEFAULT_SIMILARITY_THRESHOLD") {
            self.default_similarity_threshold = v.parse().map_err(|_| {
                Error::Configuration(format!("MEMORY_DEFAULT_SIMILARITY_THRESHOLD: invalid f32 {v:?}"))
            })?;
        }
        if let Ok(v) = std::env::var("MEMORY_WORKSPACE_LRU_CAPACITY") {
            self.workspace_lru_capacity = v
                .parse()
                .map_err(|_| Error::Configuration(format!("MEMORY_WORKSPACE_LRU_CAPACITY: invalid usize {v:?}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_max_total_bytes, 2048);
        assert!((config.cache_compression_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn load_with_missing_path_falls_back_to_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.cache_max_total_bytes, DEFAULT_CACHE_MAX_TOTAL_BYTES);
    }

    #[test]
    fn load_parses_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.toml");
        std::fs::write(&path, "cache_max_total_bytes = 4096\n").unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache_max_total_bytes, 4096);
    }
}
