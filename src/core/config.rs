//! Configuration for the tile cache and fetch pipeline
//!
//! Defaults suit an interactive desktop map. Presets cover constrained
//! devices, heavy use, and tests; any field can be overridden from JSON.

use crate::core::constants::{
    CACHE_DIR_NAME, DEFAULT_MEMORY_CACHE_CAPACITY, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_USER_AGENT, DEFAULT_WORKER_COUNT, DEFAULT_ZOOM_LIMIT, MAX_ZOOM_LIMIT, MIN_ZOOM,
};
use crate::tiles::source::OPENSTREETMAP;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    /// Root of the on-disk cache; one subdirectory per map source.
    pub cache_root: PathBuf,
    pub worker_count: usize,
    pub memory_cache_capacity: usize,
    pub zoom_limit: u8,
    /// Registry name of the source used until `set_map_source` is called.
    pub default_map_source: String,
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl TileCacheConfig {
    /// Fewer workers and a smaller decoded-tile cache.
    pub fn low_resource() -> Self {
        Self {
            worker_count: 1,
            memory_cache_capacity: 16,
            ..Self::default()
        }
    }

    pub fn high_performance() -> Self {
        Self {
            worker_count: 4,
            memory_cache_capacity: 128,
            ..Self::default()
        }
    }

    /// Single worker, short timeout, cache rooted at `cache_root`.
    pub fn for_testing(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            worker_count: 1,
            request_timeout_ms: 2_000,
            ..Self::default()
        }
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// True when the HTTP settings match the process-wide default client.
    pub fn uses_default_http_settings(&self) -> bool {
        self.user_agent == DEFAULT_USER_AGENT && self.request_timeout_ms == DEFAULT_REQUEST_TIMEOUT_MS
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(MapError::Config("worker_count must be at least 1".to_string()));
        }
        if self.memory_cache_capacity == 0 {
            return Err(MapError::Config(
                "memory_cache_capacity must be at least 1".to_string(),
            ));
        }
        if !(MIN_ZOOM..=MAX_ZOOM_LIMIT).contains(&self.zoom_limit) {
            return Err(MapError::Config(format!(
                "zoom_limit {} outside {}..={}",
                self.zoom_limit, MIN_ZOOM, MAX_ZOOM_LIMIT
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(MapError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses a (possibly partial) JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            worker_count: DEFAULT_WORKER_COUNT,
            memory_cache_capacity: DEFAULT_MEMORY_CACHE_CAPACITY,
            zoom_limit: DEFAULT_ZOOM_LIMIT,
            default_map_source: OPENSTREETMAP.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME)
}
