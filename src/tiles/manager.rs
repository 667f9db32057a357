//! Front door of the tile machinery
//!
//! [`TileCacheManager`] answers "is this tile available?" without ever
//! blocking: it consults the memory cache and the disk store, and turns
//! misses into background fetch jobs. The renderer re-asks once the ready
//! callback fires.

use crate::core::config::TileCacheConfig;
use crate::core::constants::MIN_ZOOM;
use crate::core::geo::TileCoord;
use crate::core::projection::TileRange;
use crate::tiles::cache::BoundedTileCache;
use crate::tiles::disk::DiskTileStore;
use crate::tiles::fetcher::{HttpTileFetcher, TileFetcher};
use crate::tiles::loader::{FetchJob, PipelineStats, TileFetchPipeline, TileReadyCallback};
use crate::tiles::source::{MapSource, MapSourceRegistry};
use crate::traits::{CacheStats, Cacheable};
use crate::Result;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Availability of one tile as seen by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileStatus {
    /// The file is on disk and can be drawn.
    Ready(PathBuf),
    /// A download is queued or running; the file will appear at this path.
    Pending(PathBuf),
    /// Nothing will ever be fetched: the zoom is beyond the configured limit,
    /// the tile lies outside the grid, or the active source has no server.
    Unavailable,
}

impl TileStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, TileStatus::Ready(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            TileStatus::Ready(path) | TileStatus::Pending(path) => Some(path),
            TileStatus::Unavailable => None,
        }
    }
}

/// Decoded tile image as kept in the memory cache
#[cfg(feature = "decode")]
pub type TileImage = Arc<image::RgbaImage>;

/// Decodes a cached tile file, for use with [`TileCacheManager::tile_image`].
#[cfg(feature = "decode")]
pub fn decode_tile_image(path: &Path) -> Result<TileImage> {
    let image = image::open(path)
        .map_err(|e| crate::MapError::Decode(format!("{}: {}", path.display(), e)))?;
    Ok(Arc::new(image.to_rgba8()))
}

/// Disk store, fetch pipeline and memory cache behind one `get_tile` call.
///
/// `H` is whatever the renderer keeps for a decoded tile (a texture id, an
/// `Arc`'d bitmap). The manager never decodes on its own.
pub struct TileCacheManager<H> {
    config: TileCacheConfig,
    source: MapSource,
    store: DiskTileStore,
    pipeline: TileFetchPipeline,
    memory: BoundedTileCache<H>,
}

impl<H: Clone> TileCacheManager<H> {
    pub fn builder() -> TileCacheManagerBuilder<H> {
        TileCacheManagerBuilder::new()
    }

    /// Manager fetching over HTTP with the given configuration
    pub fn new(
        config: TileCacheConfig,
        registry: &MapSourceRegistry,
        callback: Option<TileReadyCallback>,
    ) -> Result<Self> {
        let mut builder = Self::builder().with_config(config);
        if let Some(callback) = callback {
            builder = builder.with_callback(callback);
        }
        builder.build(registry)
    }

    /// Returns the tile's status, queueing a download if it is missing.
    ///
    /// Never blocks. A tile with a forced refetch in flight reports
    /// `Pending` even if an older file is still on disk.
    pub fn get_tile(&self, x: i64, y: i64, zoom: u8) -> TileStatus {
        if !(MIN_ZOOM..=self.config.zoom_limit).contains(&zoom) {
            log::trace!("zoom {} outside 1..={}", zoom, self.config.zoom_limit);
            return TileStatus::Unavailable;
        }
        let Some(coord) = TileCoord::checked(x, y, zoom) else {
            log::trace!("tile ({}, {}) outside zoom {} grid", x, y, zoom);
            return TileStatus::Unavailable;
        };
        if !self.source.is_fetchable() {
            return TileStatus::Unavailable;
        }

        let path = self.store.tile_path(&self.source, coord);
        if self.pipeline.is_force_pending(&path) {
            return TileStatus::Pending(path);
        }
        if self.memory.contains(&path) || self.store.exists(&path) {
            return TileStatus::Ready(path);
        }

        self.queue_fetch(coord, path.clone(), false);
        TileStatus::Pending(path)
    }

    /// Statuses of every tile in `range`, in [`TileRange::iter`] order.
    pub fn request_range(&self, range: &TileRange) -> Vec<TileStatus> {
        range
            .iter()
            .map(|(x, y)| self.get_tile(x, y, range.zoom))
            .collect()
    }

    /// Switches the provider used by later `get_tile` calls. Files cached for
    /// other providers stay on disk.
    pub fn set_map_source(&mut self, source: MapSource) {
        if source.name() != self.source.name() {
            log::info!("map source {} -> {}", self.source.name(), source.name());
        }
        self.source = source;
    }

    pub fn set_map_source_by_name(&mut self, registry: &MapSourceRegistry, name: &str) -> Result<()> {
        let source = registry.lookup(name)?.clone();
        self.set_map_source(source);
        Ok(())
    }

    pub fn map_source(&self) -> &MapSource {
        &self.source
    }

    /// Drops a corrupt tile from memory and schedules a forced download.
    ///
    /// Returns false when `path` is not a tile of the active source, in which
    /// case nothing can be refetched.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.memory.remove(path);

        let Some(coord) = self.store.tile_coord(&self.source, path) else {
            log::warn!("cannot refetch {}: not a {} tile", path.display(), self.source.name());
            return false;
        };
        if !self.source.is_fetchable() {
            return false;
        }
        self.queue_fetch(coord, path.to_path_buf(), true);
        true
    }

    /// Memory-cached handle for `path`, decoding and caching it on a miss.
    ///
    /// A file that fails to decode is invalidated so the next poll finds a
    /// fresh download instead of the same corrupt bytes.
    pub fn tile_image<F>(&mut self, path: &Path, decode: F) -> Option<H>
    where
        F: FnOnce(&Path) -> Result<H>,
    {
        if let Some(handle) = self.memory.get(path) {
            return Some(handle);
        }
        if !self.store.exists(path) {
            return None;
        }

        match decode(path) {
            Ok(handle) => {
                self.memory.put(path, handle.clone());
                Some(handle)
            }
            Err(e) => {
                log::warn!("failed to decode {}: {}", path.display(), e);
                self.invalidate(path);
                None
            }
        }
    }

    pub fn memory_cache(&self) -> &BoundedTileCache<H> {
        &self.memory
    }

    pub fn memory_cache_mut(&mut self) -> &mut BoundedTileCache<H> {
        &mut self.memory
    }

    pub fn memory_stats(&self) -> CacheStats {
        self.memory.cache_stats()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn pending_count(&self) -> usize {
        self.pipeline.pending_count()
    }

    pub fn store(&self) -> &DiskTileStore {
        &self.store
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    /// Finishes queued downloads and stops the workers. Later misses are
    /// not fetched.
    pub fn shutdown(&mut self) {
        self.pipeline.shutdown();
    }

    fn queue_fetch(&self, coord: TileCoord, dest_path: PathBuf, force_refetch: bool) {
        let job = FetchJob {
            url: self.source.url(coord),
            dest_path,
            key: coord,
            force_refetch,
        };
        if let Err(e) = self.pipeline.enqueue(job) {
            log::debug!("tile {:?} not queued: {}", coord, e);
        }
    }
}

impl<H> std::fmt::Debug for TileCacheManager<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCacheManager")
            .field("source", &self.source.name())
            .field("root", &self.store.root())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Builder for [`TileCacheManager`]
pub struct TileCacheManagerBuilder<H> {
    config: TileCacheConfig,
    fetcher: Option<Arc<dyn TileFetcher>>,
    callback: Option<TileReadyCallback>,
    map_source: Option<MapSource>,
    _handle: PhantomData<fn() -> H>,
}

impl<H: Clone> TileCacheManagerBuilder<H> {
    pub fn new() -> Self {
        Self {
            config: TileCacheConfig::default(),
            fetcher: None,
            callback: None,
            map_source: None,
            _handle: PhantomData,
        }
    }

    pub fn with_config(mut self, config: TileCacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = cache_root.into();
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.config.worker_count = worker_count;
        self
    }

    /// Replace the HTTP client, e.g. with a test double
    pub fn with_fetcher(mut self, fetcher: Arc<dyn TileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_callback(mut self, callback: TileReadyCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start with this source instead of the configured default
    pub fn with_map_source(mut self, source: MapSource) -> Self {
        self.map_source = Some(source);
        self
    }

    /// Validates the configuration, resolves the starting source and starts
    /// the worker pool.
    pub fn build(self, registry: &MapSourceRegistry) -> Result<TileCacheManager<H>> {
        let config = self.config;
        config.validate()?;

        let source = match self.map_source {
            Some(source) => source,
            None => registry.lookup(&config.default_map_source)?.clone(),
        };
        let fetcher: Arc<dyn TileFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None if config.uses_default_http_settings() => Arc::new(HttpTileFetcher::new()?),
            None => Arc::new(HttpTileFetcher::with_settings(
                &config.user_agent,
                config.request_timeout(),
            )?),
        };

        let store = DiskTileStore::new(config.cache_root.clone());
        let pipeline =
            TileFetchPipeline::new(config.worker_count, store.clone(), fetcher, self.callback)?;
        let memory = BoundedTileCache::new(config.memory_cache_capacity);

        log::info!(
            "tile cache at {} using {} ({} workers)",
            store.root().display(),
            source.name(),
            pipeline.worker_count()
        );

        Ok(TileCacheManager {
            config,
            source,
            store,
            pipeline,
            memory,
        })
    }
}

impl<H: Clone> Default for TileCacheManagerBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}
