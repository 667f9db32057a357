//! # slippymap
//!
//! Projection and tile plumbing for pannable, zoomable slippy-tile maps.
//!
//! The crate converts geographic coordinates to viewport pixels and back
//! ([`CoordinateProjection`]) and hands out map-tile files on demand
//! ([`TileCacheManager`]), fetching missing tiles in a background worker pool
//! and caching them on disk and in memory. Drawing, input handling and
//! overlays belong to the embedding application.

pub mod core;
pub mod prelude;
pub mod tiles;
pub mod traits;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::TileCacheConfig,
    geo::{LatLng, Point, TileCoord},
    projection::{CoordinateProjection, GeoBounds, PixelBounds, ScreenRect, TileRange},
};

pub use tiles::{
    cache::BoundedTileCache,
    disk::DiskTileStore,
    fetcher::{HttpTileFetcher, TileFetcher},
    loader::{channel_callback, FetchJob, PipelineStats, TileFetchPipeline, TileReadyCallback},
    manager::{TileCacheManager, TileCacheManagerBuilder, TileStatus},
    source::{MapSource, MapSourceRegistry},
};

#[cfg(feature = "decode")]
pub use tiles::manager::{decode_tile_image, TileImage};

pub use traits::{CacheStats, Cacheable};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// A projection was queried before both viewport and center were set.
    #[error("Projection not ready: {0}")]
    NotReady(String),

    #[error("Unknown map source: {0}")]
    UnknownSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tile fetch pipeline has been shut down")]
    ShutDown,
}

/// Error type alias for convenience
pub type Error = MapError;
