//! Prelude module for common slippymap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use slippymap::prelude::*;`

pub use crate::core::{
    config::TileCacheConfig,
    geo::{LatLng, Point, TileCoord},
    projection::{CoordinateProjection, GeoBounds, PixelBounds, ScreenRect, TileRange},
};

pub use crate::tiles::{
    cache::BoundedTileCache,
    disk::DiskTileStore,
    fetcher::{HttpTileFetcher, TileFetcher},
    loader::{channel_callback, FetchJob, TileFetchPipeline, TileReadyCallback},
    manager::{TileCacheManager, TileStatus},
    source::{MapSource, MapSourceRegistry},
};

pub use crate::traits::{CacheStats, Cacheable};

pub use crate::{Error as MapError, Result};

pub use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
