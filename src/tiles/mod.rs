pub mod cache;
pub mod disk;
pub mod fetcher;
pub mod loader;
pub mod manager;
pub mod source;

// Re-exports for convenience
pub use cache::BoundedTileCache;
pub use disk::DiskTileStore;
pub use fetcher::{HttpTileFetcher, TileFetcher};
pub use loader::{FetchJob, TileFetchPipeline};
pub use manager::{TileCacheManager, TileStatus};
pub use source::{MapSource, MapSourceRegistry};
