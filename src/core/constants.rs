//! Core constants derived from the slippy-tile convention and the tile servers' usage policies.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Lowest zoom level a projection will accept.
pub const MIN_ZOOM: u8 = 1;

/// Default upper zoom limit.
pub const DEFAULT_ZOOM_LIMIT: u8 = 17;

/// Highest zoom limit a configuration may request.
pub const MAX_ZOOM_LIMIT: u8 = 22;

/// Sphere radius used for distance and destination math, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_366_710.0;

/// Latitude band covered by the Web-Mercator tile grid.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Default number of entries held by the decoded-tile memory cache.
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 32;

/// Default number of fetch workers.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default per-request deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 20_000;

/// Mirror hostnames are chosen from `0..=MAX_SHARD_INDEX`.
pub const MAX_SHARD_INDEX: u32 = 4;

/// User-Agent sent with every tile request. Public tile servers reject anonymous clients.
pub const DEFAULT_USER_AGENT: &str = "slippymap/0.1 (+https://crates.io/crates/slippymap)";

/// Directory under the user cache dir shared with other osmgpsmap-style clients.
pub const CACHE_DIR_NAME: &str = "osmgpsmap";
