//! Catalog of slippy-tile providers
//!
//! Provider names and the MD5 content hash follow osmgpsmap's so that the
//! on-disk cache can be shared with clients built on it. Templates use Python-style placeholders:
//! `%(zoom)d`, `%(x)d`, `%(y)d`, `%(random)d` (mirror shard) and `#W` (quadkey).

use crate::core::constants::MAX_SHARD_INDEX;
use crate::core::geo::TileCoord;
use crate::prelude::HashMap;
use crate::{MapError, Result};
use rand::Rng;
use md5::{Digest, Md5};

pub const NULL_SOURCE: &str = "OSM_GPS_MAP_SOURCE_NULL";
pub const OPENSTREETMAP: &str = "OSM_GPS_MAP_SOURCE_OPENSTREETMAP";

const NULL_TEMPLATE_PREFIX: &str = "none://";

/// Immutable description of one tile provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSource {
    name: String,
    display_name: String,
    url_template: String,
    image_format: String,
    content_hash: String,
}

impl MapSource {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        url_template: impl Into<String>,
        image_format: impl Into<String>,
    ) -> Self {
        let url_template = url_template.into();
        let content_hash = format!("{:x}", Md5::digest(url_template.as_bytes()));
        Self {
            name: name.into(),
            display_name: display_name.into(),
            url_template,
            image_format: image_format.into(),
            content_hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    /// File extension of cached tiles
    pub fn image_format(&self) -> &str {
        &self.image_format
    }

    /// MD5 hex digest of the URL template; namespaces this source's disk cache.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// False for placeholder sources that have no server behind them.
    pub fn is_fetchable(&self) -> bool {
        !self.url_template.starts_with(NULL_TEMPLATE_PREFIX)
    }

    /// Whether the template spreads requests over numbered mirror hosts
    pub fn is_sharded(&self) -> bool {
        self.url_template.contains("%(random)d")
    }

    /// Fills the template for `coord`, picking a random mirror shard where the template has one.
    pub fn url(&self, coord: TileCoord) -> String {
        let shard = if self.is_sharded() {
            rand::rng().random_range(0..=MAX_SHARD_INDEX)
        } else {
            0
        };
        self.url_with_shard(coord, shard)
    }

    /// Fills the template with an explicit shard index.
    pub fn url_with_shard(&self, coord: TileCoord, shard: u32) -> String {
        let mut url = self
            .url_template
            .replace("%(zoom)d", &coord.z.to_string())
            .replace("%(x)d", &coord.x.to_string())
            .replace("%(y)d", &coord.y.to_string())
            .replace("%(random)d", &shard.to_string());
        if url.contains("#W") {
            url = url.replace("#W", &coord.quadkey());
        }
        url
    }
}

/// Named tile providers, in registration order.
///
/// Built once at startup and shared by reference; lookups never mutate it.
#[derive(Debug, Clone, Default)]
pub struct MapSourceRegistry {
    sources: Vec<MapSource>,
    by_name: HashMap<String, usize>,
}

impl MapSourceRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in provider catalog
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for source in builtin_sources() {
            registry.register(source);
        }
        registry
    }

    /// Adds a source. Re-registering an existing name keeps the first entry and returns false.
    pub fn register(&mut self, source: MapSource) -> bool {
        if self.by_name.contains_key(source.name()) {
            log::debug!("map source {} already registered", source.name());
            return false;
        }
        self.by_name
            .insert(source.name().to_string(), self.sources.len());
        self.sources.push(source);
        true
    }

    pub fn lookup(&self, name: &str) -> Result<&MapSource> {
        self.by_name
            .get(name)
            .map(|&index| &self.sources[index])
            .ok_or_else(|| MapError::UnknownSource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// First registered source that can actually be fetched
    pub fn default_source(&self) -> Option<&MapSource> {
        self.sources.iter().find(|source| source.is_fetchable())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapSource> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn builtin_sources() -> Vec<MapSource> {
    vec![
        MapSource::new(NULL_SOURCE, "None", "none://", "png"),
        MapSource::new(
            OPENSTREETMAP,
            "OpenStreetMap I",
            "http://tile.openstreetmap.org/%(zoom)d/%(x)d/%(y)d.png",
            "png",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_OPENSTREETMAP_RENDERER",
            "OpenStreetMap II",
            "http://tah.openstreetmap.org/Tiles/tile/%(zoom)d/%(x)d/%(y)d.png",
            "png",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_OPENCYCLEMAP",
            "OpenCycleMap",
            "http://c.andy.sandbox.cloudmade.com/tiles/cycle/%(zoom)d/%(x)d/%(y)d.png",
            "png",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_OSM_PUBLIC_TRANSPORT",
            "Public Transport",
            "http://tile.xn--pnvkarte-m4a.de/tilegen/%(zoom)d/%(x)d/%(y)d.png",
            "png",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_OSMC_TRAILS",
            "OSMC Trails",
            "http://topo.geofabrik.de/trails/%(zoom)d/%(x)d/%(y)d.png",
            "png",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_MAPS_FOR_FREE",
            "Maps-For-Free",
            "http://maps-for-free.com/layer/relief/z%(zoom)d/row%(y)d/%(zoom)d_%(x)d-%(y)d.jpg",
            "jpg",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_GOOGLE_STREET",
            "Google Maps",
            "http://mt%(random)d.google.com/vt/lyrs=m@146&hl=en&x=%(x)d&s=&y=%(y)d&z=%(zoom)d",
            "jpg",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_GOOGLE_SATELLITE",
            "Google Satellite",
            "http://khm%(random)d.google.com/kh/v=80&x=%(x)d&y=%(y)d&z=%(zoom)d",
            "jpg",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_GOOGLE_HYBRID",
            "Google Hybrid",
            "http://mt%(random)d.google.com/vt/lyrs=h@146&hl=en&x=%(x)d&s=&y=%(y)d&z=%(zoom)d",
            "jpg",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_VIRTUAL_EARTH_STREET",
            "Virtual Earth",
            "http://a%(random)d.ortho.tiles.virtualearth.net/tiles/r#W.jpeg?g=50",
            "jpg",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_VIRTUAL_EARTH_SATELLITE",
            "Virtual Earth Satellite",
            "http://a%(random)d.ortho.tiles.virtualearth.net/tiles/a#W.jpeg?g=50",
            "jpg",
        ),
        MapSource::new(
            "OSM_GPS_MAP_SOURCE_VIRTUAL_EARTH_HYBRID",
            "Virtual Earth Hybrid",
            "http://a%(random)d.ortho.tiles.virtualearth.net/tiles/h#W.jpeg?g=50",
            "jpg",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = MapSourceRegistry::with_builtin();

        assert_eq!(registry.len(), 13);
        assert_eq!(registry.default_source().unwrap().name(), OPENSTREETMAP);
        assert!(!registry.lookup(NULL_SOURCE).unwrap().is_fetchable());
    }

    #[test]
    fn test_register_is_idempotent_by_name() {
        let mut registry = MapSourceRegistry::new();
        let first = MapSource::new("OSM", "OSM", "http://a/%(zoom)d/%(x)d/%(y)d.png", "png");
        let second = MapSource::new("OSM", "Other", "http://b/%(zoom)d/%(x)d/%(y)d.png", "png");

        assert!(registry.register(first.clone()));
        assert!(!registry.register(second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("OSM").unwrap(), &first);
    }

    #[test]
    fn test_lookup_unknown_source() {
        let registry = MapSourceRegistry::with_builtin();
        assert!(matches!(
            registry.lookup("NOPE"),
            Err(MapError::UnknownSource(name)) if name == "NOPE"
        ));
    }

    #[test]
    fn test_url_template_filling() {
        let source = MapSource::new(
            "OSM",
            "OSM",
            "http://tile.osm.org/%(zoom)d/%(x)d/%(y)d.png",
            "png",
        );
        assert_eq!(
            source.url(TileCoord::new(1, 2, 3)),
            "http://tile.osm.org/3/1/2.png"
        );
        assert!(!source.is_sharded());
    }

    #[test]
    fn test_sharded_url_stays_in_range() {
        let registry = MapSourceRegistry::with_builtin();
        let google = registry.lookup("OSM_GPS_MAP_SOURCE_GOOGLE_STREET").unwrap();
        assert!(google.is_sharded());

        for _ in 0..50 {
            let url = google.url(TileCoord::new(5, 6, 7));
            let shard: u32 = url["http://mt".len()..url.find(".google").unwrap()]
                .parse()
                .unwrap();
            assert!(shard <= MAX_SHARD_INDEX);
            assert!(url.ends_with("x=5&s=&y=6&z=7"));
        }
    }

    #[test]
    fn test_quadkey_placeholder() {
        let registry = MapSourceRegistry::with_builtin();
        let bing = registry
            .lookup("OSM_GPS_MAP_SOURCE_VIRTUAL_EARTH_STREET")
            .unwrap();

        assert_eq!(
            bing.url_with_shard(TileCoord::new(3, 5, 3), 1),
            "http://a1.ortho.tiles.virtualearth.net/tiles/r213.jpeg?g=50"
        );
    }

    #[test]
    fn test_content_hash_is_stable_and_distinct() {
        let a = MapSource::new("A", "A", "http://a/%(zoom)d/%(x)d/%(y)d.png", "png");
        let a_again = MapSource::new("A2", "A2", "http://a/%(zoom)d/%(x)d/%(y)d.png", "png");
        let b = MapSource::new("B", "B", "http://b/%(zoom)d/%(x)d/%(y)d.png", "png");

        assert_eq!(a.content_hash(), a_again.content_hash());
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 32);
    }

    #[test]
    fn test_content_hash_matches_osmgpsmap_cache_dirs() {
        let registry = MapSourceRegistry::with_builtin();

        assert_eq!(
            registry.lookup(OPENSTREETMAP).unwrap().content_hash(),
            "b5d9ca158fb49809b31f4efad54ac655"
        );
        assert_eq!(
            MapSource::new("OSM", "OSM", "http://tile.osm.org/%(zoom)d/%(x)d/%(y)d.png", "png")
                .content_hash(),
            "ba54b69682c0a66833bd7d57aa12aa68"
        );
    }
}
