use crate::core::constants::DEFAULT_MEMORY_CACHE_CAPACITY;
use crate::traits::{CacheStats, Cacheable};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// In-memory cache of decoded tiles keyed by their cache-file path.
///
/// Eviction is least-recently-used: both `get` and `put` refresh an entry.
/// The cache is owned by the rendering thread and is not synchronized.
#[derive(Debug)]
pub struct BoundedTileCache<H> {
    cache: LruCache<PathBuf, H>,
    hits: u64,
    misses: u64,
}

impl<H: Clone> BoundedTileCache<H> {
    /// Create a new tile cache with the given capacity (zero is treated as one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a new tile cache with default capacity (32 tiles)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Get a tile handle, marking it most recently used
    pub fn get(&mut self, path: &Path) -> Option<H> {
        match self.cache.get(path) {
            Some(handle) => {
                self.hits += 1;
                Some(handle.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or refresh a tile handle, evicting the least recently used entry when full.
    /// Returns the evicted path, if any.
    pub fn put(&mut self, path: impl Into<PathBuf>, handle: H) -> Option<PathBuf> {
        let path = path.into();
        match self.cache.push(path.clone(), handle) {
            Some((evicted, _)) if evicted != path => {
                log::trace!("evicted {} from memory cache", evicted.display());
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Check if a tile is in the cache without touching its recency
    pub fn contains(&self, path: &Path) -> bool {
        self.cache.contains(path)
    }

    /// Remove a tile from the cache
    pub fn remove(&mut self, path: &Path) -> Option<H> {
        self.cache.pop(path)
    }

    /// Clear all tiles from the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// Paths from most to least recently used
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.cache.iter().map(|(path, _)| path)
    }
}

impl<H: Clone> Default for BoundedTileCache<H> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<H: Clone> Cacheable for BoundedTileCache<H> {
    type Key = PathBuf;
    type Value = H;

    fn get_cached(&mut self, key: &Self::Key) -> Option<Self::Value> {
        self.get(key)
    }

    fn cache(&mut self, key: Self::Key, value: Self::Value) {
        self.put(key, value);
    }

    fn invalidate(&mut self, key: &Self::Key) {
        self.remove(key);
    }

    fn clear_cache(&mut self) {
        self.clear();
    }

    fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_cache_basic_operations() {
        let mut cache = BoundedTileCache::new(2);
        let path1 = PathBuf::from("/c/h/3/1/2.png");
        let path2 = PathBuf::from("/c/h/6/4/5.png");

        // Initially empty
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 2);

        // Insert and retrieve
        cache.put(path1.clone(), vec![1, 2, 3]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&path1));
        assert_eq!(cache.get(&path1), Some(vec![1, 2, 3]));

        cache.put(path2.clone(), vec![4, 5, 6]);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.remove(&path2), Some(vec![4, 5, 6]));
        assert!(!cache.contains(&path2));

        // Clear cache
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tile_cache_lru_eviction() {
        let mut cache = BoundedTileCache::new(2);
        let a = PathBuf::from("a");
        let b = PathBuf::from("b");
        let c = PathBuf::from("c");

        cache.put(a.clone(), 1);
        cache.put(b.clone(), 2);

        // Touching `a` makes `b` the eviction candidate
        assert_eq!(cache.get(&a), Some(1));
        assert_eq!(cache.put(c.clone(), 3), Some(b.clone()));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b)); // Evicted
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_put_existing_refreshes_without_eviction() {
        let mut cache = BoundedTileCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.put("a", 10), None);
        assert_eq!(cache.put("c", 3), Some(PathBuf::from("b")));
        assert_eq!(cache.get(Path::new("a")), Some(10));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = BoundedTileCache::new(0);
        cache.put("a", ());
        cache.put("b", ());

        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.paths().collect::<Vec<_>>(), vec![&PathBuf::from("b")]);
    }

    #[test]
    fn test_cache_stats() {
        let mut cache = BoundedTileCache::new(4);
        cache.cache(PathBuf::from("a"), 1);

        assert_eq!(cache.get_cached(&PathBuf::from("a")), Some(1));
        assert_eq!(cache.get_cached(&PathBuf::from("b")), None);

        let stats = cache.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }
}
