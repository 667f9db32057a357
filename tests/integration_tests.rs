use crossbeam_channel::{bounded, Receiver, Sender};
use slippymap::prelude::*;
use slippymap::tiles::source::NULL_SOURCE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// End-to-end tests of the tile machinery against a fake tile server.
/// Nothing here touches the real network.
#[cfg(test)]
mod integration_tests {
    use super::*;

    const OSM_TEMPLATE: &str = "http://tile.osm.org/%(zoom)d/%(x)d/%(y)d.png";

    /// Fake server: records every URL, optionally waits for the test to
    /// release each request, and fails the first `failures` requests.
    struct FakeServer {
        urls: Mutex<Vec<String>>,
        gate: Option<Receiver<()>>,
        failures: AtomicUsize,
    }

    impl FakeServer {
        fn open() -> Arc<Self> {
            Arc::new(Self {
                urls: Mutex::new(Vec::new()),
                gate: None,
                failures: AtomicUsize::new(0),
            })
        }

        fn gated() -> (Arc<Self>, Sender<()>) {
            let (release, gate) = bounded(64);
            let server = Arc::new(Self {
                urls: Mutex::new(Vec::new()),
                gate: Some(gate),
                failures: AtomicUsize::new(0),
            });
            (server, release)
        }

        fn failing_first(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                urls: Mutex::new(Vec::new()),
                gate: None,
                failures: AtomicUsize::new(failures),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    impl TileFetcher for FakeServer {
        fn fetch(&self, url: &str) -> slippymap::Result<Vec<u8>> {
            self.urls.lock().unwrap().push(url.to_string());
            if let Some(gate) = &self.gate {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(MapError::Http {
                    status: 500,
                    url: url.to_string(),
                });
            }
            Ok(format!("tile from {}", url).into_bytes())
        }
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn osm_registry() -> MapSourceRegistry {
        let mut registry = MapSourceRegistry::with_builtin();
        registry.register(MapSource::new("OSM", "OSM", OSM_TEMPLATE, "png"));
        registry
    }

    fn build_manager(
        root: &Path,
        server: Arc<FakeServer>,
        worker_count: usize,
    ) -> (TileCacheManager<Arc<Vec<u8>>>, Receiver<PathBuf>) {
        let registry = osm_registry();
        let (callback, ready) = channel_callback();
        let config = TileCacheConfig {
            worker_count,
            default_map_source: "OSM".to_string(),
            ..TileCacheConfig::for_testing(root)
        };
        let manager = TileCacheManager::builder()
            .with_config(config)
            .with_fetcher(server)
            .with_callback(callback)
            .build(&registry)
            .unwrap();
        (manager, ready)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// A miss yields the namespaced path, is not ready, and triggers exactly one fetch
    #[test]
    fn test_first_request_fetches_into_source_namespace() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let (server, release) = FakeServer::gated();
        let (mut manager, ready) = build_manager(dir.path(), server.clone(), 2);
        let hash = manager.map_source().content_hash().to_string();

        let status = manager.get_tile(1, 2, 3);
        let expected = dir.path().join(&hash).join("3").join("1").join("2.png");
        assert_eq!(status, TileStatus::Pending(expected.clone()));

        release.send(()).unwrap();
        assert_eq!(
            ready.recv_timeout(Duration::from_secs(5)).unwrap(),
            expected
        );
        manager.shutdown();

        assert_eq!(server.urls(), vec!["http://tile.osm.org/3/1/2.png".to_string()]);
        assert_eq!(manager.get_tile(1, 2, 3), TileStatus::Ready(expected.clone()));
        assert_eq!(
            std::fs::read(&expected).unwrap(),
            b"tile from http://tile.osm.org/3/1/2.png"
        );
    }

    /// Concurrent requests for one tile collapse into one download
    #[test]
    fn test_concurrent_requests_are_deduplicated() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let (server, release) = FakeServer::gated();
        let (mut manager, ready) = build_manager(dir.path(), server.clone(), 4);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert!(!manager.get_tile(5, 6, 4).is_ready());
                });
            }
        });
        assert_eq!(manager.pending_count(), 1);

        release.send(()).unwrap();
        ready.recv_timeout(Duration::from_secs(5)).unwrap();
        manager.shutdown();

        assert_eq!(server.urls().len(), 1);
        assert_eq!(manager.pipeline_stats().stored, 1);
    }

    /// Invalidation refetches an existing tile and hides it until the new copy lands
    #[test]
    fn test_invalidate_forces_refetch() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let (server, release) = FakeServer::gated();
        let (mut manager, ready) = build_manager(dir.path(), server.clone(), 1);

        let path = manager.get_tile(0, 0, 2).path().unwrap().to_path_buf();
        release.send(()).unwrap();
        ready.recv_timeout(Duration::from_secs(5)).unwrap();
        wait_until(|| manager.pending_count() == 0);
        assert!(manager.get_tile(0, 0, 2).is_ready());

        assert!(manager.invalidate(&path));
        assert_eq!(manager.get_tile(0, 0, 2), TileStatus::Pending(path.clone()));

        release.send(()).unwrap();
        ready.recv_timeout(Duration::from_secs(5)).unwrap();
        manager.shutdown();

        assert_eq!(server.urls().len(), 2);
        assert!(manager.get_tile(0, 0, 2).is_ready());
    }

    /// A failed download is dropped and the next request tries again
    #[test]
    fn test_failed_fetch_can_be_retriggered() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let server = FakeServer::failing_first(1);
        let (mut manager, ready) = build_manager(dir.path(), server.clone(), 1);

        let path = manager.get_tile(3, 3, 3).path().unwrap().to_path_buf();
        wait_until(|| manager.pending_count() == 0);
        assert!(!path.exists());
        assert_eq!(manager.pipeline_stats().failed, 1);

        assert!(!manager.get_tile(3, 3, 3).is_ready());
        assert_eq!(ready.recv_timeout(Duration::from_secs(5)).unwrap(), path);
        manager.shutdown();

        assert_eq!(server.urls().len(), 2);
        assert!(manager.get_tile(3, 3, 3).is_ready());
    }

    /// Switching sources changes the cache namespace without touching old files
    #[test]
    fn test_switching_source_keeps_old_cache() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let server = FakeServer::open();
        let (mut manager, ready) = build_manager(dir.path(), server.clone(), 1);
        let registry = osm_registry();

        let osm_path = manager.get_tile(1, 1, 1).path().unwrap().to_path_buf();
        ready.recv_timeout(Duration::from_secs(5)).unwrap();

        manager
            .set_map_source_by_name(&registry, "OSM_GPS_MAP_SOURCE_OPENCYCLEMAP")
            .unwrap();
        let cycle_path = manager.get_tile(1, 1, 1).path().unwrap().to_path_buf();
        assert_ne!(osm_path, cycle_path);
        ready.recv_timeout(Duration::from_secs(5)).unwrap();
        manager.shutdown();

        assert!(osm_path.exists());
        assert!(cycle_path.exists());
        assert!(cycle_path.starts_with(dir.path().join(manager.map_source().content_hash())));
    }

    /// The placeholder provider never reaches the network
    #[test]
    fn test_null_source_never_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let server = FakeServer::open();
        let (mut manager, _ready) = build_manager(dir.path(), server.clone(), 1);

        manager
            .set_map_source_by_name(&osm_registry(), NULL_SOURCE)
            .unwrap();
        assert_eq!(manager.get_tile(0, 0, 1), TileStatus::Unavailable);
        manager.shutdown();

        assert!(server.urls().is_empty());
    }

    /// Tiles for the visible range of a projection are requested in one pass
    #[test]
    fn test_projection_drives_tile_requests() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let server = FakeServer::open();
        let (mut manager, ready) = build_manager(dir.path(), server.clone(), 2);

        let mut projection = CoordinateProjection::new(manager.config().zoom_limit);
        projection.set_viewport(0.0, 0.0, 512.0, 512.0);
        projection.set_center_and_zoom(LatLng::new(0.0, 0.0), 1);
        let range = projection.visible_tile_range().unwrap();

        let statuses = manager.request_range(&range);
        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|status| !status.is_ready()));

        for _ in 0..4 {
            ready.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        manager.shutdown();

        assert!(manager.request_range(&range).iter().all(TileStatus::is_ready));
        let mut urls = server.urls();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "http://tile.osm.org/1/0/0.png",
                "http://tile.osm.org/1/0/1.png",
                "http://tile.osm.org/1/1/0.png",
                "http://tile.osm.org/1/1/1.png",
            ]
        );
    }

    /// After shutdown the pipeline refuses work instead of hanging
    #[test]
    fn test_pipeline_rejects_jobs_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let server = FakeServer::open();
        let mut pipeline =
            TileFetchPipeline::new(2, DiskTileStore::new(dir.path()), server.clone(), None)
                .unwrap();
        pipeline.shutdown();

        let job = FetchJob {
            url: "http://tile.osm.org/1/0/0.png".to_string(),
            dest_path: dir.path().join("0.png"),
            key: TileCoord::new(0, 0, 1),
            force_refetch: false,
        };
        assert!(matches!(pipeline.enqueue(job), Err(MapError::ShutDown)));
        assert!(server.urls().is_empty());
    }

    /// Decoding real PNG bytes written by the pipeline
    #[cfg(feature = "decode")]
    #[test]
    fn test_decode_tile_image_round_trip() {
        use slippymap::decode_tile_image;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let decoded = decode_tile_image(&path).unwrap();
        assert_eq!(decoded.dimensions(), (4, 4));

        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(decode_tile_image(&path), Err(MapError::Decode(_))));
    }
}
