//! End-to-end offline region download: fetch over the online source,
//! persist into the region, observe progress, then serve with the
//! network gone.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use carta_filesource::{
    DatabaseFileSource, FileSource, OfflineRegionDownloadState, OfflineRegionObserver,
    OfflineRegionStatus, OnlineFileSource, Resource, ResourceKind, ResourcePriority,
    ResourceUsage,
};
use tempfile::TempDir;
use url::Url;

use crate::common::{init_tracing, region_definition, MapNet};

#[derive(Default)]
struct ProgressLog {
    statuses: Arc<Mutex<Vec<OfflineRegionStatus>>>,
}

impl OfflineRegionObserver for ProgressLog {
    fn status_changed(&self, status: &OfflineRegionStatus) {
        self.statuses.lock().unwrap().push(status.clone());
    }
}

fn download_resource(url: &str, kind: ResourceKind) -> Resource {
    Resource::new(kind, Url::parse(url).unwrap())
        .with_priority(ResourcePriority::Low)
        .with_usage(ResourceUsage::Offline)
}

#[tokio::test]
async fn region_download_completes_and_survives_going_offline() {
    init_tracing();
    let net = Arc::new(MapNet::new());
    net.serve("https://s.example.com/style.json", &br#"{"layers":[]}"#[..]);
    net.serve("https://t.example.com/0/0/0.pbf", &b"t000"[..]);
    net.serve("https://t.example.com/1/0/0.pbf", &b"t100"[..]);

    let dir = TempDir::new().unwrap();
    let online = OnlineFileSource::new(net.clone());
    let database = DatabaseFileSource::new(dir.path().join("cache.bin"));

    let metadata = serde_json::to_vec(&serde_json::json!({ "name": "downtown" })).unwrap();
    let region = database
        .create_offline_region(region_definition(), metadata.clone())
        .await
        .unwrap();
    assert_eq!(region.metadata, metadata, "metadata is opaque to the store");

    let log = ProgressLog::default();
    let statuses = log.statuses.clone();
    database.set_offline_region_observer(region.id, Box::new(log));
    database.set_offline_region_download_state(region.id, OfflineRegionDownloadState::Active);

    let wanted = [
        ("https://s.example.com/style.json", ResourceKind::Style),
        ("https://t.example.com/0/0/0.pbf", ResourceKind::Tile),
        ("https://t.example.com/1/0/0.pbf", ResourceKind::Tile),
    ];
    database
        .set_region_required_resources(region.id, wanted.len() as u64)
        .await
        .unwrap();

    for (url, kind) in wanted {
        let resource = download_resource(url, kind);
        let response = online.request(resource.clone()).response().await.unwrap();
        database
            .put_region_resource(region.id, resource, response)
            .await
            .unwrap();
    }

    let status = database.offline_region_status(region.id).await.unwrap();
    assert!(status.complete());
    assert_eq!(status.completed_resource_count, 3);
    assert_eq!(status.completed_tile_count, 2);
    // Completion does not end the download; that is the caller's call.
    assert_eq!(status.download_state, OfflineRegionDownloadState::Active);

    {
        let seen = statuses.lock().unwrap();
        assert!(seen.len() >= 3, "observer saw each persisted resource");
        let counts: Vec<u64> = seen.iter().map(|s| s.completed_resource_count).collect();
        let mut sorted = counts.clone();
        sorted.sort_unstable();
        assert_eq!(counts, sorted, "progress is monotonic");
    }

    // Network goes away; the region still serves.
    online
        .set_property(
            carta_filesource::properties::ONLINE,
            carta_filesource::PropertyValue::Bool(false),
        )
        .unwrap();
    database.set_offline_region_download_state(region.id, OfflineRegionDownloadState::Inactive);

    let served = database
        .request(download_resource(
            "https://t.example.com/0/0/0.pbf",
            ResourceKind::Tile,
        ))
        .response()
        .await
        .unwrap();
    assert!(served.from_cache);
    assert_eq!(served.body, Bytes::from_static(b"t000"));
}

#[tokio::test]
async fn deleting_the_region_releases_its_resources() {
    init_tracing();
    let net = Arc::new(MapNet::new());
    net.serve("https://t.example.com/0/0/0.pbf", &b"t000"[..]);

    let dir = TempDir::new().unwrap();
    let online = OnlineFileSource::new(net.clone());
    let database = DatabaseFileSource::new(dir.path().join("cache.bin"));

    let region = database
        .create_offline_region(region_definition(), vec![])
        .await
        .unwrap();

    let resource = download_resource("https://t.example.com/0/0/0.pbf", ResourceKind::Tile);
    let response = online.request(resource.clone()).response().await.unwrap();
    database
        .put_region_resource(region.id, resource.clone(), response)
        .await
        .unwrap();

    database.delete_offline_region(region.id).await.unwrap();
    assert!(database.list_offline_regions().await.unwrap().is_empty());

    // The downloaded tile was fresh, so it is demoted to the ambient
    // cache rather than dropped, and a clear now removes it.
    let still_cached = database.request(resource.clone()).response().await.unwrap();
    assert_eq!(still_cached.body, Bytes::from_static(b"t000"));

    database.clear_ambient_cache().await.unwrap();
    assert!(database.request(resource).response().await.is_err());
}
