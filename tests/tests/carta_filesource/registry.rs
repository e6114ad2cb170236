//! Routing requests through a registry of online + database sources.

use std::sync::Arc;

use bytes::Bytes;
use carta_filesource::{
    DatabaseFileSource, FileSource, FileSourceError, FileSourceRegistry, OnlineFileSource,
    Resource, ResourceKind,
};
use tempfile::TempDir;
use url::Url;

use crate::common::{init_tracing, MapNet};

fn tile(url: &str) -> Resource {
    Resource::new(ResourceKind::Tile, Url::parse(url).unwrap())
}

fn registry(net: &Arc<MapNet>, dir: &TempDir) -> (FileSourceRegistry, Arc<DatabaseFileSource>) {
    let online = Arc::new(OnlineFileSource::new(net.clone()));
    let database = Arc::new(DatabaseFileSource::new(dir.path().join("cache.bin")));

    let mut registry = FileSourceRegistry::new();
    registry.register(online);
    registry.register(database.clone());
    (registry, database)
}

#[tokio::test]
async fn network_schemes_route_online_and_responses_warm_the_cache() {
    init_tracing();
    let net = Arc::new(MapNet::new());
    net.serve("https://t.example.com/1.pbf", &b"fresh"[..]);
    let dir = TempDir::new().unwrap();
    let (registry, database) = registry(&net, &dir);

    let resource = tile("https://t.example.com/1.pbf");
    let response = registry
        .request(resource.clone())
        .unwrap()
        .response()
        .await
        .unwrap();
    assert_eq!(response.body, Bytes::from_static(b"fresh"));
    assert!(!response.from_cache);
    assert_eq!(net.fetch_count(), 1);

    // The caller forwards network responses into the cache of record.
    database.forward(&resource, response);

    let cached = database
        .request(resource)
        .response()
        .await
        .unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.body, Bytes::from_static(b"fresh"));
    assert_eq!(net.fetch_count(), 1, "cache hit does not refetch");
}

#[tokio::test]
async fn non_network_schemes_fall_through_to_the_database() {
    init_tracing();
    let net = Arc::new(MapNet::new());
    let dir = TempDir::new().unwrap();
    let (registry, _database) = registry(&net, &dir);

    // file:// is not the online source's business; the database answers
    // (here with a miss) and the transport is never consulted.
    let result = registry
        .request(tile("file:///tmp/tiles/1.pbf"))
        .unwrap()
        .response()
        .await;
    assert!(matches!(result, Err(FileSourceError::NotCached(_))));
    assert_eq!(net.fetch_count(), 0);
}

#[tokio::test]
async fn going_offline_fails_fast_while_the_cache_still_serves() {
    init_tracing();
    let net = Arc::new(MapNet::new());
    net.serve("https://t.example.com/1.pbf", &b"tile"[..]);
    let dir = TempDir::new().unwrap();

    let online = Arc::new(OnlineFileSource::new(net.clone()));
    let database = Arc::new(DatabaseFileSource::new(dir.path().join("cache.bin")));

    let resource = tile("https://t.example.com/1.pbf");
    let response = online.request(resource.clone()).response().await.unwrap();
    database.forward(&resource, response);

    online
        .set_property(
            carta_filesource::properties::ONLINE,
            carta_filesource::PropertyValue::Bool(false),
        )
        .unwrap();

    let offline_result = online.request(resource.clone()).response().await;
    assert!(matches!(offline_result, Err(FileSourceError::Offline)));

    let cached = database.request(resource).response().await.unwrap();
    assert_eq!(cached.body, Bytes::from_static(b"tile"));
    assert_eq!(net.fetch_count(), 1);
}
