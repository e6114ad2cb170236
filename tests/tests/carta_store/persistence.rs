//! Store state must survive process-like boundaries: everything a store
//! instance persisted is visible to a fresh instance on the same path.

use carta_store::{OfflineStore, ResponseMeta, StoreError};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::common::region_definition;

#[fixture]
fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

#[rstest]
fn full_state_round_trips_through_disk(temp_dir: TempDir) {
    let path = temp_dir.path().join("cache.bin");

    let region_id = {
        let mut store = OfflineStore::open(&path);
        store
            .put("style|s", b"body".to_vec(), ResponseMeta::default(), false)
            .unwrap();
        store.invalidate_ambient().unwrap();

        let region = store
            .create_region(region_definition(), b"meta".to_vec())
            .unwrap();
        store.set_region_required(region.id, 3).unwrap();
        store
            .mark_region_resource(
                region.id,
                "tile|t",
                b"tile".to_vec(),
                ResponseMeta::default(),
                true,
            )
            .unwrap();
        region.id
    };

    let mut reopened = OfflineStore::open(&path);

    let ambient = reopened.get("style|s").unwrap().unwrap();
    assert!(ambient.stale, "staleness flag persisted");

    let regions = reopened.list_regions().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].id, region_id);
    assert_eq!(regions[0].metadata, b"meta");

    let stats = reopened.region_stats(region_id).unwrap();
    assert_eq!(stats.completed_resources, 1);
    assert_eq!(stats.completed_tiles, 1);
    assert_eq!(stats.required_resources, 3);

    assert_eq!(reopened.get("tile|t").unwrap().unwrap().pin_count, 1);
}

#[rstest]
fn recency_order_survives_reopen(temp_dir: TempDir) {
    let path = temp_dir.path().join("cache.bin");

    {
        let mut store = OfflineStore::open(&path);
        store
            .put("a", vec![0; 30], ResponseMeta::default(), false)
            .unwrap();
        store
            .put("b", vec![0; 30], ResponseMeta::default(), false)
            .unwrap();
        // Touch "a" so "b" is the eviction candidate.
        store.get("a").unwrap();
    }

    let mut reopened = OfflineStore::open(&path);
    reopened.set_maximum_ambient_size(40).unwrap();

    assert!(reopened.contains("a"));
    assert!(!reopened.contains("b"), "recency clock persisted");
}

#[rstest]
fn region_ids_stay_monotonic_across_instances(temp_dir: TempDir) {
    let path = temp_dir.path().join("cache.bin");

    let first = {
        let mut store = OfflineStore::open(&path);
        store.create_region(region_definition(), vec![]).unwrap().id
    };

    let mut store = OfflineStore::open(&path);
    let second = store.create_region(region_definition(), vec![]).unwrap().id;
    assert!(second > first);
}

#[rstest]
fn not_open_store_reports_every_operation(temp_dir: TempDir) {
    // Occupy the snapshot path with a directory.
    let path = temp_dir.path().join("occupied");
    std::fs::create_dir(&path).unwrap();

    let mut store = OfflineStore::open(&path);
    assert!(matches!(
        store.put("k", vec![1], ResponseMeta::default(), false),
        Err(StoreError::NotOpen)
    ));
    assert!(matches!(
        store.create_region(region_definition(), vec![]),
        Err(StoreError::NotOpen)
    ));
    assert!(matches!(store.region_stats(1), Err(StoreError::NotOpen)));
}
