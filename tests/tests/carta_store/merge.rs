//! Merging a side store file produced by another store instance.

use carta_store::{OfflineStore, ResponseMeta, StoreError};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::common::region_definition;

#[fixture]
fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

fn side_store_with_regions(path: &std::path::Path, regions: usize, tiles_per_region: usize) {
    let mut side = OfflineStore::open(path);
    for r in 0..regions {
        let region = side
            .create_region(region_definition(), format!("region-{r}").into_bytes())
            .unwrap();
        for t in 0..tiles_per_region {
            side.mark_region_resource(
                region.id,
                &format!("tile|{r}/{t}"),
                vec![0xCC; 8],
                ResponseMeta::default(),
                true,
            )
            .unwrap();
        }
    }
}

#[rstest]
fn merge_is_additive_and_idempotent_per_file(temp_dir: TempDir) {
    let side_path = temp_dir.path().join("side.bin");
    side_store_with_regions(&side_path, 2, 3);

    let mut dest = OfflineStore::open(temp_dir.path().join("dest.bin"));
    let existing = dest.create_region(region_definition(), vec![]).unwrap();

    let imported = dest.merge_from(&side_path).unwrap();
    assert_eq!(imported.len(), 2);
    assert_eq!(dest.list_regions().unwrap().len(), 3);
    assert_eq!(dest.pinned_tile_count(), 6);

    // Merging the same file again duplicates regions (they get new ids)
    // but not resources: the pin counts rise on the same records.
    let again = dest.merge_from(&side_path).unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(dest.pinned_tile_count(), 6, "resources deduplicated");
    assert!(again.iter().all(|r| r.id > existing.id));

    let shared = dest.get("tile|0/0").unwrap().unwrap();
    assert_eq!(shared.pin_count, 2);
}

#[rstest]
fn failed_merge_leaves_the_destination_untouched(temp_dir: TempDir) {
    let side_path = temp_dir.path().join("side.bin");
    side_store_with_regions(&side_path, 1, 5);

    let mut dest = OfflineStore::open(temp_dir.path().join("dest.bin"));
    dest.set_tile_limit(3);

    assert!(matches!(
        dest.merge_from(&side_path),
        Err(StoreError::TileLimitExceeded { limit: 3 })
    ));
    assert!(dest.list_regions().unwrap().is_empty());
    assert_eq!(dest.pinned_tile_count(), 0);
}

#[rstest]
fn merged_state_is_durable(temp_dir: TempDir) {
    let side_path = temp_dir.path().join("side.bin");
    side_store_with_regions(&side_path, 1, 2);

    let dest_path = temp_dir.path().join("dest.bin");
    {
        let mut dest = OfflineStore::open(&dest_path);
        dest.merge_from(&side_path).unwrap();
    }

    let reopened = OfflineStore::open(&dest_path);
    assert_eq!(reopened.list_regions().unwrap().len(), 1);
    assert_eq!(reopened.pinned_tile_count(), 2);
}
