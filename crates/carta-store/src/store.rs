use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    atomic::write_atomic,
    error::{StoreError, StoreResult},
    records::{
        AmbientRecord, OfflineRegionDefinition, RegionId, RegionRecord, RegionStats, ResponseMeta,
        Snapshot, SCHEMA_VERSION,
    },
};

/// Default ambient-cache byte budget (matches the upstream map client).
pub const DEFAULT_MAX_AMBIENT_SIZE: u64 = 50 * 1024 * 1024;

/// Default process-wide pinned-tile quota.
pub const DEFAULT_TILE_LIMIT: u64 = 6000;

/// Single-owner persistent store for ambient cache entries and offline
/// regions.
///
/// A store that fails to open does not fail construction: every
/// operation reports [`StoreError::NotOpen`] until a later
/// [`OfflineStore::reopen`] succeeds. This keeps construction-time
/// failures out of the actor's spawn path.
pub struct OfflineStore {
    path: PathBuf,
    snapshot: Option<Snapshot>,
    max_ambient_size: u64,
    tile_limit: u64,
    /// Floor for region ids, carried across `reset`/`reopen` so ids are
    /// never reused while this value is alive.
    id_floor: RegionId,
}

impl OfflineStore {
    /// Open or create a store at `path`. Never fails; a broken path
    /// degrades to a store answering `NotOpen` per operation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match Self::load_or_create(&path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store open failed, degrading");
                None
            }
        };
        let id_floor = snapshot.as_ref().map_or(1, |s| s.next_region_id);

        Self {
            path,
            snapshot,
            max_ambient_size: DEFAULT_MAX_AMBIENT_SIZE,
            tile_limit: DEFAULT_TILE_LIMIT,
            id_floor,
        }
    }

    /// Relocate the store to a new path, opening or creating it there.
    ///
    /// On failure the store degrades to `NotOpen`; no operation ever
    /// spans the old and the new path.
    pub fn reopen(&mut self, path: impl Into<PathBuf>) -> StoreResult<()> {
        let path = path.into();
        let mut snapshot = Self::load_or_create(&path).inspect_err(|_| {
            self.snapshot = None;
        })?;

        snapshot.next_region_id = snapshot.next_region_id.max(self.id_floor);
        debug!(path = %path.display(), "store reopened");

        self.path = path;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Destroy and recreate the store structure. All ambient entries and
    /// regions are lost; the region-id counter is preserved.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.id_floor = self
            .snapshot
            .as_ref()
            .map_or(self.id_floor, |s| s.next_region_id.max(self.id_floor));

        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }

        self.snapshot = Some(Snapshot::empty(self.id_floor));
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Ambient cache

    /// Write or overwrite the ambient entry for `key`, then evict down
    /// to the configured budget. An existing pin survives the overwrite.
    pub fn put(
        &mut self,
        key: &str,
        body: Vec<u8>,
        meta: ResponseMeta,
        is_tile: bool,
    ) -> StoreResult<()> {
        let max = self.max_ambient_size;
        let snapshot = self.state_mut()?;

        snapshot.clock += 1;
        let clock = snapshot.clock;
        let size = body.len() as u64;

        if let Some(record) = snapshot.ambient.get_mut(key) {
            record.body = body;
            record.meta = meta;
            record.size = size;
            record.last_access = clock;
            record.stale = false;
        } else {
            snapshot.ambient.insert(
                key.to_string(),
                AmbientRecord {
                    body,
                    meta,
                    size,
                    last_access: clock,
                    stale: false,
                    pin_count: 0,
                    is_tile,
                },
            );
        }

        Self::evict_to_budget(snapshot, max);
        self.save()
    }

    /// Look up the ambient entry for `key`, bumping its recency.
    pub fn get(&mut self, key: &str) -> StoreResult<Option<AmbientRecord>> {
        let snapshot = self.state_mut()?;

        let Some(record) = snapshot.ambient.get_mut(key) else {
            return Ok(None);
        };

        snapshot.clock += 1;
        record.last_access = snapshot.clock;
        let out = record.clone();

        self.save()?;
        Ok(Some(out))
    }

    /// Mark every unpinned ambient entry stale, keeping payload bytes.
    /// Region-pinned data is preserved as-is.
    pub fn invalidate_ambient(&mut self) -> StoreResult<()> {
        let snapshot = self.state_mut()?;
        for record in snapshot.ambient.values_mut() {
            if record.pin_count == 0 {
                record.stale = true;
            }
        }
        self.save()
    }

    /// Delete every ambient entry not referenced by any offline region.
    pub fn clear_ambient(&mut self) -> StoreResult<()> {
        let snapshot = self.state_mut()?;
        snapshot.ambient.retain(|_, record| record.pin_count > 0);
        self.save()
    }

    /// Update the eviction budget and immediately evict if over it.
    pub fn set_maximum_ambient_size(&mut self, bytes: u64) -> StoreResult<()> {
        self.max_ambient_size = bytes;
        let max = self.max_ambient_size;
        let snapshot = self.state_mut()?;
        Self::evict_to_budget(snapshot, max);
        self.save()
    }

    /// Total size of unpinned ambient entries. Pinned records are
    /// governed by the tile quota, not the ambient budget.
    pub fn ambient_total_size(&self) -> u64 {
        self.snapshot.as_ref().map_or(0, |s| {
            s.ambient
                .values()
                .filter(|r| r.pin_count == 0)
                .map(|r| r.size)
                .sum()
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.ambient.contains_key(key))
    }

    // Offline regions

    pub fn list_regions(&self) -> StoreResult<Vec<RegionRecord>> {
        Ok(self.state()?.regions.values().cloned().collect())
    }

    pub fn get_region(&self, id: RegionId) -> StoreResult<RegionRecord> {
        self.state()?
            .regions
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownRegion(id))
    }

    /// Persist a new region under a fresh, never-reused id.
    pub fn create_region(
        &mut self,
        definition: OfflineRegionDefinition,
        metadata: Vec<u8>,
    ) -> StoreResult<RegionRecord> {
        let snapshot = self.state_mut()?;

        let id = snapshot.next_region_id;
        snapshot.next_region_id += 1;

        let record = RegionRecord {
            id,
            definition,
            metadata,
            resources: Default::default(),
            required_resources: 0,
        };
        snapshot.regions.insert(id, record.clone());

        debug!(region = id, "offline region created");
        self.save()?;
        Ok(record)
    }

    /// Replace the opaque metadata of an existing region.
    pub fn update_region_metadata(
        &mut self,
        id: RegionId,
        metadata: Vec<u8>,
    ) -> StoreResult<Vec<u8>> {
        let snapshot = self.state_mut()?;
        let region = snapshot
            .regions
            .get_mut(&id)
            .ok_or(StoreError::UnknownRegion(id))?;
        region.metadata = metadata.clone();
        self.save()?;
        Ok(metadata)
    }

    /// Record the orchestrator's required-resource estimate for a region.
    pub fn set_region_required(&mut self, id: RegionId, count: u64) -> StoreResult<()> {
        let snapshot = self.state_mut()?;
        let region = snapshot
            .regions
            .get_mut(&id)
            .ok_or(StoreError::UnknownRegion(id))?;
        region.required_resources = count;
        self.save()
    }

    /// Persist a downloaded resource into a region, pinning it.
    ///
    /// Fails with `TileLimitExceeded` (before mutating anything) if
    /// pinning a new tile would push the process-wide quota over.
    pub fn mark_region_resource(
        &mut self,
        id: RegionId,
        key: &str,
        body: Vec<u8>,
        meta: ResponseMeta,
        is_tile: bool,
    ) -> StoreResult<()> {
        let tile_limit = self.tile_limit;
        let pinned_tiles = self.pinned_tile_count();
        let snapshot = self.state_mut()?;

        if !snapshot.regions.contains_key(&id) {
            return Err(StoreError::UnknownRegion(id));
        }

        let already_pinned_tile = snapshot
            .ambient
            .get(key)
            .is_some_and(|r| r.pin_count > 0 && r.is_tile);
        if is_tile && !already_pinned_tile && pinned_tiles + 1 > tile_limit {
            return Err(StoreError::TileLimitExceeded { limit: tile_limit });
        }

        snapshot.clock += 1;
        let clock = snapshot.clock;
        let size = body.len() as u64;

        if let Some(record) = snapshot.ambient.get_mut(key) {
            record.body = body;
            record.meta = meta;
            record.size = size;
            record.last_access = clock;
            record.stale = false;
        } else {
            snapshot.ambient.insert(
                key.to_string(),
                AmbientRecord {
                    body,
                    meta,
                    size,
                    last_access: clock,
                    stale: false,
                    pin_count: 0,
                    is_tile,
                },
            );
        }

        // Pin only on the first association with this region.
        let region = snapshot
            .regions
            .get_mut(&id)
            .ok_or(StoreError::UnknownRegion(id))?;
        if region.resources.insert(key.to_string()) {
            if let Some(record) = snapshot.ambient.get_mut(key) {
                record.pin_count += 1;
            }
        }

        self.save()
    }

    /// Remove a region, unpinning its resources. A resource whose pin
    /// count reaches zero is dropped unless it is still ambient-fresh;
    /// survivors rejoin the ambient budget and may be evicted.
    pub fn delete_region(&mut self, id: RegionId) -> StoreResult<()> {
        let max = self.max_ambient_size;
        let snapshot = self.state_mut()?;

        let region = snapshot
            .regions
            .remove(&id)
            .ok_or(StoreError::UnknownRegion(id))?;

        for key in &region.resources {
            let Some(record) = snapshot.ambient.get_mut(key) else {
                continue;
            };
            record.pin_count = record.pin_count.saturating_sub(1);
            if record.pin_count == 0 && record.stale {
                snapshot.ambient.remove(key);
            }
        }

        Self::evict_to_budget(snapshot, max);
        debug!(region = id, "offline region deleted");
        self.save()
    }

    /// Mark one region's resources stale (forcing revalidation) without
    /// releasing the pins.
    pub fn invalidate_region(&mut self, id: RegionId) -> StoreResult<()> {
        let snapshot = self.state_mut()?;

        let region = snapshot
            .regions
            .get(&id)
            .ok_or(StoreError::UnknownRegion(id))?;
        let keys: Vec<String> = region.resources.iter().cloned().collect();

        for key in keys {
            if let Some(record) = snapshot.ambient.get_mut(&key) {
                record.stale = true;
            }
        }
        self.save()
    }

    /// Derived download progress, recomputed from the persisted
    /// resource set. Nothing is stored.
    pub fn region_stats(&self, id: RegionId) -> StoreResult<RegionStats> {
        let snapshot = self.state()?;
        let region = snapshot
            .regions
            .get(&id)
            .ok_or(StoreError::UnknownRegion(id))?;

        let mut stats = RegionStats {
            required_resources: region.required_resources,
            ..Default::default()
        };

        for key in &region.resources {
            let Some(record) = snapshot.ambient.get(key) else {
                continue;
            };
            stats.completed_resources += 1;
            stats.completed_bytes += record.size;
            if record.is_tile {
                stats.completed_tiles += 1;
                stats.completed_tile_bytes += record.size;
            }
        }

        Ok(stats)
    }

    /// Import regions and their pinned resources from another store
    /// file. Imported regions get fresh ids; resources already present
    /// here are deduplicated (the existing copy is pinned). The merge is
    /// validated before anything is applied.
    pub fn merge_from(&mut self, side_path: &Path) -> StoreResult<Vec<RegionRecord>> {
        let side = Self::load_strict(side_path)?;
        let tile_limit = self.tile_limit;
        let pinned_tiles = self.pinned_tile_count();
        let snapshot = self.state_mut()?;

        // Validation pass: tiles that would become newly pinned.
        let mut new_tile_keys: HashSet<&String> = HashSet::new();
        for region in side.regions.values() {
            for key in &region.resources {
                let dest_pinned_tile = snapshot
                    .ambient
                    .get(key)
                    .map(|r| (r.pin_count > 0, r.is_tile));
                let is_tile = match dest_pinned_tile {
                    Some((true, true)) => continue,
                    Some((_, t)) => t,
                    None => side.ambient.get(key).is_some_and(|r| r.is_tile),
                };
                if is_tile {
                    new_tile_keys.insert(key);
                }
            }
        }
        if pinned_tiles + new_tile_keys.len() as u64 > tile_limit {
            return Err(StoreError::TileLimitExceeded { limit: tile_limit });
        }

        // Apply pass.
        let mut imported = Vec::with_capacity(side.regions.len());
        for region in side.regions.values() {
            let id = snapshot.next_region_id;
            snapshot.next_region_id += 1;

            let mut resources = std::collections::BTreeSet::new();
            for key in &region.resources {
                snapshot.clock += 1;
                let clock = snapshot.clock;

                if let Some(record) = snapshot.ambient.get_mut(key) {
                    // Deduplicated: pin the existing copy.
                    record.pin_count += 1;
                    record.last_access = clock;
                } else if let Some(side_record) = side.ambient.get(key) {
                    snapshot.ambient.insert(
                        key.clone(),
                        AmbientRecord {
                            body: side_record.body.clone(),
                            meta: side_record.meta.clone(),
                            size: side_record.size,
                            last_access: clock,
                            stale: side_record.stale,
                            pin_count: 1,
                            is_tile: side_record.is_tile,
                        },
                    );
                } else {
                    // Side store is inconsistent for this key; skip it.
                    continue;
                }
                resources.insert(key.clone());
            }

            let record = RegionRecord {
                id,
                definition: region.definition.clone(),
                metadata: region.metadata.clone(),
                resources,
                required_resources: region.required_resources,
            };
            snapshot.regions.insert(id, record.clone());
            imported.push(record);
        }

        debug!(
            side = %side_path.display(),
            regions = imported.len(),
            "merged side store"
        );
        self.save()?;
        Ok(imported)
    }

    // Quota

    pub fn set_tile_limit(&mut self, limit: u64) {
        self.tile_limit = limit;
    }

    pub fn tile_limit(&self) -> u64 {
        self.tile_limit
    }

    /// Number of distinct pinned tile resources across all regions.
    pub fn pinned_tile_count(&self) -> u64 {
        self.snapshot.as_ref().map_or(0, |s| {
            s.ambient
                .values()
                .filter(|r| r.pin_count > 0 && r.is_tile)
                .count() as u64
        })
    }

    // Internals

    fn state(&self) -> StoreResult<&Snapshot> {
        self.snapshot.as_ref().ok_or(StoreError::NotOpen)
    }

    fn state_mut(&mut self) -> StoreResult<&mut Snapshot> {
        self.snapshot.as_mut().ok_or(StoreError::NotOpen)
    }

    /// Evict oldest-recency-first unpinned entries until within budget.
    fn evict_to_budget(snapshot: &mut Snapshot, max: u64) {
        loop {
            let total: u64 = snapshot
                .ambient
                .values()
                .filter(|r| r.pin_count == 0)
                .map(|r| r.size)
                .sum();
            if total <= max {
                return;
            }

            let Some(oldest) = snapshot
                .ambient
                .iter()
                .filter(|(_, r)| r.pin_count == 0)
                .min_by_key(|(_, r)| r.last_access)
                .map(|(k, _)| k.clone())
            else {
                return;
            };

            debug!(key = %oldest, "evicting ambient entry");
            snapshot.ambient.remove(&oldest);
        }
    }

    /// Best-effort load for our own path: missing, corrupt, or
    /// schema-incompatible snapshots are recreated empty.
    fn load_or_create(path: &Path) -> StoreResult<Snapshot> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Snapshot::empty(1));
            }
            Err(e) => return Err(e.into()),
        };

        match bincode::serde::decode_from_slice::<Snapshot, _>(&bytes, bincode::config::legacy()) {
            Ok((snapshot, _)) if snapshot.version == SCHEMA_VERSION => Ok(snapshot),
            Ok((snapshot, _)) => {
                warn!(
                    path = %path.display(),
                    found = snapshot.version,
                    expected = SCHEMA_VERSION,
                    "snapshot schema changed, recreating store"
                );
                Ok(Snapshot::empty(snapshot.next_region_id))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt snapshot, recreating store");
                Ok(Snapshot::empty(1))
            }
        }
    }

    /// Strict load for merge sources: any unreadable, corrupt, or
    /// version-mismatched side store is a hard error.
    fn load_strict(path: &Path) -> StoreResult<Snapshot> {
        let bytes = fs::read(path)?;
        let (snapshot, _) =
            bincode::serde::decode_from_slice::<Snapshot, _>(&bytes, bincode::config::legacy())
                .map_err(|e| StoreError::Codec(e.to_string()))?;

        if snapshot.version != SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                found: snapshot.version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(snapshot)
    }

    fn save(&self) -> StoreResult<()> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Err(StoreError::NotOpen);
        };

        let bytes = bincode::serde::encode_to_vec(snapshot, bincode::config::legacy())
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}
