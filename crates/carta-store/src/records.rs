use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Version of the on-disk snapshot format. A side store with a different
/// version cannot be merged; our own snapshot is recreated on mismatch.
pub const SCHEMA_VERSION: u32 = 1;

/// Identifier of an offline region. Monotonically assigned, never reused
/// within the lifetime of a store value.
pub type RegionId = i64;

/// HTTP-like validators persisted alongside a cached response body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub etag: Option<String>,
    /// Expiry as Unix seconds; `None` means no explicit expiry.
    pub expires: Option<u64>,
    pub must_revalidate: bool,
}

impl ResponseMeta {
    /// Whether the entry is past its explicit expiry at `now` (Unix seconds).
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }
}

/// One persisted response, keyed by the resource cache key.
///
/// `pin_count` is the number of offline regions referencing this record;
/// while it is non-zero the record is exempt from ambient eviction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AmbientRecord {
    pub body: Vec<u8>,
    pub meta: ResponseMeta,
    pub size: u64,
    /// Logical recency clock, bumped on every read or write.
    pub last_access: u64,
    /// Marked by invalidation: the body is kept but the next consumer
    /// must revalidate before trusting it.
    pub stale: bool,
    pub pin_count: u32,
    /// Whether this record counts toward the pinned-tile quota.
    pub is_tile: bool,
}

/// Geographic/style bounds of an offline region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfflineRegionDefinition {
    pub style_url: String,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub pixel_ratio: f32,
}

/// One persisted offline region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionRecord {
    pub id: RegionId,
    pub definition: OfflineRegionDefinition,
    /// Opaque user bytes; the store never interprets them.
    pub metadata: Vec<u8>,
    /// Cache keys of resources downloaded for this region.
    pub resources: BTreeSet<String>,
    /// Required-resource estimate maintained by the download
    /// orchestrator; completeness is derived against it.
    pub required_resources: u64,
}

/// Derived, read-only download progress for one region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub completed_resources: u64,
    pub completed_bytes: u64,
    pub completed_tiles: u64,
    pub completed_tile_bytes: u64,
    pub required_resources: u64,
}

impl RegionStats {
    /// A region is complete once every required resource is persisted.
    /// With no requirement recorded yet, it is not complete.
    pub fn is_complete(&self) -> bool {
        self.required_resources > 0 && self.completed_resources >= self.required_resources
    }
}

/// On-disk snapshot (private format; bincode via serde).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub version: u32,
    pub next_region_id: RegionId,
    pub clock: u64,
    pub ambient: HashMap<String, AmbientRecord>,
    pub regions: BTreeMap<RegionId, RegionRecord>,
}

impl Snapshot {
    pub fn empty(next_region_id: RegionId) -> Self {
        Self {
            version: SCHEMA_VERSION,
            next_region_id,
            clock: 0,
            ambient: HashMap::new(),
            regions: BTreeMap::new(),
        }
    }
}
