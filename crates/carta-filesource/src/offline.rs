use carta_store::{OfflineRegionDefinition, RegionId, RegionRecord, RegionStats};

use crate::error::FileSourceError;

/// Caller-facing view of one persisted offline region.
#[derive(Clone, Debug, PartialEq)]
pub struct OfflineRegion {
    pub id: RegionId,
    pub definition: OfflineRegionDefinition,
    /// Opaque application bytes, round-tripped verbatim.
    pub metadata: Vec<u8>,
}

impl From<RegionRecord> for OfflineRegion {
    fn from(record: RegionRecord) -> Self {
        Self {
            id: record.id,
            definition: record.definition,
            metadata: record.metadata,
        }
    }
}

/// Whether an external orchestrator is currently downloading a region.
/// The file source records the flag and gates observer notifications on
/// it; it does not drive downloads itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OfflineRegionDownloadState {
    #[default]
    Inactive,
    Active,
}

/// Download progress for one region, derived from persisted state at
/// query time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OfflineRegionStatus {
    pub download_state: OfflineRegionDownloadState,
    pub completed_resource_count: u64,
    pub completed_resource_size: u64,
    pub completed_tile_count: u64,
    pub completed_tile_size: u64,
    pub required_resource_count: u64,
    /// False until the orchestrator has finished enumerating the
    /// region's tile pyramid.
    pub required_resource_count_is_precise: bool,
}

impl OfflineRegionStatus {
    pub(crate) fn from_stats(stats: RegionStats, download_state: OfflineRegionDownloadState) -> Self {
        Self {
            download_state,
            completed_resource_count: stats.completed_resources,
            completed_resource_size: stats.completed_bytes,
            completed_tile_count: stats.completed_tiles,
            completed_tile_size: stats.completed_tile_bytes,
            required_resource_count: stats.required_resources,
            required_resource_count_is_precise: stats.required_resources > 0,
        }
    }

    /// Complete once every required resource is persisted. Never true
    /// while the requirement is still unknown.
    pub fn complete(&self) -> bool {
        self.required_resource_count > 0
            && self.completed_resource_count >= self.required_resource_count
    }
}

/// Receiver of region download notifications. Registered per region;
/// notifications fire only while the region's download state is
/// [`OfflineRegionDownloadState::Active`], except for quota errors,
/// which always fire.
#[cfg_attr(
    any(test, feature = "mock"),
    unimock::unimock(api = OfflineRegionObserverMock)
)]
pub trait OfflineRegionObserver: Send {
    fn status_changed(&self, status: &OfflineRegionStatus) {
        let _ = status;
    }

    fn error(&self, error: &FileSourceError) {
        let _ = error;
    }

    fn tile_count_limit_exceeded(&self, limit: u64) {
        let _ = limit;
    }
}
