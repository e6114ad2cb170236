use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use carta_store::{
    OfflineRegionDefinition, OfflineStore, RegionId, ResponseMeta, DEFAULT_MAX_AMBIENT_SIZE,
    DEFAULT_TILE_LIMIT,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::{
    error::{FileSourceError, FileSourceResult},
    offline::{OfflineRegion, OfflineRegionDownloadState, OfflineRegionObserver, OfflineRegionStatus},
    request::{AsyncRequest, ResponseSender},
    resource::Resource,
    response::{unix_now, Response},
    source::{properties, FileSource, PropertyValue},
};

type Reply<T> = oneshot::Sender<FileSourceResult<T>>;

/// Mirrored configuration for the synchronous `get_property` surface.
#[derive(Debug)]
struct Props {
    cache_path: PathBuf,
    max_ambient_size: u64,
    tile_limit: u64,
}

/// Cache- and offline-database-backed file source.
///
/// Cheap to clone; all clones feed one background actor which is the
/// sole owner of the [`OfflineStore`]. Commands are handled in arrival
/// order, so a `put` followed by a `request` from the same handle
/// always observes the write.
#[derive(Clone)]
pub struct DatabaseFileSource {
    tx: mpsc::UnboundedSender<DbCommand>,
    props: Arc<Mutex<Props>>,
}

enum DbCommand {
    Request {
        resource: Resource,
        sender: ResponseSender,
    },
    Put {
        key: String,
        body: Vec<u8>,
        meta: ResponseMeta,
        is_tile: bool,
    },
    SetCachePath {
        path: PathBuf,
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<()>,
    },
    InvalidateAmbient {
        reply: Reply<()>,
    },
    ClearAmbient {
        reply: Reply<()>,
    },
    SetMaxAmbientSize {
        bytes: u64,
        reply: Reply<()>,
    },
    ListRegions {
        reply: Reply<Vec<OfflineRegion>>,
    },
    CreateRegion {
        definition: OfflineRegionDefinition,
        metadata: Vec<u8>,
        reply: Reply<OfflineRegion>,
    },
    UpdateRegionMetadata {
        id: RegionId,
        metadata: Vec<u8>,
        reply: Reply<Vec<u8>>,
    },
    SetRegionObserver {
        id: RegionId,
        observer: Box<dyn OfflineRegionObserver>,
    },
    SetRegionDownloadState {
        id: RegionId,
        state: OfflineRegionDownloadState,
    },
    RegionStatus {
        id: RegionId,
        reply: Reply<OfflineRegionStatus>,
    },
    MergeRegions {
        side_path: PathBuf,
        reply: Reply<Vec<OfflineRegion>>,
    },
    DeleteRegion {
        id: RegionId,
        reply: Reply<()>,
    },
    InvalidateRegion {
        id: RegionId,
        reply: Reply<()>,
    },
    SetTileLimit {
        limit: u64,
    },
    PutRegionResource {
        id: RegionId,
        resource: Resource,
        response: Response,
        reply: Reply<()>,
    },
    SetRegionRequired {
        id: RegionId,
        count: u64,
        reply: Reply<()>,
    },
}

impl DatabaseFileSource {
    /// Open (or create) the store at `cache_path` and spawn the actor
    /// onto the current tokio runtime. Construction never fails: a
    /// broken path degrades every operation to a store error until
    /// [`DatabaseFileSource::set_resource_cache_path`] recovers it.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        let props = Arc::new(Mutex::new(Props {
            cache_path: cache_path.clone(),
            max_ambient_size: DEFAULT_MAX_AMBIENT_SIZE,
            tile_limit: DEFAULT_TILE_LIMIT,
        }));
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = DbActor {
            store: OfflineStore::open(cache_path),
            observers: HashMap::new(),
            download_state: HashMap::new(),
            rx,
        };
        tokio::spawn(actor.run());

        Self { tx, props }
    }

    /// Store a response under the resource's cache key, without waiting
    /// for the write.
    pub fn put(&self, resource: &Resource, response: &Response) {
        let _ = self.tx.send(DbCommand::Put {
            key: resource.cache_key(),
            body: response.body.to_vec(),
            meta: response.meta.clone(),
            is_tile: resource.is_tile(),
        });
    }

    /// Relocate the store. Waits for the switch, so a subsequent
    /// `request` is served from the new path.
    pub async fn set_resource_cache_path(&self, path: impl Into<PathBuf>) -> FileSourceResult<()> {
        let path = path.into();
        self.props().cache_path = path.clone();
        self.call(|reply| DbCommand::SetCachePath { path, reply }).await
    }

    /// Destroy and recreate the store. Region ids are not reused.
    pub async fn reset_database(&self) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::Reset { reply }).await
    }

    /// Mark every unpinned cached entry stale, keeping the bytes.
    pub async fn invalidate_ambient_cache(&self) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::InvalidateAmbient { reply }).await
    }

    /// Delete every cached entry not pinned by an offline region.
    pub async fn clear_ambient_cache(&self) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::ClearAmbient { reply }).await
    }

    pub async fn set_maximum_ambient_cache_size(&self, bytes: u64) -> FileSourceResult<()> {
        self.props().max_ambient_size = bytes;
        self.call(|reply| DbCommand::SetMaxAmbientSize { bytes, reply })
            .await
    }

    pub async fn list_offline_regions(&self) -> FileSourceResult<Vec<OfflineRegion>> {
        self.call(|reply| DbCommand::ListRegions { reply }).await
    }

    pub async fn create_offline_region(
        &self,
        definition: OfflineRegionDefinition,
        metadata: Vec<u8>,
    ) -> FileSourceResult<OfflineRegion> {
        self.call(|reply| DbCommand::CreateRegion {
            definition,
            metadata,
            reply,
        })
        .await
    }

    /// Replace a region's opaque metadata, returning the stored bytes.
    pub async fn update_offline_region_metadata(
        &self,
        id: RegionId,
        metadata: Vec<u8>,
    ) -> FileSourceResult<Vec<u8>> {
        self.call(|reply| DbCommand::UpdateRegionMetadata { id, metadata, reply })
            .await
    }

    /// Register the observer notified of this region's download
    /// progress. Replaces any previous observer.
    pub fn set_offline_region_observer(
        &self,
        id: RegionId,
        observer: Box<dyn OfflineRegionObserver>,
    ) {
        let _ = self.tx.send(DbCommand::SetRegionObserver { id, observer });
    }

    pub fn set_offline_region_download_state(
        &self,
        id: RegionId,
        state: OfflineRegionDownloadState,
    ) {
        let _ = self
            .tx
            .send(DbCommand::SetRegionDownloadState { id, state });
    }

    pub async fn offline_region_status(
        &self,
        id: RegionId,
    ) -> FileSourceResult<OfflineRegionStatus> {
        self.call(|reply| DbCommand::RegionStatus { id, reply }).await
    }

    /// Import regions from another store file, deduplicating resources
    /// already present. Returns the imported regions under their new
    /// ids.
    pub async fn merge_offline_regions(
        &self,
        side_path: impl Into<PathBuf>,
    ) -> FileSourceResult<Vec<OfflineRegion>> {
        let side_path = side_path.into();
        self.call(|reply| DbCommand::MergeRegions { side_path, reply })
            .await
    }

    pub async fn delete_offline_region(&self, id: RegionId) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::DeleteRegion { id, reply }).await
    }

    /// Force revalidation of a region's resources without unpinning
    /// them.
    pub async fn invalidate_offline_region(&self, id: RegionId) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::InvalidateRegion { id, reply }).await
    }

    pub fn set_offline_tile_count_limit(&self, limit: u64) {
        self.props().tile_limit = limit;
        let _ = self.tx.send(DbCommand::SetTileLimit { limit });
    }

    /// Persist a downloaded resource into a region, pinning it and
    /// notifying the region observer.
    pub async fn put_region_resource(
        &self,
        id: RegionId,
        resource: Resource,
        response: Response,
    ) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::PutRegionResource {
            id,
            resource,
            response,
            reply,
        })
        .await
    }

    /// Record the download orchestrator's required-resource estimate,
    /// making completeness computable.
    pub async fn set_region_required_resources(
        &self,
        id: RegionId,
        count: u64,
    ) -> FileSourceResult<()> {
        self.call(|reply| DbCommand::SetRegionRequired { id, count, reply })
            .await
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> DbCommand,
    ) -> FileSourceResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| FileSourceError::Shutdown)?;
        rx.await.map_err(|_| FileSourceError::Shutdown)?
    }

    fn props(&self) -> MutexGuard<'_, Props> {
        self.props.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FileSource for DatabaseFileSource {
    fn request(&self, resource: Resource) -> AsyncRequest {
        let (request, sender) = AsyncRequest::channel();
        let _ = self.tx.send(DbCommand::Request { resource, sender });
        request
    }

    /// The database can answer for any resource; it is meant to sit
    /// last in a registry as the cache of record.
    fn can_request(&self, _resource: &Resource) -> bool {
        true
    }

    fn forward(&self, resource: &Resource, response: Response) {
        self.put(resource, &response);
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> FileSourceResult<()> {
        match (name, value) {
            (properties::MAX_AMBIENT_CACHE_SIZE, PropertyValue::U64(bytes)) => {
                self.props().max_ambient_size = bytes;
                let _ = self.tx.send(DbCommand::SetMaxAmbientSize {
                    bytes,
                    reply: oneshot::channel().0,
                });
                Ok(())
            }
            (properties::OFFLINE_TILE_COUNT_LIMIT, PropertyValue::U64(limit)) => {
                self.set_offline_tile_count_limit(limit);
                Ok(())
            }
            (properties::RESOURCE_CACHE_PATH, PropertyValue::Str(path)) => {
                let path = PathBuf::from(path);
                self.props().cache_path = path.clone();
                let _ = self.tx.send(DbCommand::SetCachePath {
                    path,
                    reply: oneshot::channel().0,
                });
                Ok(())
            }
            (name, _) => Err(FileSourceError::UnknownProperty(name.to_string())),
        }
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        let props = self.props();
        match name {
            properties::MAX_AMBIENT_CACHE_SIZE => {
                Some(PropertyValue::U64(props.max_ambient_size))
            }
            properties::OFFLINE_TILE_COUNT_LIMIT => Some(PropertyValue::U64(props.tile_limit)),
            properties::RESOURCE_CACHE_PATH => Some(PropertyValue::Str(
                props.cache_path.to_string_lossy().into_owned(),
            )),
            _ => None,
        }
    }
}

struct DbActor {
    store: OfflineStore,
    observers: HashMap<RegionId, Box<dyn OfflineRegionObserver>>,
    download_state: HashMap<RegionId, OfflineRegionDownloadState>,
    rx: mpsc::UnboundedReceiver<DbCommand>,
}

impl DbActor {
    async fn run(mut self) {
        trace!("database actor started");
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        trace!("database actor stopped");
    }

    fn handle(&mut self, cmd: DbCommand) {
        match cmd {
            DbCommand::Request { resource, sender } => {
                if sender.is_cancelled() {
                    return;
                }
                sender.send(self.lookup(&resource));
            }
            DbCommand::Put {
                key,
                body,
                meta,
                is_tile,
            } => {
                if let Err(e) = self.store.put(&key, body, meta, is_tile) {
                    warn!(%key, error = %e, "cache put failed");
                }
            }
            DbCommand::SetCachePath { path, reply } => {
                let result = self.store.reopen(path).map_err(FileSourceError::from);
                let _ = reply.send(result);
            }
            DbCommand::Reset { reply } => {
                let _ = reply.send(self.store.reset().map_err(FileSourceError::from));
            }
            DbCommand::InvalidateAmbient { reply } => {
                let _ = reply.send(self.store.invalidate_ambient().map_err(FileSourceError::from));
            }
            DbCommand::ClearAmbient { reply } => {
                let _ = reply.send(self.store.clear_ambient().map_err(FileSourceError::from));
            }
            DbCommand::SetMaxAmbientSize { bytes, reply } => {
                let _ = reply.send(
                    self.store
                        .set_maximum_ambient_size(bytes)
                        .map_err(FileSourceError::from),
                );
            }
            DbCommand::ListRegions { reply } => {
                let result = self
                    .store
                    .list_regions()
                    .map(|records| records.into_iter().map(OfflineRegion::from).collect())
                    .map_err(FileSourceError::from);
                let _ = reply.send(result);
            }
            DbCommand::CreateRegion {
                definition,
                metadata,
                reply,
            } => {
                let result = self
                    .store
                    .create_region(definition, metadata)
                    .map(OfflineRegion::from)
                    .map_err(FileSourceError::from);
                let _ = reply.send(result);
            }
            DbCommand::UpdateRegionMetadata { id, metadata, reply } => {
                let result = self
                    .store
                    .update_region_metadata(id, metadata)
                    .map_err(FileSourceError::from);
                let _ = reply.send(result);
            }
            DbCommand::SetRegionObserver { id, observer } => {
                self.observers.insert(id, observer);
            }
            DbCommand::SetRegionDownloadState { id, state } => {
                debug!(region = id, ?state, "download state changed");
                self.download_state.insert(id, state);
                self.notify_status(id);
            }
            DbCommand::RegionStatus { id, reply } => {
                let _ = reply.send(self.region_status(id));
            }
            DbCommand::MergeRegions { side_path, reply } => {
                let result = self
                    .store
                    .merge_from(&side_path)
                    .map(|records| records.into_iter().map(OfflineRegion::from).collect())
                    .map_err(FileSourceError::from);
                let _ = reply.send(result);
            }
            DbCommand::DeleteRegion { id, reply } => {
                let result = self.store.delete_region(id).map_err(FileSourceError::from);
                if result.is_ok() {
                    self.observers.remove(&id);
                    self.download_state.remove(&id);
                }
                let _ = reply.send(result);
            }
            DbCommand::InvalidateRegion { id, reply } => {
                let _ = reply.send(self.store.invalidate_region(id).map_err(FileSourceError::from));
            }
            DbCommand::SetTileLimit { limit } => {
                self.store.set_tile_limit(limit);
            }
            DbCommand::PutRegionResource {
                id,
                resource,
                response,
                reply,
            } => {
                let _ = reply.send(self.put_region_resource(id, &resource, response));
            }
            DbCommand::SetRegionRequired { id, count, reply } => {
                let result = self
                    .store
                    .set_region_required(id, count)
                    .map_err(FileSourceError::from);
                if result.is_ok() {
                    self.notify_status(id);
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Cache lookup only; a miss is an error, never a network fetch.
    fn lookup(&mut self, resource: &Resource) -> FileSourceResult<Response> {
        let key = resource.cache_key();
        match self.store.get(&key)? {
            Some(record) => {
                let stale = record.stale || record.meta.is_expired(unix_now());
                Ok(Response::from_record(record.body, record.meta, stale))
            }
            None => Err(FileSourceError::NotCached(key)),
        }
    }

    fn put_region_resource(
        &mut self,
        id: RegionId,
        resource: &Resource,
        response: Response,
    ) -> FileSourceResult<()> {
        let result = self
            .store
            .mark_region_resource(
                id,
                &resource.cache_key(),
                response.body.to_vec(),
                response.meta,
                resource.is_tile(),
            )
            .map_err(FileSourceError::from);

        match &result {
            Ok(()) => {
                if self.is_active(id) {
                    self.notify_status(id);
                }
            }
            // The quota notification fires regardless of download state.
            Err(FileSourceError::TileLimitExceeded { limit }) => {
                if let Some(observer) = self.observers.get(&id) {
                    observer.tile_count_limit_exceeded(*limit);
                }
            }
            Err(error) => {
                if self.is_active(id) {
                    if let Some(observer) = self.observers.get(&id) {
                        observer.error(error);
                    }
                }
            }
        }
        result
    }

    fn is_active(&self, id: RegionId) -> bool {
        matches!(
            self.download_state.get(&id),
            Some(OfflineRegionDownloadState::Active)
        )
    }

    fn region_status(&self, id: RegionId) -> FileSourceResult<OfflineRegionStatus> {
        let stats = self.store.region_stats(id)?;
        let state = self
            .download_state
            .get(&id)
            .copied()
            .unwrap_or_default();
        Ok(OfflineRegionStatus::from_stats(stats, state))
    }

    fn notify_status(&self, id: RegionId) {
        let Some(observer) = self.observers.get(&id) else {
            return;
        };
        match self.region_status(id) {
            Ok(status) => observer.status_changed(&status),
            Err(error) => observer.error(&error),
        }
    }
}
