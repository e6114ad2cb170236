use std::sync::Arc;

use crate::{request::AsyncRequest, resource::Resource, response::Response, FileSourceResult};

/// Well-known property names accepted by [`FileSource::set_property`].
pub mod properties {
    pub const API_BASE_URL: &str = "api-base-url";
    pub const ACCESS_TOKEN: &str = "access-token";
    pub const MAX_CONCURRENT_REQUESTS: &str = "max-concurrent-requests";
    pub const ONLINE: &str = "online";
    pub const MAX_AMBIENT_CACHE_SIZE: &str = "maximum-ambient-cache-size";
    pub const OFFLINE_TILE_COUNT_LIMIT: &str = "offline-tile-count-limit";
    pub const RESOURCE_CACHE_PATH: &str = "resource-cache-path";
}

/// Dynamically-typed property value for source configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    U64(u64),
    Bool(bool),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Anything able to answer resource requests.
///
/// `request` never blocks: implementations hand the work to their
/// background task and return the [`AsyncRequest`] handle immediately.
pub trait FileSource: Send + Sync {
    fn request(&self, resource: Resource) -> AsyncRequest;

    /// Whether this source is willing to serve `resource` at all.
    fn can_request(&self, resource: &Resource) -> bool;

    /// Observe a response obtained elsewhere, e.g. to warm a cache.
    /// Default is to ignore it.
    fn forward(&self, resource: &Resource, response: Response) {
        let _ = (resource, response);
    }

    /// Stop issuing new work. Queued requests are kept, not dropped.
    fn pause(&self) {}

    /// Resume after [`FileSource::pause`].
    fn resume(&self) {}

    fn set_property(&self, name: &str, value: PropertyValue) -> FileSourceResult<()> {
        let _ = value;
        Err(crate::FileSourceError::UnknownProperty(name.to_string()))
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        let _ = name;
        None
    }
}

/// Ordered collection of sources; the first source whose `can_request`
/// accepts a resource serves it.
#[derive(Clone, Default)]
pub struct FileSourceRegistry {
    sources: Vec<Arc<dyn FileSource>>,
}

impl FileSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn FileSource>) {
        self.sources.push(source);
    }

    pub fn source_for(&self, resource: &Resource) -> Option<Arc<dyn FileSource>> {
        self.sources
            .iter()
            .find(|s| s.can_request(resource))
            .cloned()
    }

    /// Route a request to the first accepting source, or `None` when no
    /// registered source can serve it.
    pub fn request(&self, resource: Resource) -> Option<AsyncRequest> {
        self.source_for(&resource)
            .map(|source| source.request(resource))
    }
}
