#![forbid(unsafe_code)]

//! `carta-filesource`
//!
//! Resource loading pipeline for the carta map client. A [`Resource`]
//! describes what the renderer wants; a [`FileSource`] answers it with a
//! [`Response`], either over the network ([`OnlineFileSource`]) or from
//! the persistent cache/offline database ([`DatabaseFileSource`]).
//!
//! ## Cancellation (normative)
//!
//! Every `request` returns an [`AsyncRequest`] handle. Dropping or
//! cancelling the handle guarantees the caller never observes a result
//! afterwards; the handle types make cancel-then-await unrepresentable.
//!
//! ## Concurrency
//!
//! Both concrete sources are actors: a cheap cloneable handle feeds a
//! single background task over an mpsc channel. The database actor is
//! the sole owner of the [`carta_store::OfflineStore`], which gives
//! read-your-writes ordering per handle without locks around the store.

mod database;
mod error;
mod offline;
mod online;
mod request;
mod resource;
mod response;
mod source;

pub use database::DatabaseFileSource;
pub use error::{FileSourceError, FileSourceResult};
pub use offline::{
    OfflineRegion, OfflineRegionDownloadState, OfflineRegionObserver, OfflineRegionStatus,
};
pub use online::{OnlineFileSource, ResourceTransform, DEFAULT_MAX_CONCURRENT_REQUESTS};
pub use request::AsyncRequest;
pub use resource::{Resource, ResourceKind, ResourcePriority, ResourceUsage};
pub use response::Response;
pub use source::{properties, FileSource, FileSourceRegistry, PropertyValue};

// Re-exported so callers configuring regions need only this crate.
pub use carta_store::{OfflineRegionDefinition, RegionId};

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    pub use crate::offline::OfflineRegionObserverMock;
}
