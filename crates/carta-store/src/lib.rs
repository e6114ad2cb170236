#![forbid(unsafe_code)]

//! `carta-store`
//!
//! Persistent keyed record store backing the ambient cache and the
//! offline-region set of the carta file-source subsystem.
//!
//! ## Ownership (normative)
//!
//! [`OfflineStore`] is synchronous and must be owned by exactly one
//! logical worker (the `DatabaseFileSource` actor). Callers never touch
//! it directly; all access is serialized through that owner, which is
//! what makes the per-key write ordering and budget invariants hold
//! without internal locking.
//!
//! ## Persistence
//!
//! The whole store is a schema-versioned snapshot (bincode) written
//! atomically via temp-file + rename on every mutation. Load / modify /
//! store of the whole object keeps the on-disk format an implementation
//! detail of this crate.
//!
//! ## Invariants
//!
//! - After any `put` returns, the unpinned ambient total is within the
//!   configured budget (eviction runs on the write path, oldest
//!   recency first).
//! - A record with `pin_count > 0` is never evicted or cleared; only
//!   region deletion can drop it.
//! - Region ids are monotonic and never reused while the store value is
//!   alive, including across `reset()`.

mod atomic;
mod error;
mod records;
mod store;

pub use error::{StoreError, StoreResult};
pub use records::{
    AmbientRecord, OfflineRegionDefinition, RegionId, RegionRecord, RegionStats, ResponseMeta,
    SCHEMA_VERSION,
};
pub use store::{OfflineStore, DEFAULT_MAX_AMBIENT_SIZE, DEFAULT_TILE_LIMIT};
