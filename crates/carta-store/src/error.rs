use thiserror::Error;

use crate::records::RegionId;

/// Result type used by `carta-store`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the record store.
///
/// `UnknownRegion` and `TileLimitExceeded` are logic failures rather
/// than I/O failures; they are kept in this enum because they originate
/// inside store operations, and the file-source layer lifts them into
/// its own taxonomy so callers can branch on cause.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("schema mismatch: side store has version {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("store is not open")]
    NotOpen,

    #[error("unknown offline region: {0}")]
    UnknownRegion(RegionId),

    #[error("offline tile count limit {limit} exceeded")]
    TileLimitExceeded { limit: u64 },
}
