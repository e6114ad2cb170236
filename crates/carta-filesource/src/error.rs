use carta_net::NetError;
use carta_store::StoreError;
use thiserror::Error;

/// Result type used across the file-source pipeline.
pub type FileSourceResult<T> = Result<T, FileSourceError>;

/// Errors surfaced to resource requesters.
///
/// Transport failures keep the [`NetError`] cause so callers can branch
/// on retryability; store logic failures that callers act on
/// (`UnknownRegion`, `TileLimitExceeded`) are lifted to top-level
/// variants instead of being buried inside [`FileSourceError::Store`].
#[derive(Debug, Error)]
pub enum FileSourceError {
    #[error(transparent)]
    Network(#[from] NetError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("resource not cached: {0}")]
    NotCached(String),

    #[error("unknown offline region: {0}")]
    UnknownRegion(i64),

    #[error("unknown file source property: {0}")]
    UnknownProperty(String),

    #[error("offline tile count limit {limit} exceeded")]
    TileLimitExceeded { limit: u64 },

    #[error("file source is offline")]
    Offline,

    #[error("file source shut down")]
    Shutdown,
}

impl From<StoreError> for FileSourceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownRegion(id) => Self::UnknownRegion(id),
            StoreError::TileLimitExceeded { limit } => Self::TileLimitExceeded { limit },
            other => Self::Store(other),
        }
    }
}

impl FileSourceError {
    /// Whether retrying the same request may succeed without any caller
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Offline => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn store_logic_errors_are_lifted() {
        let e: FileSourceError = StoreError::UnknownRegion(7).into();
        assert!(matches!(e, FileSourceError::UnknownRegion(7)));

        let e: FileSourceError = StoreError::TileLimitExceeded { limit: 100 }.into();
        assert!(matches!(
            e,
            FileSourceError::TileLimitExceeded { limit: 100 }
        ));

        let e: FileSourceError = StoreError::NotOpen.into();
        assert!(matches!(e, FileSourceError::Store(StoreError::NotOpen)));
    }

    #[rstest]
    #[case::timeout(FileSourceError::Network(NetError::Timeout), true)]
    #[case::offline(FileSourceError::Offline, true)]
    #[case::not_cached(FileSourceError::NotCached("k".into()), false)]
    #[case::shutdown(FileSourceError::Shutdown, false)]
    #[case::store(FileSourceError::Store(StoreError::NotOpen), false)]
    fn retryability_follows_cause(#[case] error: FileSourceError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }
}
