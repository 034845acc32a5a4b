use thiserror::Error;

/// Failure taxonomy for the polling pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceWatchError {
    /// Data source unreachable or returned an unusable payload. The tick is skipped.
    #[error("Fetch unavailable: {0}")]
    FetchUnavailable(String),

    /// Store could not be opened, read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Insert attempted for an id that is already persisted.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Alert delivery failed or timed out. Never escalated.
    #[error("Notify failed: {0}")]
    NotifyFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PriceWatchError>;

impl PriceWatchError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PriceWatchError::FetchUnavailable(_) => "fetch_unavailable",
            PriceWatchError::StorageUnavailable(_) => "storage_unavailable",
            PriceWatchError::DuplicateKey(_) => "duplicate_key",
            PriceWatchError::NotifyFailed(_) => "notify_failed",
            PriceWatchError::Config(_) => "config",
        }
    }
}

impl From<sqlx::Error> for PriceWatchError {
    fn from(err: sqlx::Error) -> Self {
        PriceWatchError::StorageUnavailable(err.to_string())
    }
}
