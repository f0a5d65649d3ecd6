use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("not initialized: run 'relay init' to write {0}")]
    NotInitialized(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid record state '{0}': must be pending, accepted, rejected, deleted or a numeric code")]
    InvalidState(String),

    #[error("invalid review action '{0}': must be accept or reject")]
    InvalidAction(String),

    #[error("invalid control id '{0}': expected review:<accept|reject>:<record id>")]
    InvalidControlId(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("record {id} is unreadable: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("record already exists: {0}")]
    RecordExists(String),

    #[error("announcement not found: {0}")]
    AnnouncementNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("announcement cache {0} is held by another relay process; stop it or use its /api/cache endpoints")]
    CacheLocked(String),

    #[error("cache database error: {0}")]
    CacheDb(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
