use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AssayError {
    #[error("failed to load configuration {path}: {reason}")]
    ConfigLoadError { path: PathBuf, reason: String },

    #[error("analysis interrupted because the run was cancelled")]
    Cancelled,

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engine transport error: {0}")]
    TransportError(String),

    #[error("engine error: {0}")]
    EngineError(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    FigmentError(#[from] figment::Error),
}

impl AssayError {
    /// The engine connection can no longer be trusted; the run must end.
    pub fn is_engine_failure(&self) -> bool {
        matches!(self, AssayError::TransportError(_) | AssayError::EngineUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, AssayError>;
