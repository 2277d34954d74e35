use segment_loader::{LoaderError, LoaderErrorDetail};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Load failed: {0}")]
    Load(LoaderErrorDetail),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("{0}")]
    Playback(String),

    #[error("Playback cancelled")]
    Cancelled,
}

impl AppError {
    /// Whether reloading the same resource may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Load(detail) => detail.retryable,
            AppError::Loader(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(error: toml::de::Error) -> Self {
        AppError::Config(error.to_string())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
