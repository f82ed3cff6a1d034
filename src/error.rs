use std::io;

/// Errors raised by the host's state and history stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid entity id: {0}")]
    InvalidEntityId(String),

    #[error("History IO error: {0}")]
    Io(#[from] io::Error),

    #[error("History record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blocking history task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Join(err.to_string())
    }
}
