use thiserror::Error;

use wallet_store::StoreError;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("change generation failed: {0}")]
    Sdk(#[from] wallet_sdk::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The shared store mutex was poisoned by a prior panic.
    #[error("internal mutex poisoned by a prior panic")]
    MutexPoisoned,

    /// A `spawn_blocking` task failed to join.
    #[error("task join error: {0}")]
    Task(String),
}

impl BackendError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, BackendError::Sdk(e) if e.is_insufficient_funds())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
