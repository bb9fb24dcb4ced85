//! Error types shared across the PowerTools core.

use crate::infrastructure::dom::DomError;
use thiserror::Error;

pub type PowerToolsResult<T> = Result<T, PowerToolsError>;

#[derive(Debug, Error)]
pub enum PowerToolsError {
    #[error("Deletion already in progress")]
    AlreadyRunning,

    #[error("Model is generating a response")]
    ModelGenerating,

    #[error("No turns to delete")]
    NoMatchingTurns,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl PowerToolsError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Precondition faults are rejected before any state is touched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning | Self::ModelGenerating | Self::NoMatchingTurns | Self::NotFound(_)
        )
    }
}
