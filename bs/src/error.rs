//! Store error types

use thiserror::Error;

/// Errors from document store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Volume index {0} out of range")]
    VolumeNotFound(usize),

    #[error("Chapter index {chapter} out of range in volume {volume}")]
    ChapterNotFound { volume: usize, chapter: usize },

    #[error("Name already exists: {0}")]
    NameCollision(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Check if this error is a sibling name collision
    pub fn is_name_collision(&self) -> bool {
        matches!(self, StoreError::NameCollision(_))
    }
}
