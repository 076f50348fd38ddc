use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaqError {
    /// The embedding model could not be loaded or failed to encode input.
    /// Retrieval cannot proceed without it, so this is never downgraded to a miss.
    #[error("embedder unavailable: {0:#}")]
    EmbedderUnavailable(anyhow::Error),

    #[error("embedding dimension mismatch: knowledge base uses {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, FaqError>;
