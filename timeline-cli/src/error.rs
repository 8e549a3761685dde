use hls_timeline::{FetchError, SequencerError, StorageError, TimeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),

    #[error("Invalid time: {0}")]
    Time(#[from] TimeError),

    #[error("{0}")]
    Sequencer(#[from] SequencerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "No folder is aligned to {bucket_width}s buckets ({count} unaligned, e.g. {example}); \
         adjust stream.bucket_width_secs to the archive layout"
    )]
    MisalignedArchive {
        bucket_width: i64,
        count: usize,
        example: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
