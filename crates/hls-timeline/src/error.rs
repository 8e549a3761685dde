#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("invalid timestamp `{value}`: {reason}")]
    InvalidTimestamp { value: String, reason: &'static str },

    #[error("invalid bucket width {width}: must be a positive number of seconds")]
    InvalidBucketWidth { width: i64 },

    #[error("invalid folder key `{key}`")]
    InvalidFolderKey { key: String },

    #[error("timestamp {epoch} is out of the representable range")]
    OutOfRange { epoch: i64 },
}

impl TimeError {
    pub fn invalid_timestamp(value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidTimestamp {
            value: value.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("object not found: {key}")]
    NotFound { key: String },
}

impl StorageError {
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            reason: reason.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Transient failures are worth another attempt; a vanished object is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A playlist that cannot be used as a bucket manifest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("playlist is not valid UTF-8")]
    NotUtf8,

    #[error("failed to parse playlist: {reason}")]
    Parse { reason: String },

    #[error("expected a media playlist, found a master playlist")]
    MasterPlaylist,

    #[error("playlist declares no segments")]
    Empty,

    #[error("segment #{position} has an empty URI")]
    EmptyUri { position: usize },

    #[error("segment `{filename}` is declared more than once")]
    DuplicateSegment { filename: String },

    #[error("media sequence {media_sequence} overflows at segment #{position}")]
    SequenceOverflow { media_sequence: u64, position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("segments `{first}` and `{second}` share sequence index {index}")]
    SequenceTie {
        index: u64,
        first: String,
        second: String,
    },

    #[error(transparent)]
    ClipName(#[from] TimeError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error(transparent)]
    InvalidTimestamp(#[from] TimeError),

    #[error("invalid range: end {end} is before start {start}")]
    InvalidRange { start: i64, end: i64 },

    #[error("storage unavailable during {operation}: {reason}")]
    StorageUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("no usable data between {start} and {end}")]
    NoDataAvailable { start: i64, end: i64 },

    #[error("operation cancelled")]
    Cancelled,
}

impl SequencerError {
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

impl From<StorageError> for SequencerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { operation, reason } => {
                Self::StorageUnavailable { operation, reason }
            }
            // Callers translate NotFound into "absent" before it gets here;
            // one that slips through is still a storage-side condition.
            StorageError::NotFound { key } => Self::StorageUnavailable {
                operation: "lookup",
                reason: format!("object not found: {key}"),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("storage error: {source}")]
    Storage {
        #[from]
        source: StorageError,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { source } => source.is_retryable(),
            Self::Io { .. } | Self::Cancelled => false,
        }
    }
}
