//! Crate-wide error and result types.

/// All errors returned by the engine. I/O and index-backend errors pass
/// through transparently; everything else is a semantic condition a caller
/// may want to match on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key is empty")]
    KeyIsEmpty,

    #[error("key not found")]
    KeyNotFound,

    #[error("data file not found")]
    DataFileNotFound,

    #[error("data directory corrupted")]
    DataDirectoryCorrupted,

    #[error("index update failed")]
    IndexUpdateFailed,

    #[error("batch exceeds the maximum number of operations")]
    ExceedMaxBatchNum,

    #[error("merge is in progress, try again later")]
    MergeInProgress,

    #[error("merge ratio not reached")]
    MergeRatioUnreached,

    #[error("not enough disk space to merge")]
    MergeSpaceNotEnough,

    #[error("database directory is in use by another process")]
    DatabaseIsUsing,

    #[error("invalid record CRC, the record may be corrupted")]
    InvalidCrc,

    #[error("write batches are unavailable, the sequence number file is missing")]
    BatchNotAvailable,

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    IndexBackend(#[from] jammdb::Error),
}

/// Result returning [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
