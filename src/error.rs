use thiserror::Error;

/// User-correctable problems caught before anything is written. The session
/// keeps its in-memory fields so the user can fix the value and resubmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invoice amount must be greater than zero")]
    InvalidAmount,
    #[error("invoice date cannot be in the future")]
    FutureDate,
    #[error("an invoice image is required")]
    MissingImage,
    #[error("property name cannot be empty")]
    EmptyName,
}

/// Failures from the image store or the record store. Surfaced once, never
/// retried automatically.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to encode image: {0}")]
    Encoding(#[source] image::ImageError),
    #[error("image store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store failure: {0}")]
    Record(#[from] rusqlite::Error),
}

/// Everything a commit (or a ledger workflow) can fail with.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for CommitError {
    fn from(e: rusqlite::Error) -> Self {
        CommitError::Storage(StorageError::Record(e))
    }
}
