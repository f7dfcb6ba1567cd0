use thiserror::Error;

/// Failures of the underlying persistence layer. Surfaced to the caller,
/// never retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored state is corrupt: {0}")]
    Corrupt(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Typed tracker errors.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A date or date-time string could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
    /// Imported JSON does not have the expected shape.
    #[error("Schema error: {0}")]
    Schema(String),
    /// A requested day range is larger than the tracker supports.
    #[error("Range error: {0}")]
    Range(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
pub type StoreResult<T> = Result<T, StoreError>;
