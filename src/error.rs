use thiserror::Error as ThisError;

/// Errors that can occur in the logging library
#[derive(ThisError, Debug)]
pub enum Error {
    /// A constructor received parameters it cannot work with.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Configuration document could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Time error: {0}")]
    Time(#[from] time::error::Format),
    /// The handler has been closed and has no destination left.
    #[error("handler is closed")]
    Closed,
    /// Some handlers of a fan-out failed while others accepted the record.
    #[error("{failed} of {total} handlers failed: {source}")]
    PartialDispatch {
        failed: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
