//! Error types for reference backend operations.

use thiserror::Error;

/// Errors a backend or iterator implementation can report.
///
/// Every variant crosses the engine boundary as a generic failure with the
/// `Display` text attached as the diagnostic message. Absent references and
/// write collisions that the bridge detects itself never reach this type.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("reference not found: {name}")]
    NotFound { name: String },

    /// A reference with this name already exists.
    #[error("reference already exists: {name}")]
    AlreadyExists { name: String },

    /// The reference name is malformed.
    #[error("invalid reference name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The enumeration pattern could not be compiled.
    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The backend does not implement this optional operation.
    #[error("operation not supported by this backend: {operation}")]
    Unsupported { operation: &'static str },

    /// The iterator was used after teardown.
    #[error("iterator has been freed")]
    IteratorFreed,

    /// Any other backend-specific failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Convenience type alias for backend operations.
pub type Result<T> = std::result::Result<T, RefError>;
