//! Error types for the termgate core library.

use thiserror::Error;

/// Result type alias using the termgate core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol-level errors.
///
/// Both variants are single-frame failures: the session that hits one logs
/// it and keeps the connection open.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame could not be decoded into a protocol message at all.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame decoded, but a field the message kind requires is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}
