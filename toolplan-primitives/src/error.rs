//! Shared error definitions for toolplan primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided task identifier could not be parsed.
    #[error("invalid task id: {source}")]
    InvalidTaskId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Tool name failed validation.
    #[error("invalid tool name `{name}`: {reason}")]
    InvalidToolName {
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A configuration value could not be interpreted.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
