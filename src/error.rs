/// Error types for the universal data layer.
///
/// This module provides the error hierarchy covering every failure mode in
/// the node-graph runtime. All errors are well-typed and can be
/// pattern-matched for precise handling at the HTTP boundary, where each
/// variant maps to a status code.
use thiserror::Error;

/// The main error type for data-layer operations.
///
/// All fallible operations return `Result<T, UdlError>`. This provides a
/// unified error handling interface across the entire API.
#[derive(Error, Debug)]
pub enum UdlError {
    /// A required field was missing or an input was malformed.
    ///
    /// Surfaced as HTTP 400 at the sync and webhook boundaries.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of what was invalid
        reason: String,
    },

    /// Operation targeted a node or registration that does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up and missed
        what: String,
    },

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    Unauthorized,

    /// Wrong HTTP verb for an endpoint.
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected method
        method: String,
    },

    /// An upstream call exceeded its time limit.
    #[error("Timed out after {limit_ms}ms: {operation}")]
    Timeout {
        /// What was being attempted
        operation: String,
        /// The configured limit in milliseconds
        limit_ms: u64,
    },

    /// Non-2xx response from an upstream service (introspection etc.).
    #[error("Upstream request failed with {status}: {message}")]
    Transport {
        /// HTTP status code from the upstream
        status: u16,
        /// Status text or response body excerpt
        message: String,
    },

    /// Serialization error when converting data to/from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure (cache snapshots, codegen writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UdlError {
    /// Convenience constructor for invalid-input errors.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for not-found errors.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

/// Result type alias for data-layer operations.
///
/// This is a convenience alias for `Result<T, UdlError>` that keeps
/// function signatures concise throughout the codebase.
pub type UdlResult<T> = Result<T, UdlError>;
