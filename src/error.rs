//! Error types for irr-walker
//!
//! This module defines the error hierarchy that covers:
//! - Validation errors raised before any network activity
//! - Query errors raised while expanding a single object
//! - Worker thread errors
//! - Output rendering errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - A query error only ever fails the object being processed; validation
//!   errors abort the whole submission
//! - Preserve the server message so failures can be traced back to the registry

use thiserror::Error;

/// Top-level error type for the irr-walker library
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Configuration or filter errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The server name could not be mapped to a dialect
    #[error("Unknown type of IRR for '{name}'.")]
    UnknownServer { name: String },

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration, CLI and filter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Protocol filter value outside {ipv4, ipv6}
    #[error("Invalid protocol: {value}")]
    InvalidFilter { value: String },

    /// Protocol filter given explicitly but empty
    #[error("Protocol filter must name at least one of ipv4, ipv6")]
    EmptyProtocolFilter,

    /// Invalid worker count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid socket timeout
    #[error("Invalid timeout {secs}s: must be greater than zero")]
    InvalidTimeout { secs: u64 },

    /// No objects to resolve
    #[error("Missing argument: objects required")]
    MissingObjects,
}

/// Errors raised while processing one query node
///
/// These never stop a worker: the node is marked failed and the walk continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Socket or DNS failure
    #[error("Failed to connect to '{server}': {reason}")]
    ConnectionFailed { server: String, reason: String },

    /// No response within the configured timeout
    #[error("Timed out after {secs}s waiting for '{server}'")]
    Timeout { server: String, secs: u64 },

    /// The response framing was never observed
    #[error("Malformed response from '{server}': {reason}")]
    MalformedResponse { server: String, reason: String },

    /// The registry rejected the source filter
    #[error("'{command}' failed on '{server}' ({message}).")]
    SourceFilterFailed {
        command: String,
        server: String,
        message: String,
    },

    /// The registry returned an error for an expansion command
    #[error("'{command}' failed on '{server}' ({message}).")]
    ExpansionFailed {
        command: String,
        server: String,
        message: String,
    },

    /// The node carries no object name
    #[error("No object given to resolve")]
    MissingObject,
}

impl QueryError {
    /// Check if the session is unusable after this error and must be reopened
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            QueryError::ConnectionFailed { .. }
                | QueryError::Timeout { .. }
                | QueryError::MalformedResponse { .. }
        )
    }
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread could not be started
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },
}

/// Rendering errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for ResolverError
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Result type alias for QueryError
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Represents the outcome of processing a single query node
#[derive(Debug)]
pub enum QueryOutcome {
    /// The node was expanded
    Success {
        object: String,
        children: usize,
    },

    /// The node failed; its contribution is discarded
    Failed { object: String, error: QueryError },
}
