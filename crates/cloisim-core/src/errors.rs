//! Registry error types.

use thiserror::Error;

/// Errors raised by [`BridgeManager`](crate::BridgeManager) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The binding produced an empty hash key.
    #[error("impossible empty hash key")]
    EmptyKey,
    /// The hash key already owns a port.
    #[error("hash key({0}) is already occupied")]
    AlreadyAllocated(String),
    /// No free port left in the bridge range.
    #[error("failed to allocate port for hash key({0})")]
    PortsExhausted(String),
    /// The hash key is not registered.
    #[error("hash key({0}) not found")]
    NotFound(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
