//! Error types for gridlink protocol operations.

use std::io;
use thiserror::Error;

/// The main error type for gridlink protocol operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// Protocol-level errors (malformed envelope, missing required argument).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No message implementation is registered for the given type id.
    #[error("unknown type id {type_id} for protocol {protocol}")]
    UnknownTypeId {
        /// Numeric identifier of the protocol the lookup was made against.
        protocol: u8,
        /// The unmapped message type id.
        type_id: i32,
    },

    /// A resumption cursor could not be decoded.
    ///
    /// Cursors are opaque, server-issued blobs; a cursor that was not
    /// produced by this layer for this operation is rejected here.
    #[error("malformed cursor: {0}")]
    MalformedCursor(String),

    /// The requested operation combination is not supported by the backing
    /// collaborator. Distinguished from [`GridError::Operation`] so clients
    /// can tell "retry differently" from "retry won't help".
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The backing collaborator failed while executing the operation.
    #[error("operation failed: {0}")]
    Operation(String),

    /// An operation exceeded its time budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for gridlink operations.
pub type Result<T> = std::result::Result<T, GridError>;
