//! Core wire types for the gridlink protocol.
//!
//! This crate holds everything a peer needs to move gridlink messages over a
//! byte stream: the error type, the binary data input/output primitives, the
//! version-gated reader/writer used by every message implementation, and the
//! wire envelope with its framed codec. Message semantics live in
//! `gridlink-protocol`.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod serialization;

pub use error::{GridError, Result};
pub use protocol::{Envelope, EnvelopeCodec, ProtocolId};
pub use serialization::{
    DataInput, DataOutput, ObjectDataInput, ObjectDataOutput, ProtocolVersion, VersionedReader,
    VersionedWriter,
};
