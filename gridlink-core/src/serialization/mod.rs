//! Binary serialization primitives for the gridlink wire format.
//!
//! All multi-byte scalars are big-endian. Variable-length values (strings,
//! byte blobs) are length-prefixed with an `i32`, where `-1` marks a null
//! value. Version-gated access on top of these primitives lives in
//! [`versioned`].

mod data_input;
mod data_output;
mod versioned;

pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput};
pub use versioned::{ProtocolVersion, VersionedReader, VersionedWriter};
