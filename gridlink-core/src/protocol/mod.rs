//! The gridlink wire envelope and its framed codec.

pub mod constants;
mod envelope;

pub use constants::*;
pub use envelope::{Envelope, EnvelopeCodec, ProtocolId};
