//! The wire envelope carried by every gridlink message.
//!
//! Layout on the wire:
//!
//! ```text
//! +----------+----------+-----------+----------+-------------+
//! | len: u32 | proto:u8 | ver: i32  | type:i32 | payload ... |
//! +----------+----------+-----------+----------+-------------+
//! ```
//!
//! `len` covers everything after the length field. Payload field layout is
//! stable per type id and version-gated by the message implementation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use crate::error::{GridError, Result};
use crate::serialization::ProtocolVersion;

/// Identifies which message family an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolId {
    /// The partitioned cache protocol (map access, queries, invocation, locks).
    Cache = 1,
    /// The topic channel sub-protocol (publish, receive, commit, seek).
    Topic = 2,
}

impl ProtocolId {
    /// Maps a wire byte back to a protocol id.
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(ProtocolId::Cache),
            2 => Ok(ProtocolId::Topic),
            other => Err(GridError::Protocol(format!("unknown protocol id {other}"))),
        }
    }
}

/// A decoded wire envelope: header plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The protocol this message belongs to.
    pub protocol: ProtocolId,
    /// The negotiated protocol version the payload was encoded at.
    pub version: ProtocolVersion,
    /// The message type id within the protocol.
    pub type_id: i32,
    /// The encoded message payload.
    pub payload: Bytes,
}

impl Envelope {
    /// Creates an envelope from its parts.
    pub fn new(
        protocol: ProtocolId,
        version: ProtocolVersion,
        type_id: i32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            protocol,
            version,
            type_id,
            payload: Bytes::from(payload),
        }
    }

    /// Total size of this envelope on the wire.
    pub fn wire_size(&self) -> usize {
        SIZE_OF_LENGTH_FIELD + ENVELOPE_HEADER_SIZE + self.payload.len()
    }

    /// Writes this envelope to the destination buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        dst.put_u32((ENVELOPE_HEADER_SIZE + self.payload.len()) as u32);
        dst.put_u8(self.protocol as u8);
        dst.put_i32(self.version.0);
        dst.put_i32(self.type_id);
        dst.put_slice(&self.payload);
    }
}

/// Codec for framed envelope I/O, for use with tokio's framed transports.
#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = GridError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = GridError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        if src.len() < SIZE_OF_LENGTH_FIELD {
            return Ok(None);
        }

        let body_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if body_len < ENVELOPE_HEADER_SIZE {
            return Err(GridError::Protocol(format!(
                "envelope body too short: {body_len} bytes"
            )));
        }
        if src.len() < SIZE_OF_LENGTH_FIELD + body_len {
            return Ok(None);
        }

        src.advance(SIZE_OF_LENGTH_FIELD);
        let protocol = ProtocolId::from_byte(src.get_u8())?;
        let version = ProtocolVersion(src.get_i32());
        let type_id = src.get_i32();
        let payload = src.split_to(body_len - ENVELOPE_HEADER_SIZE).freeze();

        Ok(Some(Envelope {
            protocol,
            version,
            type_id,
            payload,
        }))
    }
}
