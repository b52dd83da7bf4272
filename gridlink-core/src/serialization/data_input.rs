//! Data input traits and implementations for gridlink serialization.

use crate::error::{GridError, Result};
use bytes::Buf;
use std::io::Cursor;

/// Trait for reading primitive values from gridlink's binary format.
///
/// All multi-byte values are read in big-endian byte order.
pub trait DataInput {
    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a 32-bit signed integer in big-endian order.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer in big-endian order.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads the specified number of raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads an i32-length-prefixed byte blob.
    fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(GridError::Serialization(format!(
                "invalid blob length: {len}"
            )));
        }
        self.read_bytes(len as usize)
    }

    /// Reads an optional byte blob; length `-1` decodes as `None`.
    fn read_opt_blob(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.read_int()?;
        if len < 0 {
            return Ok(None);
        }
        self.read_bytes(len as usize).map(Some)
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes)
            .map_err(|e| GridError::Serialization(format!("invalid UTF-8 string: {e}")))
    }
}

/// A buffer-based implementation of `DataInput`.
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.cursor.remaining() < n {
            Err(GridError::Serialization(format!(
                "insufficient data: need {} bytes, have {}",
                n,
                self.cursor.remaining()
            )))
        } else {
            Ok(())
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_i8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_u8() != 0)
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_i64())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(len)?;
        let mut buf = vec![0u8; len];
        self.cursor.copy_to_slice(&mut buf);
        Ok(buf)
    }
}
