//! Version-gated reads and writes.
//!
//! Every gridlink message tolerates both older and newer peers: a field
//! introduced at protocol version `v` exists on the wire only when the
//! negotiated version of the connection is at least `v`. The gating lives
//! here, in one place, so that every message implementation gets identical
//! and centrally-testable behavior: encoding at an older negotiated version
//! silently drops the field, decoding at an older version leaves it at the
//! caller-supplied default, and any version at or above the introduction
//! round-trips the value exactly.

use crate::error::Result;
use crate::serialization::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};

/// A negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(pub i32);

impl ProtocolVersion {
    /// The initial protocol version.
    pub const V1: ProtocolVersion = ProtocolVersion(1);
    /// Added expiry on put, lease on lock, priming listeners.
    pub const V2: ProtocolVersion = ProtocolVersion(2);
    /// Added query result limits.
    pub const V3: ProtocolVersion = ProtocolVersion(3);
    /// The most recent version this implementation speaks.
    pub const CURRENT: ProtocolVersion = Self::V3;

    /// Returns true if this version includes fields introduced at `other`.
    pub fn supports(self, other: ProtocolVersion) -> bool {
        self >= other
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A writer that omits fields the negotiated peer version predates.
#[derive(Debug)]
pub struct VersionedWriter {
    output: ObjectDataOutput,
    version: ProtocolVersion,
}

impl VersionedWriter {
    /// Creates a writer for the given negotiated version.
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            output: ObjectDataOutput::new(),
            version,
        }
    }

    /// Returns the negotiated version this writer encodes for.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Consumes the writer and returns the encoded payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.output.into_bytes()
    }

    /// Writes a single byte unconditionally.
    pub fn write_byte(&mut self, v: i8) -> Result<()> {
        self.output.write_byte(v)
    }

    /// Writes a bool unconditionally (field present since V1).
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.output.write_bool(v)
    }

    /// Writes an i32 unconditionally.
    pub fn write_int(&mut self, v: i32) -> Result<()> {
        self.output.write_int(v)
    }

    /// Writes an i64 unconditionally.
    pub fn write_long(&mut self, v: i64) -> Result<()> {
        self.output.write_long(v)
    }

    /// Writes a length-prefixed blob unconditionally.
    pub fn write_blob(&mut self, v: &[u8]) -> Result<()> {
        self.output.write_blob(v)
    }

    /// Writes an optional blob unconditionally (`None` as length -1).
    pub fn write_opt_blob(&mut self, v: Option<&[u8]>) -> Result<()> {
        self.output.write_opt_blob(v)
    }

    /// Writes a string unconditionally.
    pub fn write_string(&mut self, v: &str) -> Result<()> {
        self.output.write_string(v)
    }

    /// Writes a bool only if the negotiated version is at least `since`.
    pub fn write_bool_since(&mut self, since: ProtocolVersion, v: bool) -> Result<()> {
        if self.version.supports(since) {
            self.output.write_bool(v)?;
        }
        Ok(())
    }

    /// Writes an i32 only if the negotiated version is at least `since`.
    pub fn write_int_since(&mut self, since: ProtocolVersion, v: i32) -> Result<()> {
        if self.version.supports(since) {
            self.output.write_int(v)?;
        }
        Ok(())
    }

    /// Writes an i64 only if the negotiated version is at least `since`.
    pub fn write_long_since(&mut self, since: ProtocolVersion, v: i64) -> Result<()> {
        if self.version.supports(since) {
            self.output.write_long(v)?;
        }
        Ok(())
    }

    /// Writes an optional blob only if the negotiated version is at least `since`.
    pub fn write_opt_blob_since(
        &mut self,
        since: ProtocolVersion,
        v: Option<&[u8]>,
    ) -> Result<()> {
        if self.version.supports(since) {
            self.output.write_opt_blob(v)?;
        }
        Ok(())
    }
}

/// A reader that skips fields the negotiated peer version predates.
#[derive(Debug)]
pub struct VersionedReader<'a> {
    input: ObjectDataInput<'a>,
    version: ProtocolVersion,
}

impl<'a> VersionedReader<'a> {
    /// Creates a reader over `data` decoded at the given negotiated version.
    pub fn new(data: &'a [u8], version: ProtocolVersion) -> Self {
        Self {
            input: ObjectDataInput::new(data),
            version,
        }
    }

    /// Returns the negotiated version this reader decodes at.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Returns the number of undecoded bytes.
    pub fn remaining(&self) -> usize {
        self.input.remaining()
    }

    /// Reads a single byte unconditionally.
    pub fn read_byte(&mut self) -> Result<i8> {
        self.input.read_byte()
    }

    /// Reads a bool unconditionally.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.input.read_bool()
    }

    /// Reads an i32 unconditionally.
    pub fn read_int(&mut self) -> Result<i32> {
        self.input.read_int()
    }

    /// Reads an i64 unconditionally.
    pub fn read_long(&mut self) -> Result<i64> {
        self.input.read_long()
    }

    /// Reads a length-prefixed blob unconditionally.
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        self.input.read_blob()
    }

    /// Reads an optional blob unconditionally.
    pub fn read_opt_blob(&mut self) -> Result<Option<Vec<u8>>> {
        self.input.read_opt_blob()
    }

    /// Reads a string unconditionally.
    pub fn read_string(&mut self) -> Result<String> {
        self.input.read_string()
    }

    /// Reads a bool if the negotiated version is at least `since`,
    /// otherwise returns `default` without consuming input.
    pub fn read_bool_since(&mut self, since: ProtocolVersion, default: bool) -> Result<bool> {
        if self.version.supports(since) {
            self.input.read_bool()
        } else {
            Ok(default)
        }
    }

    /// Reads an i32 if the negotiated version is at least `since`,
    /// otherwise returns `default` without consuming input.
    pub fn read_int_since(&mut self, since: ProtocolVersion, default: i32) -> Result<i32> {
        if self.version.supports(since) {
            self.input.read_int()
        } else {
            Ok(default)
        }
    }

    /// Reads an i64 if the negotiated version is at least `since`,
    /// otherwise returns `default` without consuming input.
    pub fn read_long_since(&mut self, since: ProtocolVersion, default: i64) -> Result<i64> {
        if self.version.supports(since) {
            self.input.read_long()
        } else {
            Ok(default)
        }
    }

    /// Reads an optional blob if the negotiated version is at least `since`,
    /// otherwise returns `None` without consuming input.
    pub fn read_opt_blob_since(
        &mut self,
        since: ProtocolVersion,
    ) -> Result<Option<Vec<u8>>> {
        if self.version.supports(since) {
            self.input.read_opt_blob()
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(ProtocolVersion::V2.supports(ProtocolVersion::V1));
        assert!(ProtocolVersion::V2.supports(ProtocolVersion::V2));
        assert!(!ProtocolVersion::V1.supports(ProtocolVersion::V2));
        assert!(ProtocolVersion::CURRENT.supports(ProtocolVersion::V3));
    }

    #[test]
    fn test_gated_field_dropped_at_older_version() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        writer.write_int(7).unwrap();
        writer.write_long_since(ProtocolVersion::V2, 9999).unwrap();
        let bytes = writer.into_bytes();

        // Only the unconditional i32 made it onto the wire.
        assert_eq!(bytes.len(), 4);

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert_eq!(reader.read_int().unwrap(), 7);
        assert_eq!(
            reader.read_long_since(ProtocolVersion::V2, -1).unwrap(),
            -1
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_gated_field_roundtrips_at_newer_version() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V2);
        writer.write_int(7).unwrap();
        writer.write_long_since(ProtocolVersion::V2, 9999).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V2);
        assert_eq!(reader.read_int().unwrap(), 7);
        assert_eq!(
            reader.read_long_since(ProtocolVersion::V2, -1).unwrap(),
            9999
        );
    }

    #[test]
    fn test_gated_blob() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V3);
        writer
            .write_opt_blob_since(ProtocolVersion::V3, Some(b"cookie"))
            .unwrap();
        let bytes = writer.into_bytes();

        let mut v3 = VersionedReader::new(&bytes, ProtocolVersion::V3);
        assert_eq!(
            v3.read_opt_blob_since(ProtocolVersion::V3).unwrap(),
            Some(b"cookie".to_vec())
        );

        let mut v2 = VersionedReader::new(&[], ProtocolVersion::V2);
        assert_eq!(v2.read_opt_blob_since(ProtocolVersion::V3).unwrap(), None);
    }

    #[test]
    fn test_gated_bool_and_int() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V2);
        writer.write_bool_since(ProtocolVersion::V2, true).unwrap();
        writer.write_int_since(ProtocolVersion::V3, 55).unwrap();
        let bytes = writer.into_bytes();

        // V3-gated int was dropped at a V2 negotiated version.
        assert_eq!(bytes.len(), 1);

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V2);
        assert!(reader.read_bool_since(ProtocolVersion::V2, false).unwrap());
        assert_eq!(reader.read_int_since(ProtocolVersion::V3, -1).unwrap(), -1);
    }

    #[test]
    fn test_display() {
        assert_eq!(ProtocolVersion::V2.to_string(), "v2");
    }
}
