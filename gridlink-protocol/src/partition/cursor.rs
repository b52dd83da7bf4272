//! The opaque resumption cursor ("cookie") for batch-streaming scans.

use gridlink_core::{GridError, ProtocolVersion, Result, VersionedReader, VersionedWriter};

use super::set::PartitionSet;

/// Format marker prepended to every encoded cursor.
const CURSOR_FORMAT: i8 = 1;

/// The resumption state of a partition scan.
///
/// Produced by the server, round-tripped unmodified by the client, and
/// consumed on the next call. A cursor is an immutable value: resuming a
/// scan takes a cursor and produces a new one, never mutating the caller's
/// copy. A cursor with an empty remaining set marks an exhausted scan; the
/// client recognizes completion from that state alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    remaining: PartitionSet,
    batch_size: i32,
}

impl ScanCursor {
    /// Creates the cursor of a scan that has not visited any partition yet.
    ///
    /// Batch size zero tells the scan engine to run its sizing probe.
    pub fn fresh(partition_count: u32) -> Self {
        Self {
            remaining: PartitionSet::full(partition_count),
            batch_size: 0,
        }
    }

    /// Creates a cursor from its parts.
    pub fn new(remaining: PartitionSet, batch_size: i32) -> Self {
        Self {
            remaining,
            batch_size,
        }
    }

    /// The partitions not yet visited by this scan.
    pub fn remaining(&self) -> &PartitionSet {
        &self.remaining
    }

    /// The number of partitions the next call will execute.
    pub fn batch_size(&self) -> i32 {
        self.batch_size
    }

    /// Returns true if every partition has been visited.
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Consumes the cursor, returning the remaining partition set.
    pub fn into_remaining(self) -> PartitionSet {
        self.remaining
    }

    /// Encodes this cursor into its opaque wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        // Cursor layout is version-independent; V1 pins the field set.
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        writer.write_int(CURSOR_FORMAT as i32)?;
        self.remaining.write_to(&mut writer)?;
        writer.write_int(self.batch_size)?;
        Ok(writer.into_bytes())
    }

    /// Decodes a cursor previously produced by [`ScanCursor::encode`].
    ///
    /// An empty blob decodes as a fresh scan over `partition_count`
    /// partitions. Anything else that was not produced by this layer for a
    /// store of the same partition count is rejected.
    pub fn decode(bytes: &[u8], partition_count: u32) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::fresh(partition_count));
        }

        let mut reader = VersionedReader::new(bytes, ProtocolVersion::V1);
        let format = reader
            .read_int()
            .map_err(|e| GridError::MalformedCursor(e.to_string()))?;
        if format != CURSOR_FORMAT as i32 {
            return Err(GridError::MalformedCursor(format!(
                "unknown cursor format {format}"
            )));
        }
        let remaining = PartitionSet::read_from(&mut reader, Some(partition_count))
            .map_err(|e| GridError::MalformedCursor(e.to_string()))?;
        let batch_size = reader
            .read_int()
            .map_err(|e| GridError::MalformedCursor(e.to_string()))?;
        if batch_size < 0 {
            return Err(GridError::MalformedCursor(format!(
                "negative batch size {batch_size}"
            )));
        }
        if reader.remaining() != 0 {
            return Err(GridError::MalformedCursor(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(Self {
            remaining,
            batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_cursor() {
        let cursor = ScanCursor::fresh(8);
        assert_eq!(cursor.batch_size(), 0);
        assert_eq!(cursor.remaining().cardinality(), 8);
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn test_roundtrip() {
        let mut remaining = PartitionSet::full(31);
        remaining.remove(5);
        remaining.remove(30);
        let cursor = ScanCursor::new(remaining, 7);

        let bytes = cursor.encode().unwrap();
        let decoded = ScanCursor::decode(&bytes, 31).unwrap();
        assert_eq!(decoded, cursor);
        // Re-encoding is byte-identical.
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_roundtrip_exhausted() {
        let cursor = ScanCursor::new(PartitionSet::empty(16), 4);
        assert!(cursor.is_exhausted());
        let bytes = cursor.encode().unwrap();
        let decoded = ScanCursor::decode(&bytes, 16).unwrap();
        assert!(decoded.is_exhausted());
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_empty_blob_is_fresh_scan() {
        let cursor = ScanCursor::decode(&[], 12).unwrap();
        assert_eq!(cursor, ScanCursor::fresh(12));
    }

    #[test]
    fn test_foreign_bytes_rejected() {
        assert!(matches!(
            ScanCursor::decode(&[1, 2, 3], 8),
            Err(GridError::MalformedCursor(_))
        ));
    }

    #[test]
    fn test_partition_count_mismatch_rejected() {
        let bytes = ScanCursor::fresh(8).encode().unwrap();
        assert!(matches!(
            ScanCursor::decode(&bytes, 16),
            Err(GridError::MalformedCursor(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = ScanCursor::fresh(8).encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            ScanCursor::decode(&bytes, 8),
            Err(GridError::MalformedCursor(_))
        ));
    }
}
