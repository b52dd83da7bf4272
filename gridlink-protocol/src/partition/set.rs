//! A bitset over partition ids.

use gridlink_core::{GridError, Result, VersionedReader, VersionedWriter};
use rand::Rng;

/// A set of partition ids in `[0, partition_count)`.
///
/// The scan engine owns one of these exclusively for the scan in progress,
/// removing partitions as they are visited; the remainder travels inside the
/// cursor between client round trips. The trailing bits of the last word are
/// always zero, which keeps the serialized form canonical: equal sets encode
/// to equal bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
    partition_count: u32,
    words: Vec<u64>,
}

impl PartitionSet {
    /// Creates an empty set over `partition_count` partitions.
    pub fn empty(partition_count: u32) -> Self {
        let words = vec![0u64; Self::word_count(partition_count)];
        Self {
            partition_count,
            words,
        }
    }

    /// Creates a set containing every partition in `[0, partition_count)`.
    pub fn full(partition_count: u32) -> Self {
        let mut set = Self::empty(partition_count);
        for word in set.words.iter_mut() {
            *word = u64::MAX;
        }
        set.mask_tail();
        set
    }

    fn word_count(partition_count: u32) -> usize {
        (partition_count as usize).div_ceil(64)
    }

    fn mask_tail(&mut self) {
        let tail_bits = self.partition_count % 64;
        if tail_bits != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail_bits) - 1;
            }
        }
    }

    /// Returns the size of the partition space this set ranges over.
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Returns true if `partition` is a member.
    pub fn contains(&self, partition: u32) -> bool {
        if partition >= self.partition_count {
            return false;
        }
        self.words[(partition / 64) as usize] & (1u64 << (partition % 64)) != 0
    }

    /// Adds a partition; returns true if it was not already present.
    pub fn insert(&mut self, partition: u32) -> bool {
        assert!(partition < self.partition_count, "partition out of range");
        let word = &mut self.words[(partition / 64) as usize];
        let bit = 1u64 << (partition % 64);
        let added = *word & bit == 0;
        *word |= bit;
        added
    }

    /// Removes a partition; returns true if it was present.
    pub fn remove(&mut self, partition: u32) -> bool {
        if partition >= self.partition_count {
            return false;
        }
        let word = &mut self.words[(partition / 64) as usize];
        let bit = 1u64 << (partition % 64);
        let removed = *word & bit != 0;
        *word &= !bit;
        removed
    }

    /// Returns the number of member partitions.
    pub fn cardinality(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterates over the member partition ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.partition_count).filter(|p| self.contains(*p))
    }

    /// Removes and returns one member partition chosen at random.
    pub fn pop_random(&mut self) -> Option<u32> {
        let card = self.cardinality();
        if card == 0 {
            return None;
        }
        let nth = rand::thread_rng().gen_range(0..card);
        let partition = self.iter().nth(nth as usize)?;
        self.remove(partition);
        Some(partition)
    }

    /// Removes up to `n` partitions from this set and returns them as a new
    /// set over the same partition space.
    pub fn take(&mut self, n: u32) -> PartitionSet {
        let mut taken = PartitionSet::empty(self.partition_count);
        let ids: Vec<u32> = self.iter().take(n as usize).collect();
        for p in ids {
            self.remove(p);
            taken.insert(p);
        }
        taken
    }

    /// Writes this set to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.partition_count as i32)?;
        for word in &self.words {
            writer.write_long(*word as i64)?;
        }
        Ok(())
    }

    /// Reads a set from the given reader.
    ///
    /// When `expected` is given, the wire count must match it exactly.
    /// Either way the claimed count must be backed by bytes actually
    /// present before any buffer is sized from it.
    pub fn read_from(reader: &mut VersionedReader<'_>, expected: Option<u32>) -> Result<Self> {
        let count = reader.read_int()?;
        if count < 0 {
            return Err(GridError::Serialization(format!(
                "invalid partition count: {count}"
            )));
        }
        let partition_count = count as u32;
        if let Some(expected) = expected {
            if partition_count != expected {
                return Err(GridError::Serialization(format!(
                    "partition set spans {partition_count} partitions, expected {expected}"
                )));
            }
        }
        let word_count = Self::word_count(partition_count);
        if reader.remaining() < word_count * 8 {
            return Err(GridError::Serialization(format!(
                "partition set claims {partition_count} partitions but only {} bytes follow",
                reader.remaining()
            )));
        }
        let mut words = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            words.push(reader.read_long()? as u64);
        }
        let mut set = Self {
            partition_count,
            words,
        };
        // A non-canonical tail means the bytes were not produced here.
        let before = set.words.clone();
        set.mask_tail();
        if set.words != before {
            return Err(GridError::Serialization(
                "partition set has bits beyond the partition count".to_string(),
            ));
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::ProtocolVersion;

    #[test]
    fn test_empty_and_full() {
        let empty = PartitionSet::empty(257);
        assert!(empty.is_empty());
        assert_eq!(empty.cardinality(), 0);

        let full = PartitionSet::full(257);
        assert_eq!(full.cardinality(), 257);
        assert!(full.contains(0));
        assert!(full.contains(256));
        assert!(!full.contains(257));
    }

    #[test]
    fn test_insert_remove() {
        let mut set = PartitionSet::empty(16);
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.contains(3));
        assert!(set.remove(3));
        assert!(!set.remove(3));
        assert!(set.is_empty());
    }

    #[test]
    fn test_iter_ascending() {
        let mut set = PartitionSet::empty(100);
        set.insert(64);
        set.insert(2);
        set.insert(99);
        let ids: Vec<u32> = set.iter().collect();
        assert_eq!(ids, vec![2, 64, 99]);
    }

    #[test]
    fn test_pop_random_drains_all() {
        let mut set = PartitionSet::full(17);
        let mut seen = Vec::new();
        while let Some(p) = set.pop_random() {
            seen.push(p);
        }
        assert_eq!(seen.len(), 17);
        seen.sort_unstable();
        assert_eq!(seen, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_take_bounds() {
        let mut set = PartitionSet::full(10);
        let taken = set.take(4);
        assert_eq!(taken.cardinality(), 4);
        assert_eq!(set.cardinality(), 6);

        let rest = set.take(100);
        assert_eq!(rest.cardinality(), 6);
        assert!(set.is_empty());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut set = PartitionSet::full(71);
        set.remove(0);
        set.remove(70);

        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        set.write_to(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        let decoded = PartitionSet::read_from(&mut reader, Some(71)).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_non_canonical_tail_rejected() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        writer.write_int(10).unwrap();
        writer.write_long(-1).unwrap(); // all 64 bits set, only 10 valid
        let bytes = writer.into_bytes();

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert!(PartitionSet::read_from(&mut reader, None).is_err());
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        writer.write_int(-4).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert!(PartitionSet::read_from(&mut reader, None).is_err());
    }

    #[test]
    fn test_overclaimed_count_rejected_before_reading_words() {
        // A count of i32::MAX would need a quarter gigabyte of words; the
        // four bytes that actually follow refute it immediately.
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        writer.write_int(i32::MAX).unwrap();
        writer.write_int(0).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert!(PartitionSet::read_from(&mut reader, None).is_err());
    }

    #[test]
    fn test_expected_count_mismatch_rejected() {
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        PartitionSet::full(8).write_to(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert!(PartitionSet::read_from(&mut reader, Some(16)).is_err());
    }
}
