//! Collaborator interfaces at the boundary of this layer.
//!
//! The actual key/value store, partition ownership, replication, and the
//! evaluation of filters, entry processors, and aggregators live behind
//! [`PartitionedStore`]. This layer treats filter and processor bodies as
//! opaque byte blobs and only inspects the envelope-level hints it needs for
//! routing: paging state, key association, and explicit partition scoping.

use std::time::Duration;

use async_trait::async_trait;
use gridlink_core::{Result, VersionedReader, VersionedWriter};
use uuid::Uuid;

use crate::partition::PartitionSet;

/// A key/value pair as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The serialized key.
    pub key: Vec<u8>,
    /// The serialized value.
    pub value: Vec<u8>,
}

impl Entry {
    /// Creates an entry from its serialized parts.
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Approximate size of this entry when encoded, used by the scan
    /// engine's batch sizing. Two length prefixes plus the payloads.
    pub fn estimated_wire_size(&self) -> usize {
        8 + self.key.len() + self.value.len()
    }
}

/// One member's contribution to a resumable limit-filter cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberBallot {
    /// The cluster member the ballot belongs to.
    pub member_id: Uuid,
    /// The member's opaque paging state.
    pub ballot: Vec<u8>,
}

/// The opaque cursor of a filter that implements its own result limiting.
///
/// Passed through server-side unmodified, except that member references are
/// carried as member ids on the wire and re-resolved on arrival. Resolution
/// fails soft: a ballot whose member id no longer resolves is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCookie {
    /// Per-member paging ballots.
    pub ballots: Vec<MemberBallot>,
}

impl FilterCookie {
    /// Writes this cookie to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.ballots.len() as i32)?;
        for ballot in &self.ballots {
            writer.write_blob(ballot.member_id.as_bytes())?;
            writer.write_blob(&ballot.ballot)?;
        }
        Ok(())
    }

    /// Reads a cookie from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        let count = reader.read_int()?;
        let mut ballots = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let id_bytes = reader.read_blob()?;
            let member_id = Uuid::from_slice(&id_bytes).map_err(|e| {
                gridlink_core::GridError::Serialization(format!("invalid member id: {e}"))
            })?;
            let ballot = reader.read_blob()?;
            ballots.push(MemberBallot { member_id, ballot });
        }
        Ok(Self { ballots })
    }
}

/// Resolves wire-carried member ids back to live cluster members.
pub trait MemberResolver: Send + Sync {
    /// Returns true if the member id still names a reachable member.
    fn resolve(&self, member_id: Uuid) -> bool;
}

/// Client-supplied paging state of a limit filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingState {
    /// Maximum results per page.
    pub page_size: i32,
    /// The zero-based page being requested.
    pub page: i32,
    /// The resumable cookie from the previous page, if any.
    pub cookie: Option<FilterCookie>,
}

/// A filter as carried on the wire: an opaque predicate plus the hints this
/// layer needs to route it.
///
/// A filter that carries paging state, a key association, or an explicit
/// partition set manages its own pagination and bypasses the batch-streaming
/// scan engine entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// The opaque serialized predicate; empty means "match everything".
    pub predicate: Vec<u8>,
    /// Present when the filter implements caller-side paging.
    pub paging: Option<PagingState>,
    /// Present when the filter is associated with a single key.
    pub associated_key: Option<Vec<u8>>,
    /// Present when the filter already names explicit partitions.
    pub partitions: Option<PartitionSet>,
}

impl FilterSpec {
    /// A filter matching every entry, with no routing hints.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Creates a filter from an opaque predicate with no routing hints.
    pub fn from_predicate(predicate: Vec<u8>) -> Self {
        Self {
            predicate,
            ..Self::default()
        }
    }

    /// Returns true if this filter manages its own pagination and must not
    /// be wrapped in a second layer of partition batching.
    pub fn manages_own_batching(&self) -> bool {
        self.paging.is_some() || self.associated_key.is_some() || self.partitions.is_some()
    }

    /// Returns a copy of this filter restricted to the given partitions.
    pub fn restricted_to(&self, partitions: PartitionSet) -> Self {
        Self {
            predicate: self.predicate.clone(),
            paging: self.paging.clone(),
            associated_key: self.associated_key.clone(),
            partitions: Some(partitions),
        }
    }

    /// Writes this filter to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_blob(&self.predicate)?;
        match &self.paging {
            Some(paging) => {
                writer.write_bool(true)?;
                writer.write_int(paging.page_size)?;
                writer.write_int(paging.page)?;
                match &paging.cookie {
                    Some(cookie) => {
                        writer.write_bool(true)?;
                        cookie.write_to(writer)?;
                    }
                    None => writer.write_bool(false)?,
                }
            }
            None => writer.write_bool(false)?,
        }
        writer.write_opt_blob(self.associated_key.as_deref())?;
        match &self.partitions {
            Some(partitions) => {
                writer.write_bool(true)?;
                partitions.write_to(writer)?;
            }
            None => writer.write_bool(false)?,
        }
        Ok(())
    }

    /// Reads a filter from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        let predicate = reader.read_blob()?;
        let paging = if reader.read_bool()? {
            let page_size = reader.read_int()?;
            let page = reader.read_int()?;
            let cookie = if reader.read_bool()? {
                Some(FilterCookie::read_from(reader)?)
            } else {
                None
            };
            Some(PagingState {
                page_size,
                page,
                cookie,
            })
        } else {
            None
        };
        let associated_key = reader.read_opt_blob()?;
        let partitions = if reader.read_bool()? {
            Some(PartitionSet::read_from(reader, None)?)
        } else {
            None
        };
        Ok(Self {
            predicate,
            paging,
            associated_key,
            partitions,
        })
    }
}

/// An opaque entry processor or aggregator body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorSpec {
    /// The serialized processor/aggregator.
    pub body: Vec<u8>,
}

impl ProcessorSpec {
    /// Creates a processor spec from its serialized body.
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }
}

/// Execution priority of a request, advisory to the host scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    /// Scheduled with the general worker pool.
    #[default]
    Standard,
    /// Scheduled ahead of standard work.
    High,
}

/// Scheduling hints a wrapped processor/aggregator may expose.
///
/// Advisory only: exceeding the timeout is detected by an external
/// scheduler collaborator, not by this layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulingHints {
    /// Requested execution timeout, `None` for the service default.
    pub timeout: Option<Duration>,
    /// Requested execution priority.
    pub priority: Priority,
}

/// The target of a listener registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerTarget {
    /// Listen for changes to a single key.
    Key(Vec<u8>),
    /// Listen for changes matching a filter; `None` means all changes.
    Filter(Option<Vec<u8>>),
}

/// The partitioned key/value store behind the cache protocol.
///
/// Filter, processor, and aggregator evaluation happen behind this trait;
/// this layer only routes. Calls carrying a [`FilterSpec`] with explicit
/// `partitions` must be evaluated against those partitions only.
#[async_trait]
pub trait PartitionedStore: Send + Sync {
    /// The number of partitions the key space is divided into.
    fn partition_count(&self) -> u32;

    /// Returns the value bound to `key`, if any.
    async fn get(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Returns the entries for every present key in `keys`.
    async fn get_all(&self, name: &str, keys: &[Vec<u8>]) -> Result<Vec<Entry>>;

    /// Binds `value` to `key`, returning the previous value if any.
    /// `expiry_millis` of zero means no expiry.
    async fn put(
        &self,
        name: &str,
        key: &[u8],
        value: &[u8],
        expiry_millis: i64,
    ) -> Result<Option<Vec<u8>>>;

    /// Stores every entry in `entries`.
    async fn put_all(&self, name: &str, entries: Vec<Entry>) -> Result<()>;

    /// Removes `key`, returning the previous value if any.
    async fn remove(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Removes every key in `keys`.
    async fn remove_all(&self, name: &str, keys: &[Vec<u8>]) -> Result<()>;

    /// Returns true if `key` is present.
    async fn contains_key(&self, name: &str, key: &[u8]) -> Result<bool>;

    /// Returns true if every key in `keys` is present.
    async fn contains_all(&self, name: &str, keys: &[Vec<u8>]) -> Result<bool>;

    /// Returns true if some key maps to `value`.
    async fn contains_value(&self, name: &str, value: &[u8]) -> Result<bool>;

    /// Returns the number of entries.
    async fn size(&self, name: &str) -> Result<i32>;

    /// Removes every entry.
    async fn clear(&self, name: &str) -> Result<()>;

    /// Releases the named resource entirely.
    async fn destroy(&self, name: &str) -> Result<()>;

    /// Returns the keys matching `filter`.
    async fn key_set(&self, name: &str, filter: &FilterSpec) -> Result<Vec<Vec<u8>>>;

    /// Returns the entries matching `filter`.
    async fn entry_set(&self, name: &str, filter: &FilterSpec) -> Result<Vec<Entry>>;

    /// Executes `processor` against the entry for `key`.
    async fn invoke(
        &self,
        name: &str,
        key: &[u8],
        processor: &ProcessorSpec,
    ) -> Result<Option<Vec<u8>>>;

    /// Executes `processor` against the entries for `keys`, returning one
    /// result entry per processed key.
    async fn invoke_keys(
        &self,
        name: &str,
        keys: &[Vec<u8>],
        processor: &ProcessorSpec,
    ) -> Result<Vec<Entry>>;

    /// Executes `processor` against every entry matching `filter`.
    async fn invoke_filter(
        &self,
        name: &str,
        filter: &FilterSpec,
        processor: &ProcessorSpec,
    ) -> Result<Vec<Entry>>;

    /// Aggregates over the entries for `keys`.
    async fn aggregate_keys(
        &self,
        name: &str,
        keys: &[Vec<u8>],
        aggregator: &ProcessorSpec,
    ) -> Result<Vec<u8>>;

    /// Aggregates over every entry matching `filter`.
    async fn aggregate_filter(
        &self,
        name: &str,
        filter: &FilterSpec,
        aggregator: &ProcessorSpec,
    ) -> Result<Vec<u8>>;

    /// Attempts the distributed lock on `key`, waiting up to `wait_millis`
    /// (zero: immediate, negative: unbounded). Returns true on acquisition.
    async fn lock(&self, name: &str, key: &[u8], wait_millis: i64, lease_millis: i64)
        -> Result<bool>;

    /// Releases the distributed lock on `key`; returns true if it was held.
    async fn unlock(&self, name: &str, key: &[u8]) -> Result<bool>;

    /// Adds an index over the attribute extracted by `extractor`.
    async fn add_index(&self, name: &str, extractor: &[u8], ordered: bool) -> Result<()>;

    /// Removes the index for `extractor`.
    async fn remove_index(&self, name: &str, extractor: &[u8]) -> Result<()>;

    /// Registers a listener for the given target.
    async fn add_listener(
        &self,
        name: &str,
        target: &ListenerTarget,
        lite: bool,
        priming: bool,
    ) -> Result<()>;

    /// Unregisters a listener for the given target.
    async fn remove_listener(&self, name: &str, target: &ListenerTarget) -> Result<()>;

    /// Scheduling hints the given processor/aggregator body exposes, if the
    /// store can interpret it. `None` means standard priority and the
    /// default timeout.
    fn processor_hints(&self, _processor: &ProcessorSpec) -> Option<SchedulingHints> {
        None
    }
}

/// Resolves resource names registered with the grid's name directory.
pub trait NameDirectory: Send + Sync {
    /// Returns the binding for `name`, if one exists.
    fn lookup(&self, name: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::ProtocolVersion;

    fn roundtrip(spec: &FilterSpec) -> FilterSpec {
        let mut writer = VersionedWriter::new(ProtocolVersion::CURRENT);
        spec.write_to(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::CURRENT);
        FilterSpec::read_from(&mut reader).unwrap()
    }

    #[test]
    fn test_match_all_has_no_hints() {
        let spec = FilterSpec::match_all();
        assert!(!spec.manages_own_batching());
        assert_eq!(roundtrip(&spec), spec);
    }

    #[test]
    fn test_paging_filter_manages_own_batching() {
        let spec = FilterSpec {
            predicate: vec![1, 2, 3],
            paging: Some(PagingState {
                page_size: 25,
                page: 2,
                cookie: Some(FilterCookie {
                    ballots: vec![MemberBallot {
                        member_id: Uuid::new_v4(),
                        ballot: vec![7, 7],
                    }],
                }),
            }),
            associated_key: None,
            partitions: None,
        };
        assert!(spec.manages_own_batching());
        assert_eq!(roundtrip(&spec), spec);
    }

    #[test]
    fn test_key_associated_filter() {
        let spec = FilterSpec {
            predicate: vec![9],
            paging: None,
            associated_key: Some(vec![1]),
            partitions: None,
        };
        assert!(spec.manages_own_batching());
        assert_eq!(roundtrip(&spec), spec);
    }

    #[test]
    fn test_restricted_to_sets_partitions() {
        let spec = FilterSpec::from_predicate(vec![5]);
        let mut parts = PartitionSet::empty(8);
        parts.insert(3);
        let restricted = spec.restricted_to(parts.clone());
        assert_eq!(restricted.partitions, Some(parts));
        assert_eq!(restricted.predicate, vec![5]);
        assert!(restricted.manages_own_batching());
        assert_eq!(roundtrip(&restricted), restricted);
    }

    #[test]
    fn test_entry_estimated_size() {
        let entry = Entry::new(vec![0; 10], vec![0; 30]);
        assert_eq!(entry.estimated_wire_size(), 48);
    }
}
