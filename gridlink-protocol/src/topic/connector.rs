//! The per-subscription connector behind the topic sub-protocol, and the
//! result shapes it produces.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gridlink_core::{GridError, Result, VersionedReader, VersionedWriter};

/// A position within one topic channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPosition {
    /// The storage page the element lives on.
    pub page: i64,
    /// The offset within the page.
    pub offset: i32,
}

impl TopicPosition {
    /// The position used when no real position is known.
    pub const EMPTY: TopicPosition = TopicPosition {
        page: -1,
        offset: -1,
    };

    /// Creates a position from its parts.
    pub fn new(page: i64, offset: i32) -> Self {
        Self { page, offset }
    }

    /// Writes this position to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_long(self.page)?;
        writer.write_int(self.offset)
    }

    /// Reads a position from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        Ok(Self {
            page: reader.read_long()?,
            offset: reader.read_int()?,
        })
    }
}

/// One element received or peeked from a topic channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicElement {
    /// The channel the element was read from.
    pub channel: i32,
    /// The element's position within the channel.
    pub position: TopicPosition,
    /// The serialized element payload.
    pub payload: Vec<u8>,
}

impl TopicElement {
    /// Writes this element to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        self.position.write_to(writer)?;
        writer.write_blob(&self.payload)
    }

    /// Reads an element from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        Ok(Self {
            channel: reader.read_int()?,
            position: TopicPosition::read_from(reader)?,
            payload: reader.read_blob()?,
        })
    }
}

/// Outcome classification of a receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReceiveStatus {
    /// Elements were (or could have been) returned.
    Success = 0,
    /// The channel has no more elements for this subscriber.
    Exhausted = 1,
    /// The subscriber is no longer known to the topic.
    UnknownSubscriber = 2,
}

impl ReceiveStatus {
    /// Maps a wire value back to a status.
    pub fn from_i32(v: i32) -> Result<Self> {
        match v {
            0 => Ok(ReceiveStatus::Success),
            1 => Ok(ReceiveStatus::Exhausted),
            2 => Ok(ReceiveStatus::UnknownSubscriber),
            other => Err(GridError::Serialization(format!(
                "invalid receive status {other}"
            ))),
        }
    }
}

/// The one response shape every receive produces, regardless of which
/// internal result representation the connector returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleReceiveResult {
    /// The received element payloads, in channel order.
    pub elements: Vec<Vec<u8>>,
    /// The channel the elements came from.
    pub channel: i32,
    /// Elements still available in the channel after this receive.
    pub remaining: i32,
    /// Outcome classification.
    pub status: ReceiveStatus,
    /// The channel head after this receive.
    pub head: TopicPosition,
}

impl SimpleReceiveResult {
    /// Writes this result to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.elements.len() as i32)?;
        for element in &self.elements {
            writer.write_blob(element)?;
        }
        writer.write_int(self.channel)?;
        writer.write_int(self.remaining)?;
        writer.write_int(self.status as i32)?;
        self.head.write_to(writer)
    }

    /// Reads a result from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        let count = reader.read_int()?;
        let mut elements = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            elements.push(reader.read_blob()?);
        }
        Ok(Self {
            elements,
            channel: reader.read_int()?,
            remaining: reader.read_int()?,
            status: ReceiveStatus::from_i32(reader.read_int()?)?,
            head: TopicPosition::read_from(reader)?,
        })
    }
}

/// What a connector hands back from a channel receive.
///
/// Connectors backed by the partitioned poll path return the poll shape;
/// simple connectors return the normalized shape directly. Either way the
/// response carries a [`SimpleReceiveResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The raw poll-processor shape: elements plus channel accounting.
    Poll {
        /// The received element payloads.
        elements: Vec<Vec<u8>>,
        /// Elements still available after this poll.
        remaining: i32,
        /// Outcome classification.
        status: ReceiveStatus,
    },
    /// An already-normalized result.
    Simple(SimpleReceiveResult),
}

impl ReceiveOutcome {
    /// Normalizes this outcome into the single response shape, filling in
    /// the channel id and current head where the poll shape lacks them.
    pub fn normalize(self, channel: i32, head: TopicPosition) -> SimpleReceiveResult {
        match self {
            ReceiveOutcome::Poll {
                elements,
                remaining,
                status,
            } => SimpleReceiveResult {
                elements,
                channel,
                remaining,
                status,
                head,
            },
            ReceiveOutcome::Simple(result) => result,
        }
    }
}

/// Outcome classification of a commit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CommitStatus {
    /// The position was committed.
    Committed = 0,
    /// The position was at or before the previous commit.
    AlreadyCommitted = 1,
    /// The commit was refused.
    Rejected = 2,
    /// The subscriber does not own the channel.
    Unowned = 3,
    /// There was nothing to commit.
    NothingToCommit = 4,
}

impl CommitStatus {
    /// Maps a wire value back to a status.
    pub fn from_i32(v: i32) -> Result<Self> {
        match v {
            0 => Ok(CommitStatus::Committed),
            1 => Ok(CommitStatus::AlreadyCommitted),
            2 => Ok(CommitStatus::Rejected),
            3 => Ok(CommitStatus::Unowned),
            4 => Ok(CommitStatus::NothingToCommit),
            other => Err(GridError::Serialization(format!(
                "invalid commit status {other}"
            ))),
        }
    }
}

/// The combined result of a commit: outcome plus the new channel head, so
/// the client can update local state without a second round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The channel that was committed.
    pub channel: i32,
    /// Outcome classification.
    pub status: CommitStatus,
    /// The channel head after the commit.
    pub head: TopicPosition,
}

impl CommitOutcome {
    /// Writes this outcome to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        writer.write_int(self.status as i32)?;
        self.head.write_to(writer)
    }

    /// Reads an outcome from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        Ok(Self {
            channel: reader.read_int()?,
            status: CommitStatus::from_i32(reader.read_int()?)?,
            head: TopicPosition::read_from(reader)?,
        })
    }
}

/// The new head position after a seek of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekOutcome {
    /// The position the channel head moved to.
    pub position: TopicPosition,
}

/// The per-subscription connector this sub-protocol delegates to.
///
/// The connector already tracks channel ownership and position state; no
/// partition scanning happens here. A "simple" connector supports only the
/// channel-less receive; a channel connector supports only channel-addressed
/// receives. Using the wrong one is an unsupported-operation failure, not an
/// operational error.
#[async_trait]
pub trait TopicConnector: Send + Sync {
    /// True if this connector only supports channel-less simple receives.
    fn is_simple(&self) -> bool {
        false
    }

    /// The channels this subscription currently owns.
    fn owned_channels(&self) -> Vec<i32>;

    /// The current head position of a channel.
    fn channel_head(&self, channel: i32) -> TopicPosition;

    /// Publishes elements to a channel; returns the number accepted.
    async fn offer(&self, channel: i32, elements: Vec<Vec<u8>>) -> Result<i32>;

    /// Receives up to `max_elements` from one channel.
    async fn receive(&self, channel: i32, max_elements: i32) -> Result<ReceiveOutcome>;

    /// Receives up to `max_elements` from any owned channel.
    async fn receive_any(&self, max_elements: i32) -> Result<Vec<TopicElement>>;

    /// Returns the element at `position` without consuming it.
    async fn peek(&self, channel: i32, position: TopicPosition) -> Result<Option<TopicElement>>;

    /// Commits a position in a channel.
    async fn commit(&self, channel: i32, position: TopicPosition) -> Result<CommitStatus>;

    /// Returns true if `position` has been committed in `channel`.
    async fn is_committed(&self, channel: i32, position: TopicPosition) -> Result<bool>;

    /// The last committed position per channel for this subscriber group.
    async fn last_committed(&self) -> Result<BTreeMap<i32, TopicPosition>>;

    /// The current head position of each requested channel.
    async fn heads(&self, channels: &[i32]) -> Result<BTreeMap<i32, TopicPosition>>;

    /// The current tail position of every channel.
    async fn tails(&self) -> Result<BTreeMap<i32, TopicPosition>>;

    /// Moves channel heads to explicit positions.
    async fn seek_to_position(
        &self,
        positions: &BTreeMap<i32, TopicPosition>,
    ) -> Result<BTreeMap<i32, SeekOutcome>>;

    /// Moves channel heads to the first element at or after each timestamp
    /// (epoch milliseconds).
    async fn seek_to_timestamp(
        &self,
        timestamps: &BTreeMap<i32, i64>,
    ) -> Result<BTreeMap<i32, SeekOutcome>>;

    /// Keeps the subscription alive.
    async fn heartbeat(&self, async_heartbeat: bool) -> Result<()>;

    /// Counts the elements remaining in the given channels (all owned
    /// channels when empty).
    async fn remaining(&self, channels: &[i32]) -> Result<i32>;

    /// Ensures a durable subscriber group exists.
    async fn ensure_group(&self, group: &str) -> Result<()>;

    /// Destroys a durable subscriber group.
    async fn destroy_group(&self, group: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::ProtocolVersion;

    #[test]
    fn test_position_roundtrip() {
        let pos = TopicPosition::new(42, 7);
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        pos.write_to(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert_eq!(TopicPosition::read_from(&mut reader).unwrap(), pos);
    }

    #[test]
    fn test_poll_outcome_normalizes_with_head() {
        let outcome = ReceiveOutcome::Poll {
            elements: vec![vec![1], vec![2]],
            remaining: 5,
            status: ReceiveStatus::Success,
        };
        let head = TopicPosition::new(3, 0);
        let result = outcome.normalize(9, head);
        assert_eq!(result.channel, 9);
        assert_eq!(result.head, head);
        assert_eq!(result.elements.len(), 2);
        assert_eq!(result.remaining, 5);
    }

    #[test]
    fn test_simple_outcome_passes_through() {
        let inner = SimpleReceiveResult {
            elements: vec![vec![9]],
            channel: 1,
            remaining: 0,
            status: ReceiveStatus::Exhausted,
            head: TopicPosition::EMPTY,
        };
        let result = ReceiveOutcome::Simple(inner.clone()).normalize(77, TopicPosition::new(1, 1));
        assert_eq!(result, inner);
    }

    #[test]
    fn test_receive_result_roundtrip() {
        let result = SimpleReceiveResult {
            elements: vec![vec![1, 2], vec![]],
            channel: 4,
            remaining: 12,
            status: ReceiveStatus::Success,
            head: TopicPosition::new(8, 1),
        };
        let mut writer = VersionedWriter::new(ProtocolVersion::V1);
        result.write_to(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = VersionedReader::new(&bytes, ProtocolVersion::V1);
        assert_eq!(SimpleReceiveResult::read_from(&mut reader).unwrap(), result);
    }

    #[test]
    fn test_invalid_status_rejected() {
        assert!(ReceiveStatus::from_i32(9).is_err());
        assert!(CommitStatus::from_i32(-1).is_err());
    }
}
