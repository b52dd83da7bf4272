//! Topic protocol request implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gridlink_core::{GridError, ProtocolId, Result, VersionedReader, VersionedWriter};

use crate::channel::Channel;
use crate::message::{Message, OrderingKey, Request, Response, Value};
use crate::registry::MessageRegistry;

use super::connector::{CommitOutcome, TopicPosition};

/// Message type ids of the topic protocol.
pub mod type_ids {
    /// [`super::RemainingMessagesRequest`]
    pub const REMAINING_MESSAGES: i32 = 1;
    /// [`super::EnsureSubscriberGroupRequest`]
    pub const ENSURE_SUBSCRIBER_GROUP: i32 = 2;
    /// [`super::DestroySubscriberGroupRequest`]
    pub const DESTROY_SUBSCRIBER_GROUP: i32 = 3;
    /// [`super::PublishRequest`]
    pub const PUBLISH: i32 = 7;
    /// [`super::GetOwnedChannelsRequest`]
    pub const GET_OWNED_CHANNELS: i32 = 13;
    /// [`super::ReceiveRequest`]
    pub const RECEIVE: i32 = 14;
    /// [`super::PeekRequest`]
    pub const PEEK: i32 = 16;
    /// [`super::CommitRequest`]
    pub const COMMIT: i32 = 17;
    /// [`super::IsCommittedRequest`]
    pub const IS_COMMITTED: i32 = 19;
    /// [`super::GetLastCommittedRequest`]
    pub const GET_LAST_COMMITTED: i32 = 20;
    /// [`super::GetHeadsRequest`]
    pub const GET_HEADS: i32 = 21;
    /// [`super::GetTailsRequest`]
    pub const GET_TAILS: i32 = 22;
    /// [`super::SeekRequest`]
    pub const SEEK: i32 = 23;
    /// [`super::HeartbeatRequest`]
    pub const HEARTBEAT: i32 = 24;
    /// [`super::SimpleReceiveRequest`]
    pub const SIMPLE_RECEIVE: i32 = 26;
}

/// Registers every topic protocol message type.
pub(crate) fn register(registry: &mut MessageRegistry) {
    use type_ids::*;
    let p = ProtocolId::Topic;
    registry.register(p, REMAINING_MESSAGES, || {
        Box::new(RemainingMessagesRequest::default())
    });
    registry.register(p, ENSURE_SUBSCRIBER_GROUP, || {
        Box::new(EnsureSubscriberGroupRequest::default())
    });
    registry.register(p, DESTROY_SUBSCRIBER_GROUP, || {
        Box::new(DestroySubscriberGroupRequest::default())
    });
    registry.register(p, PUBLISH, || Box::new(PublishRequest::default()));
    registry.register(p, GET_OWNED_CHANNELS, || {
        Box::new(GetOwnedChannelsRequest::default())
    });
    registry.register(p, RECEIVE, || Box::new(ReceiveRequest::default()));
    registry.register(p, PEEK, || Box::new(PeekRequest::default()));
    registry.register(p, COMMIT, || Box::new(CommitRequest::default()));
    registry.register(p, IS_COMMITTED, || Box::new(IsCommittedRequest::default()));
    registry.register(p, GET_LAST_COMMITTED, || {
        Box::new(GetLastCommittedRequest::default())
    });
    registry.register(p, GET_HEADS, || Box::new(GetHeadsRequest::default()));
    registry.register(p, GET_TAILS, || Box::new(GetTailsRequest::default()));
    registry.register(p, SEEK, || Box::new(SeekRequest::default()));
    registry.register(p, HEARTBEAT, || Box::new(HeartbeatRequest::default()));
    registry.register(p, SIMPLE_RECEIVE, || {
        Box::new(SimpleReceiveRequest::default())
    });
}

fn write_channels(writer: &mut VersionedWriter, channels: &[i32]) -> Result<()> {
    writer.write_int(channels.len() as i32)?;
    for channel in channels {
        writer.write_int(*channel)?;
    }
    Ok(())
}

fn read_channels(reader: &mut VersionedReader<'_>) -> Result<Vec<i32>> {
    let count = reader.read_int()?;
    let mut channels = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        channels.push(reader.read_int()?);
    }
    Ok(channels)
}

fn channel_ordering_key(channel: i32) -> OrderingKey {
    OrderingKey::Key(channel.to_be_bytes().to_vec())
}

/// Counts the elements left in the given channels (all owned channels when
/// empty).
#[derive(Debug, Clone, Default)]
pub struct RemainingMessagesRequest {
    /// The channels to count, empty for all owned channels.
    pub channels: Vec<i32>,
}

impl Message for RemainingMessagesRequest {
    fn type_id(&self) -> i32 {
        type_ids::REMAINING_MESSAGES
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        write_channels(writer, &self.channels)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channels = read_channels(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for RemainingMessagesRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let remaining = channel.topic()?.remaining(&self.channels).await?;
        response.result = Value::I32(remaining);
        Ok(())
    }
}

/// Ensures a durable subscriber group exists.
#[derive(Debug, Clone, Default)]
pub struct EnsureSubscriberGroupRequest {
    /// The group name.
    pub group: String,
}

impl Message for EnsureSubscriberGroupRequest {
    fn type_id(&self) -> i32 {
        type_ids::ENSURE_SUBSCRIBER_GROUP
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_string(&self.group)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.group = reader.read_string()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for EnsureSubscriberGroupRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel.topic()?.ensure_group(&self.group).await
    }
}

/// Destroys a durable subscriber group.
#[derive(Debug, Clone, Default)]
pub struct DestroySubscriberGroupRequest {
    /// The group name.
    pub group: String,
}

impl Message for DestroySubscriberGroupRequest {
    fn type_id(&self) -> i32 {
        type_ids::DESTROY_SUBSCRIBER_GROUP
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_string(&self.group)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.group = reader.read_string()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for DestroySubscriberGroupRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel.topic()?.destroy_group(&self.group).await
    }
}

/// Publishes a batch of elements to one channel.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// The channel to publish to.
    pub channel: i32,
    /// The serialized elements, in publish order.
    pub elements: Vec<Vec<u8>>,
}

impl Message for PublishRequest {
    fn type_id(&self) -> i32 {
        type_ids::PUBLISH
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        writer.write_int(self.elements.len() as i32)?;
        for element in &self.elements {
            writer.write_blob(element)?;
        }
        Ok(())
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channel = reader.read_int()?;
        let count = reader.read_int()?;
        let mut elements = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            elements.push(reader.read_blob()?);
        }
        self.elements = elements;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for PublishRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let accepted = channel
            .topic()?
            .offer(self.channel, self.elements.clone())
            .await?;
        response.result = Value::I32(accepted);
        Ok(())
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        // Publish order within a channel is the order elements land in.
        Some(channel_ordering_key(self.channel))
    }
}

/// Reads the set of channels this subscription currently owns.
#[derive(Debug, Clone, Default)]
pub struct GetOwnedChannelsRequest;

impl Message for GetOwnedChannelsRequest {
    fn type_id(&self) -> i32 {
        type_ids::GET_OWNED_CHANNELS
    }

    fn encode(&self, _writer: &mut VersionedWriter) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, _reader: &mut VersionedReader<'_>) -> Result<()> {
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for GetOwnedChannelsRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let owned = channel.topic()?.owned_channels();
        response.result = Value::List(owned.into_iter().map(Value::I32).collect());
        Ok(())
    }
}

/// Receives up to `max_elements` from one channel.
///
/// Only valid against a channel connector; a simple connector answers with
/// an unsupported-operation failure.
#[derive(Debug, Clone, Default)]
pub struct ReceiveRequest {
    /// The channel to receive from.
    pub channel: i32,
    /// Maximum elements to return.
    pub max_elements: i32,
}

impl Message for ReceiveRequest {
    fn type_id(&self) -> i32 {
        type_ids::RECEIVE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        writer.write_int(self.max_elements)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channel = reader.read_int()?;
        self.max_elements = reader.read_int()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ReceiveRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let connector = channel.topic()?;
        if connector.is_simple() {
            return Err(GridError::Unsupported(
                "channel receive on a simple subscriber".to_string(),
            ));
        }
        let outcome = connector.receive(self.channel, self.max_elements).await?;
        let head = connector.channel_head(self.channel);
        response.result = Value::Receive(outcome.normalize(self.channel, head));
        Ok(())
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(channel_ordering_key(self.channel))
    }
}

/// Reads the element at one position without consuming it.
#[derive(Debug, Clone, Default)]
pub struct PeekRequest {
    /// The channel to peek into.
    pub channel: i32,
    /// The position to peek at.
    pub position: TopicPosition,
}

impl Message for PeekRequest {
    fn type_id(&self) -> i32 {
        type_ids::PEEK
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        self.position.write_to(writer)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channel = reader.read_int()?;
        self.position = TopicPosition::read_from(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for PeekRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = match channel.topic()?.peek(self.channel, self.position).await? {
            Some(element) => Value::Element(element),
            None => Value::Null,
        };
        Ok(())
    }
}

/// Commits a position in one channel.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// The channel to commit in.
    pub channel: i32,
    /// The position to commit.
    pub position: TopicPosition,
}

impl Message for CommitRequest {
    fn type_id(&self) -> i32 {
        type_ids::COMMIT
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        self.position.write_to(writer)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channel = reader.read_int()?;
        self.position = TopicPosition::read_from(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for CommitRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let connector = channel.topic()?;
        let status = connector.commit(self.channel, self.position).await?;
        // The head rides back with the outcome so the client can update
        // its view without another round trip.
        let head = connector.channel_head(self.channel);
        response.result = Value::Commit(CommitOutcome {
            channel: self.channel,
            status,
            head,
        });
        Ok(())
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(channel_ordering_key(self.channel))
    }
}

/// Tests whether a position has been committed.
#[derive(Debug, Clone, Default)]
pub struct IsCommittedRequest {
    /// The channel to test in.
    pub channel: i32,
    /// The position to test.
    pub position: TopicPosition,
}

impl Message for IsCommittedRequest {
    fn type_id(&self) -> i32 {
        type_ids::IS_COMMITTED
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.channel)?;
        self.position.write_to(writer)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channel = reader.read_int()?;
        self.position = TopicPosition::read_from(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for IsCommittedRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let committed = channel
            .topic()?
            .is_committed(self.channel, self.position)
            .await?;
        response.result = Value::Bool(committed);
        Ok(())
    }
}

/// Reads the last committed position of every channel.
#[derive(Debug, Clone, Default)]
pub struct GetLastCommittedRequest;

impl Message for GetLastCommittedRequest {
    fn type_id(&self) -> i32 {
        type_ids::GET_LAST_COMMITTED
    }

    fn encode(&self, _writer: &mut VersionedWriter) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, _reader: &mut VersionedReader<'_>) -> Result<()> {
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for GetLastCommittedRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = Value::PositionMap(channel.topic()?.last_committed().await?);
        Ok(())
    }
}

/// Reads the head position of the given channels.
#[derive(Debug, Clone, Default)]
pub struct GetHeadsRequest {
    /// The channels to read heads for.
    pub channels: Vec<i32>,
}

impl Message for GetHeadsRequest {
    fn type_id(&self) -> i32 {
        type_ids::GET_HEADS
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        write_channels(writer, &self.channels)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.channels = read_channels(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for GetHeadsRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = Value::PositionMap(channel.topic()?.heads(&self.channels).await?);
        Ok(())
    }
}

/// Reads the tail position of every channel.
#[derive(Debug, Clone, Default)]
pub struct GetTailsRequest;

impl Message for GetTailsRequest {
    fn type_id(&self) -> i32 {
        type_ids::GET_TAILS
    }

    fn encode(&self, _writer: &mut VersionedWriter) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, _reader: &mut VersionedReader<'_>) -> Result<()> {
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for GetTailsRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = Value::PositionMap(channel.topic()?.tails().await?);
        Ok(())
    }
}

/// Moves channel heads, either to explicit positions or to the first
/// element at or after a timestamp.
///
/// Positions take precedence when both are given; carrying neither is a
/// protocol error.
#[derive(Debug, Clone, Default)]
pub struct SeekRequest {
    /// Explicit target positions per channel.
    pub positions: BTreeMap<i32, TopicPosition>,
    /// Target timestamps (epoch milliseconds) per channel.
    pub timestamps: BTreeMap<i32, i64>,
}

impl Message for SeekRequest {
    fn type_id(&self) -> i32 {
        type_ids::SEEK
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.positions.len() as i32)?;
        for (channel, position) in &self.positions {
            writer.write_int(*channel)?;
            position.write_to(writer)?;
        }
        writer.write_int(self.timestamps.len() as i32)?;
        for (channel, timestamp) in &self.timestamps {
            writer.write_int(*channel)?;
            writer.write_long(*timestamp)?;
        }
        Ok(())
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        let count = reader.read_int()?;
        let mut positions = BTreeMap::new();
        for _ in 0..count {
            let channel = reader.read_int()?;
            positions.insert(channel, TopicPosition::read_from(reader)?);
        }
        self.positions = positions;

        let count = reader.read_int()?;
        let mut timestamps = BTreeMap::new();
        for _ in 0..count {
            let channel = reader.read_int()?;
            timestamps.insert(channel, reader.read_long()?);
        }
        self.timestamps = timestamps;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for SeekRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let connector = channel.topic()?;
        let outcomes = if !self.positions.is_empty() {
            connector.seek_to_position(&self.positions).await?
        } else if !self.timestamps.is_empty() {
            connector.seek_to_timestamp(&self.timestamps).await?
        } else {
            return Err(GridError::Protocol(
                "seek carries neither positions nor timestamps".to_string(),
            ));
        };
        response.result = Value::SeekMap(outcomes);
        Ok(())
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        // Seeks rewrite head state for several channels at once.
        Some(OrderingKey::All)
    }
}

/// Keeps the subscription alive.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatRequest {
    /// True if the server should not block on heartbeat bookkeeping.
    pub async_heartbeat: bool,
}

impl Message for HeartbeatRequest {
    fn type_id(&self) -> i32 {
        type_ids::HEARTBEAT
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_bool(self.async_heartbeat)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.async_heartbeat = reader.read_bool()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for HeartbeatRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel.topic()?.heartbeat(self.async_heartbeat).await
    }
}

/// Receives up to `max_elements` from any owned channel.
///
/// Only valid against a simple connector; a channel connector answers with
/// an unsupported-operation failure.
#[derive(Debug, Clone, Default)]
pub struct SimpleReceiveRequest {
    /// Maximum elements to return.
    pub max_elements: i32,
}

impl Message for SimpleReceiveRequest {
    fn type_id(&self) -> i32 {
        type_ids::SIMPLE_RECEIVE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_int(self.max_elements)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.max_elements = reader.read_int()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for SimpleReceiveRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let connector = channel.topic()?;
        if !connector.is_simple() {
            return Err(GridError::Unsupported(
                "simple receive on a channel subscriber".to_string(),
            ));
        }
        let elements = connector.receive_any(self.max_elements).await?;
        response.result = Value::List(elements.into_iter().map(Value::Element).collect());
        Ok(())
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        // A simple subscriber has one logical stream.
        Some(OrderingKey::All)
    }
}
