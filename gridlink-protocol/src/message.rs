//! The message and request abstractions every protocol operation builds on.
//!
//! A [`Message`] knows its type id and how to encode/decode itself against a
//! negotiated protocol version. A [`Request`] is a message the server
//! executes: decode, run against a [`Channel`](crate::channel::Channel),
//! encode the resulting [`Response`]. Responses are messages too and flow
//! through the same registry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gridlink_core::{
    protocol, GridError, ProtocolVersion, Result, VersionedReader, VersionedWriter,
};

use crate::channel::Channel;
use crate::store::{Entry, FilterCookie, SchedulingHints};
use crate::topic::connector::{
    CommitOutcome, SeekOutcome, SimpleReceiveResult, TopicElement, TopicPosition,
};

/// A typed, versioned wire message.
///
/// Implementations encode only the fields the negotiated version supports
/// and fill version-gated fields with defaults on decode, so a single
/// implementation serves every version from [`Message::min_version`] up.
pub trait Message: Send + Sync {
    /// The message's type id within its protocol.
    fn type_id(&self) -> i32;

    /// The oldest protocol version able to carry this message.
    fn min_version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    /// Encodes this message's payload at the given version.
    fn encode(&self, writer: &mut VersionedWriter) -> Result<()>;

    /// Decodes this message's payload at the given version.
    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()>;

    /// Downcast hook: returns the executable view of this message, or
    /// `None` for messages that are not requests (responses, events).
    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        None
    }
}

impl std::fmt::Debug for dyn Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("type_id", &self.type_id())
            .finish()
    }
}

/// A message the server executes against a channel.
#[async_trait]
pub trait Request: Message {
    /// Executes this request, writing its outcome into `response`.
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()>;

    /// The key this request serializes on, if any. Requests sharing an
    /// ordering key execute one at a time in arrival order; requests
    /// without one run concurrently.
    fn ordering_key(&self) -> Option<OrderingKey> {
        None
    }

    /// Advisory scheduling hints for the host scheduler.
    fn scheduling_hints(&self, _channel: &Channel) -> SchedulingHints {
        SchedulingHints::default()
    }
}

/// The identity requests serialize on.
///
/// Derived equality is deliberately coarse: a listener-add and a
/// listener-remove for the same key or filter produce equal keys, so the
/// pair serializes even though the requests differ in every other way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderingKey {
    /// Serialize on a single serialized key.
    Key(Vec<u8>),
    /// Serialize on a serialized filter body.
    Filter(Vec<u8>),
    /// Serialize on the whole channel.
    All,
}

/// A typed result value carried inside a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// No result.
    #[default]
    Null,
    /// A boolean result.
    Bool(bool),
    /// A 32-bit integer result.
    I32(i32),
    /// A 64-bit integer result.
    I64(i64),
    /// An opaque serialized object.
    Bytes(Vec<u8>),
    /// A string result.
    Str(String),
    /// A collection of serialized keys.
    Keys(Vec<Vec<u8>>),
    /// A collection of entries.
    Entries(Vec<Entry>),
    /// A list of nested values.
    List(Vec<Value>),
    /// A single topic position.
    Position(TopicPosition),
    /// Topic positions keyed by channel.
    PositionMap(BTreeMap<i32, TopicPosition>),
    /// A normalized topic receive result.
    Receive(SimpleReceiveResult),
    /// A topic commit outcome.
    Commit(CommitOutcome),
    /// Seek outcomes keyed by channel.
    SeekMap(BTreeMap<i32, SeekOutcome>),
    /// A single topic element.
    Element(TopicElement),
}

impl Value {
    fn tag(&self) -> i8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I32(_) => 2,
            Value::I64(_) => 3,
            Value::Bytes(_) => 4,
            Value::Str(_) => 5,
            Value::Keys(_) => 6,
            Value::Entries(_) => 7,
            Value::List(_) => 8,
            Value::Position(_) => 9,
            Value::PositionMap(_) => 10,
            Value::Receive(_) => 11,
            Value::Commit(_) => 12,
            Value::SeekMap(_) => 13,
            Value::Element(_) => 14,
        }
    }

    /// Writes this value, tag first, to the given writer.
    pub fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_byte(self.tag())?;
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => writer.write_bool(*b),
            Value::I32(i) => writer.write_int(*i),
            Value::I64(l) => writer.write_long(*l),
            Value::Bytes(b) => writer.write_blob(b),
            Value::Str(s) => writer.write_string(s),
            Value::Keys(keys) => {
                writer.write_int(keys.len() as i32)?;
                for key in keys {
                    writer.write_blob(key)?;
                }
                Ok(())
            }
            Value::Entries(entries) => {
                writer.write_int(entries.len() as i32)?;
                for entry in entries {
                    writer.write_blob(&entry.key)?;
                    writer.write_blob(&entry.value)?;
                }
                Ok(())
            }
            Value::List(values) => {
                writer.write_int(values.len() as i32)?;
                for value in values {
                    value.write_to(writer)?;
                }
                Ok(())
            }
            Value::Position(pos) => pos.write_to(writer),
            Value::PositionMap(map) => {
                writer.write_int(map.len() as i32)?;
                for (channel, pos) in map {
                    writer.write_int(*channel)?;
                    pos.write_to(writer)?;
                }
                Ok(())
            }
            Value::Receive(result) => result.write_to(writer),
            Value::Commit(outcome) => outcome.write_to(writer),
            Value::SeekMap(map) => {
                writer.write_int(map.len() as i32)?;
                for (channel, outcome) in map {
                    writer.write_int(*channel)?;
                    outcome.position.write_to(writer)?;
                }
                Ok(())
            }
            Value::Element(element) => element.write_to(writer),
        }
    }

    /// Reads a tagged value from the given reader.
    pub fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        let tag = reader.read_byte()?;
        match tag {
            0 => Ok(Value::Null),
            1 => Ok(Value::Bool(reader.read_bool()?)),
            2 => Ok(Value::I32(reader.read_int()?)),
            3 => Ok(Value::I64(reader.read_long()?)),
            4 => Ok(Value::Bytes(reader.read_blob()?)),
            5 => Ok(Value::Str(reader.read_string()?)),
            6 => {
                let count = reader.read_int()?;
                let mut keys = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    keys.push(reader.read_blob()?);
                }
                Ok(Value::Keys(keys))
            }
            7 => {
                let count = reader.read_int()?;
                let mut entries = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    let key = reader.read_blob()?;
                    let value = reader.read_blob()?;
                    entries.push(Entry::new(key, value));
                }
                Ok(Value::Entries(entries))
            }
            8 => {
                let count = reader.read_int()?;
                let mut values = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    values.push(Value::read_from(reader)?);
                }
                Ok(Value::List(values))
            }
            9 => Ok(Value::Position(TopicPosition::read_from(reader)?)),
            10 => {
                let count = reader.read_int()?;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let channel = reader.read_int()?;
                    map.insert(channel, TopicPosition::read_from(reader)?);
                }
                Ok(Value::PositionMap(map))
            }
            11 => Ok(Value::Receive(SimpleReceiveResult::read_from(reader)?)),
            12 => Ok(Value::Commit(CommitOutcome::read_from(reader)?)),
            13 => {
                let count = reader.read_int()?;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let channel = reader.read_int()?;
                    let position = TopicPosition::read_from(reader)?;
                    map.insert(channel, SeekOutcome { position });
                }
                Ok(Value::SeekMap(map))
            }
            14 => Ok(Value::Element(TopicElement::read_from(reader)?)),
            other => Err(GridError::Serialization(format!(
                "unknown value tag {other}"
            ))),
        }
    }
}

/// Continuation state a partial response carries alongside its results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialState {
    /// The opaque scan cursor to resume from; empty marks an exhausted
    /// filter-managed scan.
    pub cursor: Vec<u8>,
    /// Pass-through cookie of a filter that pages itself.
    pub filter_cookie: Option<FilterCookie>,
}

/// The server's reply to one request.
///
/// A response either carries a result value or a failure, never both.
/// Streaming operations additionally carry [`PartialState`]; such responses
/// encode under the partial-response type id so the decoder knows the extra
/// fields follow.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// The id of the request being answered.
    pub request_id: i64,
    /// The result value. Meaningless when `failure` is set.
    pub result: Value,
    /// True if the request failed.
    pub failure: bool,
    /// Failure description, present exactly when `failure` is set.
    pub error: Option<String>,
    /// Continuation state of a streaming operation.
    pub partial: Option<PartialState>,
}

impl Response {
    /// Creates an empty successful response for `request_id`.
    pub fn new(request_id: i64) -> Self {
        Self {
            request_id,
            ..Self::default()
        }
    }

    /// Creates an empty response that decodes partial-response payloads.
    pub fn new_partial() -> Self {
        Self {
            partial: Some(PartialState::default()),
            ..Self::default()
        }
    }

    /// Marks this response failed, discarding any result and partial state.
    pub fn fail(&mut self, error: &GridError) {
        self.failure = true;
        self.error = Some(error.to_string());
        self.result = Value::Null;
        self.partial = None;
    }

    /// Attaches continuation state, making this a partial response.
    pub fn set_partial(&mut self, cursor: Vec<u8>, filter_cookie: Option<FilterCookie>) {
        self.partial = Some(PartialState {
            cursor,
            filter_cookie,
        });
    }
}

impl Message for Response {
    fn type_id(&self) -> i32 {
        if self.partial.is_some() {
            protocol::PARTIAL_RESPONSE_TYPE_ID
        } else {
            protocol::RESPONSE_TYPE_ID
        }
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_long(self.request_id)?;
        writer.write_bool(self.failure)?;
        if self.failure {
            writer.write_string(self.error.as_deref().unwrap_or(""))?;
        } else {
            self.result.write_to(writer)?;
        }
        if let Some(partial) = &self.partial {
            writer.write_blob(&partial.cursor)?;
            match &partial.filter_cookie {
                Some(cookie) => {
                    writer.write_bool(true)?;
                    cookie.write_to(writer)?;
                }
                None => writer.write_bool(false)?,
            }
        }
        Ok(())
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.request_id = reader.read_long()?;
        self.failure = reader.read_bool()?;
        if self.failure {
            self.error = Some(reader.read_string()?);
            self.result = Value::Null;
        } else {
            self.error = None;
            self.result = Value::read_from(reader)?;
        }
        // Whether partial fields follow is decided by the type id the
        // response was created under, not by the payload itself.
        if self.partial.is_some() {
            let cursor = reader.read_blob()?;
            let filter_cookie = if reader.read_bool()? {
                Some(FilterCookie::read_from(reader)?)
            } else {
                None
            };
            self.partial = Some(PartialState {
                cursor,
                filter_cookie,
            });
        }
        Ok(())
    }
}
