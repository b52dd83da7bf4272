//! Cache protocol request implementations.

use async_trait::async_trait;
use gridlink_core::{ProtocolVersion, Result, VersionedReader, VersionedWriter};

use crate::channel::Channel;
use crate::message::{Message, OrderingKey, Request, Response, Value};
use crate::partition::scan::{run_scan, ScanMode, ScanPayload};
use crate::store::{Entry, FilterSpec, ListenerTarget, ProcessorSpec, SchedulingHints};

use super::type_ids;

/// The fields every named-resource request starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    /// The name of the resource the request addresses.
    pub name: String,
}

impl RequestHeader {
    /// Creates a header for the named resource.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn write_to(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_string(&self.name)
    }

    pub(crate) fn read_from(reader: &mut VersionedReader<'_>) -> Result<Self> {
        Ok(Self {
            name: reader.read_string()?,
        })
    }
}

fn write_keys(writer: &mut VersionedWriter, keys: &[Vec<u8>]) -> Result<()> {
    writer.write_int(keys.len() as i32)?;
    for key in keys {
        writer.write_blob(key)?;
    }
    Ok(())
}

fn read_keys(reader: &mut VersionedReader<'_>) -> Result<Vec<Vec<u8>>> {
    let count = reader.read_int()?;
    let mut keys = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        keys.push(reader.read_blob()?);
    }
    Ok(keys)
}

fn write_entries(writer: &mut VersionedWriter, entries: &[Entry]) -> Result<()> {
    writer.write_int(entries.len() as i32)?;
    for entry in entries {
        writer.write_blob(&entry.key)?;
        writer.write_blob(&entry.value)?;
    }
    Ok(())
}

fn read_entries(reader: &mut VersionedReader<'_>) -> Result<Vec<Entry>> {
    let count = reader.read_int()?;
    let mut entries = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let key = reader.read_blob()?;
        let value = reader.read_blob()?;
        entries.push(Entry::new(key, value));
    }
    Ok(entries)
}

fn scan_payload_value(payload: ScanPayload, limit: i32) -> Value {
    match payload {
        ScanPayload::Keys(mut keys) => {
            if limit > 0 && keys.len() > limit as usize {
                keys.truncate(limit as usize);
            }
            Value::Keys(keys)
        }
        ScanPayload::Entries(mut entries) => {
            if limit > 0 && entries.len() > limit as usize {
                entries.truncate(limit as usize);
            }
            Value::Entries(entries)
        }
    }
}

/// Removes every entry from the named cache.
#[derive(Debug, Clone, Default)]
pub struct ClearRequest {
    /// Common request fields.
    pub header: RequestHeader,
}

impl Message for ClearRequest {
    fn type_id(&self) -> i32 {
        type_ids::CLEAR
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ClearRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel.store().clear(&self.header.name).await
    }
}

/// Tests whether every given key is present.
#[derive(Debug, Clone, Default)]
pub struct ContainsAllRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized keys to test.
    pub keys: Vec<Vec<u8>>,
}

impl Message for ContainsAllRequest {
    fn type_id(&self) -> i32 {
        type_ids::CONTAINS_ALL
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        write_keys(writer, &self.keys)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.keys = read_keys(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ContainsAllRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let present = channel
            .store()
            .contains_all(&self.header.name, &self.keys)
            .await?;
        response.result = Value::Bool(present);
        Ok(())
    }
}

/// Tests whether a single key is present.
#[derive(Debug, Clone, Default)]
pub struct ContainsKeyRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to test.
    pub key: Vec<u8>,
}

impl Message for ContainsKeyRequest {
    fn type_id(&self) -> i32 {
        type_ids::CONTAINS_KEY
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ContainsKeyRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let present = channel
            .store()
            .contains_key(&self.header.name, &self.key)
            .await?;
        response.result = Value::Bool(present);
        Ok(())
    }
}

/// Tests whether any key maps to the given value.
#[derive(Debug, Clone, Default)]
pub struct ContainsValueRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized value to look for.
    pub value: Vec<u8>,
}

impl Message for ContainsValueRequest {
    fn type_id(&self) -> i32 {
        type_ids::CONTAINS_VALUE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.value)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.value = reader.read_blob()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ContainsValueRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let present = channel
            .store()
            .contains_value(&self.header.name, &self.value)
            .await?;
        response.result = Value::Bool(present);
        Ok(())
    }
}

/// Reads the value bound to one key.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to read.
    pub key: Vec<u8>,
}

impl Message for GetRequest {
    fn type_id(&self) -> i32 {
        type_ids::GET
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for GetRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = match channel.store().get(&self.header.name, &self.key).await? {
            Some(value) => Value::Bytes(value),
            None => Value::Null,
        };
        Ok(())
    }
}

/// Reads the entries for a set of keys.
#[derive(Debug, Clone, Default)]
pub struct GetAllRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized keys to read.
    pub keys: Vec<Vec<u8>>,
}

impl Message for GetAllRequest {
    fn type_id(&self) -> i32 {
        type_ids::GET_ALL
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        write_keys(writer, &self.keys)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.keys = read_keys(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for GetAllRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let entries = channel
            .store()
            .get_all(&self.header.name, &self.keys)
            .await?;
        response.result = Value::Entries(entries);
        Ok(())
    }
}

/// Binds a value to a key, optionally with an expiry.
#[derive(Debug, Clone, Default)]
pub struct PutRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key.
    pub key: Vec<u8>,
    /// The serialized value.
    pub value: Vec<u8>,
    /// If set, the previous value comes back in the response.
    pub return_old: bool,
    /// Entry expiry in milliseconds, zero for none. On the wire since V2;
    /// older peers always store without expiry.
    pub expiry_millis: i64,
}

impl Message for PutRequest {
    fn type_id(&self) -> i32 {
        type_ids::PUT
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)?;
        writer.write_blob(&self.value)?;
        writer.write_bool(self.return_old)?;
        writer.write_long_since(ProtocolVersion::V2, self.expiry_millis)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        self.value = reader.read_blob()?;
        self.return_old = reader.read_bool()?;
        self.expiry_millis = reader.read_long_since(ProtocolVersion::V2, 0)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for PutRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let old = channel
            .store()
            .put(&self.header.name, &self.key, &self.value, self.expiry_millis)
            .await?;
        if self.return_old {
            response.result = match old {
                Some(value) => Value::Bytes(value),
                None => Value::Null,
            };
        }
        Ok(())
    }
}

/// Stores a batch of entries.
#[derive(Debug, Clone, Default)]
pub struct PutAllRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The entries to store.
    pub entries: Vec<Entry>,
}

impl Message for PutAllRequest {
    fn type_id(&self) -> i32 {
        type_ids::PUT_ALL
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        write_entries(writer, &self.entries)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.entries = read_entries(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for PutAllRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel
            .store()
            .put_all(&self.header.name, self.entries.clone())
            .await
    }
}

/// Removes one key.
#[derive(Debug, Clone, Default)]
pub struct RemoveRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to remove.
    pub key: Vec<u8>,
    /// If set, the removed value comes back in the response.
    pub return_old: bool,
}

impl Message for RemoveRequest {
    fn type_id(&self) -> i32 {
        type_ids::REMOVE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)?;
        writer.write_bool(self.return_old)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        self.return_old = reader.read_bool()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for RemoveRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let old = channel.store().remove(&self.header.name, &self.key).await?;
        if self.return_old {
            response.result = match old {
                Some(value) => Value::Bytes(value),
                None => Value::Null,
            };
        }
        Ok(())
    }
}

/// Removes a batch of keys.
#[derive(Debug, Clone, Default)]
pub struct RemoveAllRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized keys to remove.
    pub keys: Vec<Vec<u8>>,
}

impl Message for RemoveAllRequest {
    fn type_id(&self) -> i32 {
        type_ids::REMOVE_ALL
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        write_keys(writer, &self.keys)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.keys = read_keys(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for RemoveAllRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel
            .store()
            .remove_all(&self.header.name, &self.keys)
            .await
    }
}

/// Adds or removes a listener for one key.
///
/// Add and remove share a type: the pair orders on the same key, so a
/// remove issued after an add can never overtake it.
#[derive(Debug, Clone, Default)]
pub struct ListenerKeyRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to listen on.
    pub key: Vec<u8>,
    /// True to add the listener, false to remove it.
    pub add: bool,
    /// Deliver lite (key-only) events.
    pub lite: bool,
    /// Prime the listener with the current value. On the wire since V2.
    pub priming: bool,
}

impl Message for ListenerKeyRequest {
    fn type_id(&self) -> i32 {
        type_ids::LISTENER_KEY
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)?;
        writer.write_bool(self.add)?;
        writer.write_bool(self.lite)?;
        writer.write_bool_since(ProtocolVersion::V2, self.priming)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        self.add = reader.read_bool()?;
        self.lite = reader.read_bool()?;
        self.priming = reader.read_bool_since(ProtocolVersion::V2, false)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ListenerKeyRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        let target = ListenerTarget::Key(self.key.clone());
        if self.add {
            channel
                .store()
                .add_listener(&self.header.name, &target, self.lite, self.priming)
                .await
        } else {
            channel
                .store()
                .remove_listener(&self.header.name, &target)
                .await
        }
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(OrderingKey::Key(self.key.clone()))
    }
}

/// Adds or removes a listener for a filter (or for all changes).
#[derive(Debug, Clone, Default)]
pub struct ListenerFilterRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized filter body; `None` listens for all changes.
    pub filter: Option<Vec<u8>>,
    /// True to add the listener, false to remove it.
    pub add: bool,
    /// Deliver lite (key-only) events.
    pub lite: bool,
    /// Prime the listener with current state. On the wire since V2.
    pub priming: bool,
}

impl Message for ListenerFilterRequest {
    fn type_id(&self) -> i32 {
        type_ids::LISTENER_FILTER
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_opt_blob(self.filter.as_deref())?;
        writer.write_bool(self.add)?;
        writer.write_bool(self.lite)?;
        writer.write_bool_since(ProtocolVersion::V2, self.priming)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.filter = reader.read_opt_blob()?;
        self.add = reader.read_bool()?;
        self.lite = reader.read_bool()?;
        self.priming = reader.read_bool_since(ProtocolVersion::V2, false)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for ListenerFilterRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        let target = ListenerTarget::Filter(self.filter.clone());
        if self.add {
            channel
                .store()
                .add_listener(&self.header.name, &target, self.lite, self.priming)
                .await
        } else {
            channel
                .store()
                .remove_listener(&self.header.name, &target)
                .await
        }
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(OrderingKey::Filter(
            self.filter.clone().unwrap_or_default(),
        ))
    }
}

/// Reads the number of entries in the named cache.
#[derive(Debug, Clone, Default)]
pub struct SizeRequest {
    /// Common request fields.
    pub header: RequestHeader,
}

impl Message for SizeRequest {
    fn type_id(&self) -> i32 {
        type_ids::SIZE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for SizeRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = Value::I32(channel.store().size(&self.header.name).await?);
        Ok(())
    }
}

/// Streams the whole key or entry space in partition batches.
///
/// The first call carries an empty cursor; each response's partial state
/// carries the cursor for the next call. The scan is finished when the
/// returned cursor decodes to an empty remaining set.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Include values (entries) rather than bare keys.
    pub include_values: bool,
    /// Opaque resumption cursor from the previous batch, empty to start.
    pub cursor: Vec<u8>,
}

impl Message for PageRequest {
    fn type_id(&self) -> i32 {
        type_ids::PAGE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_bool(self.include_values)?;
        writer.write_blob(&self.cursor)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.include_values = reader.read_bool()?;
        self.cursor = reader.read_blob()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for PageRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let filter = FilterSpec::match_all();
        let mode = if self.include_values {
            ScanMode::Entries { filter: &filter }
        } else {
            ScanMode::Keys { filter: &filter }
        };
        let outcome = run_scan(
            channel.store(),
            &self.header.name,
            mode,
            Some(&self.cursor),
            channel.scan_config(),
        )
        .await?;
        response.result = scan_payload_value(outcome.payload, 0);
        response.set_partial(outcome.cursor.encode()?, None);
        Ok(())
    }
}

/// Queries keys or entries by filter.
///
/// Filters that manage their own pagination (paging state, key
/// association, explicit partitions) run in a single pass against the
/// store; everything else streams through the partition scan engine.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The filter to evaluate.
    pub filter: FilterSpec,
    /// Include values (entries) rather than bare keys.
    pub include_values: bool,
    /// Opaque resumption cursor from the previous batch, empty to start.
    /// Ignored by filters that manage their own pagination.
    pub cursor: Vec<u8>,
    /// Per-batch result cap, zero for unlimited. On the wire since V3.
    pub limit: i32,
}

impl Message for QueryRequest {
    fn type_id(&self) -> i32 {
        type_ids::QUERY
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        self.filter.write_to(writer)?;
        writer.write_bool(self.include_values)?;
        writer.write_blob(&self.cursor)?;
        writer.write_int_since(ProtocolVersion::V3, self.limit)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.filter = FilterSpec::read_from(reader)?;
        self.include_values = reader.read_bool()?;
        self.cursor = reader.read_blob()?;
        self.limit = reader.read_int_since(ProtocolVersion::V3, 0)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for QueryRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        if self.filter.manages_own_batching() {
            // Single-pass path: the filter paginates itself. Member ids
            // inside its cookie are re-resolved against live membership.
            let mut filter = self.filter.clone();
            if let Some(paging) = filter.paging.as_mut() {
                if let Some(cookie) = paging.cookie.take() {
                    paging.cookie = Some(channel.resolve_cookie(cookie));
                }
            }
            let cookie = filter.paging.as_ref().and_then(|p| p.cookie.clone());
            let payload = if self.include_values {
                ScanPayload::Entries(channel.store().entry_set(&self.header.name, &filter).await?)
            } else {
                ScanPayload::Keys(channel.store().key_set(&self.header.name, &filter).await?)
            };
            response.result = scan_payload_value(payload, self.limit);
            response.set_partial(Vec::new(), cookie);
            return Ok(());
        }

        let mode = if self.include_values {
            ScanMode::Entries {
                filter: &self.filter,
            }
        } else {
            ScanMode::Keys {
                filter: &self.filter,
            }
        };
        let outcome = run_scan(
            channel.store(),
            &self.header.name,
            mode,
            Some(&self.cursor),
            channel.scan_config(),
        )
        .await?;
        response.result = scan_payload_value(outcome.payload, self.limit);
        response.set_partial(outcome.cursor.encode()?, None);
        Ok(())
    }
}

/// Adds or removes an index over an extracted attribute.
#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized attribute extractor.
    pub extractor: Vec<u8>,
    /// True to add the index, false to remove it.
    pub add: bool,
    /// Maintain the index in sorted order.
    pub ordered: bool,
}

impl Message for IndexRequest {
    fn type_id(&self) -> i32 {
        type_ids::INDEX
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.extractor)?;
        writer.write_bool(self.add)?;
        writer.write_bool(self.ordered)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.extractor = reader.read_blob()?;
        self.add = reader.read_bool()?;
        self.ordered = reader.read_bool()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for IndexRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        if self.add {
            channel
                .store()
                .add_index(&self.header.name, &self.extractor, self.ordered)
                .await
        } else {
            channel
                .store()
                .remove_index(&self.header.name, &self.extractor)
                .await
        }
    }
}

/// Aggregates over the entries for an explicit key set.
#[derive(Debug, Clone, Default)]
pub struct AggregateAllRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized keys to aggregate over.
    pub keys: Vec<Vec<u8>>,
    /// The serialized aggregator.
    pub aggregator: ProcessorSpec,
}

impl Message for AggregateAllRequest {
    fn type_id(&self) -> i32 {
        type_ids::AGGREGATE_ALL
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        write_keys(writer, &self.keys)?;
        writer.write_blob(&self.aggregator.body)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.keys = read_keys(reader)?;
        self.aggregator = ProcessorSpec::new(reader.read_blob()?);
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for AggregateAllRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let result = channel
            .store()
            .aggregate_keys(&self.header.name, &self.keys, &self.aggregator)
            .await?;
        response.result = Value::Bytes(result);
        Ok(())
    }

    fn scheduling_hints(&self, channel: &Channel) -> SchedulingHints {
        channel
            .store()
            .processor_hints(&self.aggregator)
            .unwrap_or_default()
    }
}

/// Aggregates over every entry matching a filter.
///
/// Aggregation needs the full result in one pass, so this request never
/// streams; the store sees the filter as-is.
#[derive(Debug, Clone, Default)]
pub struct AggregateFilterRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The filter selecting the entries to aggregate.
    pub filter: FilterSpec,
    /// The serialized aggregator.
    pub aggregator: ProcessorSpec,
}

impl Message for AggregateFilterRequest {
    fn type_id(&self) -> i32 {
        type_ids::AGGREGATE_FILTER
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        self.filter.write_to(writer)?;
        writer.write_blob(&self.aggregator.body)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.filter = FilterSpec::read_from(reader)?;
        self.aggregator = ProcessorSpec::new(reader.read_blob()?);
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for AggregateFilterRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let result = channel
            .store()
            .aggregate_filter(&self.header.name, &self.filter, &self.aggregator)
            .await?;
        response.result = Value::Bytes(result);
        Ok(())
    }

    fn scheduling_hints(&self, channel: &Channel) -> SchedulingHints {
        channel
            .store()
            .processor_hints(&self.aggregator)
            .unwrap_or_default()
    }
}

/// Runs an entry processor against one key.
#[derive(Debug, Clone, Default)]
pub struct InvokeRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to process.
    pub key: Vec<u8>,
    /// The serialized entry processor.
    pub processor: ProcessorSpec,
}

impl Message for InvokeRequest {
    fn type_id(&self) -> i32 {
        type_ids::INVOKE
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)?;
        writer.write_blob(&self.processor.body)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        self.processor = ProcessorSpec::new(reader.read_blob()?);
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for InvokeRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let result = channel
            .store()
            .invoke(&self.header.name, &self.key, &self.processor)
            .await?;
        response.result = match result {
            Some(value) => Value::Bytes(value),
            None => Value::Null,
        };
        Ok(())
    }

    fn scheduling_hints(&self, channel: &Channel) -> SchedulingHints {
        channel
            .store()
            .processor_hints(&self.processor)
            .unwrap_or_default()
    }
}

/// Runs an entry processor against an explicit key set.
#[derive(Debug, Clone, Default)]
pub struct InvokeAllRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized keys to process.
    pub keys: Vec<Vec<u8>>,
    /// The serialized entry processor.
    pub processor: ProcessorSpec,
}

impl Message for InvokeAllRequest {
    fn type_id(&self) -> i32 {
        type_ids::INVOKE_ALL
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        write_keys(writer, &self.keys)?;
        writer.write_blob(&self.processor.body)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.keys = read_keys(reader)?;
        self.processor = ProcessorSpec::new(reader.read_blob()?);
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for InvokeAllRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let results = channel
            .store()
            .invoke_keys(&self.header.name, &self.keys, &self.processor)
            .await?;
        response.result = Value::Entries(results);
        Ok(())
    }

    fn scheduling_hints(&self, channel: &Channel) -> SchedulingHints {
        channel
            .store()
            .processor_hints(&self.processor)
            .unwrap_or_default()
    }
}

/// Runs an entry processor against every entry matching a filter, streaming
/// the per-key results in partition batches.
#[derive(Debug, Clone, Default)]
pub struct InvokeFilterRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The filter selecting the entries to process.
    pub filter: FilterSpec,
    /// The serialized entry processor.
    pub processor: ProcessorSpec,
    /// Opaque resumption cursor from the previous batch, empty to start.
    pub cursor: Vec<u8>,
}

impl Message for InvokeFilterRequest {
    fn type_id(&self) -> i32 {
        type_ids::INVOKE_FILTER
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        self.filter.write_to(writer)?;
        writer.write_blob(&self.processor.body)?;
        writer.write_blob(&self.cursor)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.filter = FilterSpec::read_from(reader)?;
        self.processor = ProcessorSpec::new(reader.read_blob()?);
        self.cursor = reader.read_blob()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for InvokeFilterRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        if self.filter.manages_own_batching() {
            let results = channel
                .store()
                .invoke_filter(&self.header.name, &self.filter, &self.processor)
                .await?;
            response.result = Value::Entries(results);
            response.set_partial(Vec::new(), None);
            return Ok(());
        }

        let outcome = run_scan(
            channel.store(),
            &self.header.name,
            ScanMode::InvokeAll {
                filter: &self.filter,
                processor: &self.processor,
            },
            Some(&self.cursor),
            channel.scan_config(),
        )
        .await?;
        response.result = scan_payload_value(outcome.payload, 0);
        response.set_partial(outcome.cursor.encode()?, None);
        Ok(())
    }

    fn scheduling_hints(&self, channel: &Channel) -> SchedulingHints {
        channel
            .store()
            .processor_hints(&self.processor)
            .unwrap_or_default()
    }
}

/// Releases the named resource entirely.
///
/// Orders after everything in flight on the channel, and forgets any lock
/// records for the resource so later unlocks do not touch a destroyed name.
#[derive(Debug, Clone, Default)]
pub struct DestroyRequest {
    /// Common request fields.
    pub header: RequestHeader,
}

impl Message for DestroyRequest {
    fn type_id(&self) -> i32 {
        type_ids::DESTROY
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for DestroyRequest {
    async fn on_run(&self, channel: &Channel, _response: &mut Response) -> Result<()> {
        channel.store().destroy(&self.header.name).await?;
        channel.release_resource_locks(&self.header.name);
        Ok(())
    }

    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(OrderingKey::All)
    }
}

/// Looks a resource name up in the grid's name directory.
#[derive(Debug, Clone, Default)]
pub struct NameLookupRequest {
    /// The name to resolve.
    pub name: String,
}

impl Message for NameLookupRequest {
    fn type_id(&self) -> i32 {
        type_ids::NAME_LOOKUP
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        writer.write_string(&self.name)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.name = reader.read_string()?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for NameLookupRequest {
    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        response.result = match channel.names()?.lookup(&self.name) {
            Some(binding) => Value::Str(binding),
            None => Value::Null,
        };
        Ok(())
    }
}
