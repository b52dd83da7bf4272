//! The partitioned cache protocol: map access, queries, entry-processor
//! invocation, aggregation, locking, listeners, and name lookup.

use gridlink_core::ProtocolId;

use crate::registry::MessageRegistry;

mod lock;
mod messages;

pub use lock::{LockRequest, UnlockRequest};
pub use messages::{
    AggregateAllRequest, AggregateFilterRequest, ClearRequest, ContainsAllRequest,
    ContainsKeyRequest, ContainsValueRequest, DestroyRequest, GetAllRequest, GetRequest,
    IndexRequest, InvokeAllRequest, InvokeFilterRequest, InvokeRequest, ListenerFilterRequest,
    ListenerKeyRequest, NameLookupRequest, PageRequest, PutAllRequest, PutRequest, QueryRequest,
    RemoveAllRequest, RemoveRequest, RequestHeader, SizeRequest,
};

/// Message type ids of the cache protocol.
pub mod type_ids {
    /// [`super::ClearRequest`]
    pub const CLEAR: i32 = 1;
    /// [`super::ContainsAllRequest`]
    pub const CONTAINS_ALL: i32 = 2;
    /// [`super::ContainsKeyRequest`]
    pub const CONTAINS_KEY: i32 = 3;
    /// [`super::ContainsValueRequest`]
    pub const CONTAINS_VALUE: i32 = 4;
    /// [`super::GetRequest`]
    pub const GET: i32 = 5;
    /// [`super::GetAllRequest`]
    pub const GET_ALL: i32 = 6;
    /// [`super::PutRequest`]
    pub const PUT: i32 = 7;
    /// [`super::PutAllRequest`]
    pub const PUT_ALL: i32 = 8;
    /// [`super::RemoveRequest`]
    pub const REMOVE: i32 = 9;
    /// [`super::RemoveAllRequest`]
    pub const REMOVE_ALL: i32 = 10;
    /// [`super::ListenerKeyRequest`]
    pub const LISTENER_KEY: i32 = 11;
    /// [`super::ListenerFilterRequest`]
    pub const LISTENER_FILTER: i32 = 12;
    /// [`super::SizeRequest`]
    pub const SIZE: i32 = 13;
    /// [`super::PageRequest`]
    pub const PAGE: i32 = 21;
    /// [`super::LockRequest`]
    pub const LOCK: i32 = 31;
    /// [`super::UnlockRequest`]
    pub const UNLOCK: i32 = 32;
    /// [`super::QueryRequest`]
    pub const QUERY: i32 = 41;
    /// [`super::IndexRequest`]
    pub const INDEX: i32 = 42;
    /// [`super::AggregateAllRequest`]
    pub const AGGREGATE_ALL: i32 = 51;
    /// [`super::AggregateFilterRequest`]
    pub const AGGREGATE_FILTER: i32 = 52;
    /// [`super::InvokeRequest`]
    pub const INVOKE: i32 = 53;
    /// [`super::InvokeAllRequest`]
    pub const INVOKE_ALL: i32 = 54;
    /// [`super::InvokeFilterRequest`]
    pub const INVOKE_FILTER: i32 = 55;
    /// [`super::DestroyRequest`]
    pub const DESTROY: i32 = 61;
    /// [`super::NameLookupRequest`]
    pub const NAME_LOOKUP: i32 = 62;
}

/// Registers every cache protocol message type.
pub(crate) fn register(registry: &mut MessageRegistry) {
    use type_ids::*;
    let p = ProtocolId::Cache;
    registry.register(p, CLEAR, || Box::new(ClearRequest::default()));
    registry.register(p, CONTAINS_ALL, || Box::new(ContainsAllRequest::default()));
    registry.register(p, CONTAINS_KEY, || Box::new(ContainsKeyRequest::default()));
    registry.register(p, CONTAINS_VALUE, || {
        Box::new(ContainsValueRequest::default())
    });
    registry.register(p, GET, || Box::new(GetRequest::default()));
    registry.register(p, GET_ALL, || Box::new(GetAllRequest::default()));
    registry.register(p, PUT, || Box::new(PutRequest::default()));
    registry.register(p, PUT_ALL, || Box::new(PutAllRequest::default()));
    registry.register(p, REMOVE, || Box::new(RemoveRequest::default()));
    registry.register(p, REMOVE_ALL, || Box::new(RemoveAllRequest::default()));
    registry.register(p, LISTENER_KEY, || Box::new(ListenerKeyRequest::default()));
    registry.register(p, LISTENER_FILTER, || {
        Box::new(ListenerFilterRequest::default())
    });
    registry.register(p, SIZE, || Box::new(SizeRequest::default()));
    registry.register(p, PAGE, || Box::new(PageRequest::default()));
    registry.register(p, LOCK, || Box::new(LockRequest::default()));
    registry.register(p, UNLOCK, || Box::new(UnlockRequest::default()));
    registry.register(p, QUERY, || Box::new(QueryRequest::default()));
    registry.register(p, INDEX, || Box::new(IndexRequest::default()));
    registry.register(p, AGGREGATE_ALL, || {
        Box::new(AggregateAllRequest::default())
    });
    registry.register(p, AGGREGATE_FILTER, || {
        Box::new(AggregateFilterRequest::default())
    });
    registry.register(p, INVOKE, || Box::new(InvokeRequest::default()));
    registry.register(p, INVOKE_ALL, || Box::new(InvokeAllRequest::default()));
    registry.register(p, INVOKE_FILTER, || {
        Box::new(InvokeFilterRequest::default())
    });
    registry.register(p, DESTROY, || Box::new(DestroyRequest::default()));
    registry.register(p, NAME_LOOKUP, || Box::new(NameLookupRequest::default()));
}
