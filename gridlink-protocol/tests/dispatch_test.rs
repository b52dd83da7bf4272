//! Envelope dispatch through the registry: decode, execute, respond.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use gridlink_core::{
    protocol, Envelope, ProtocolId, ProtocolVersion, VersionedReader, VersionedWriter,
};
use gridlink_protocol::cache::{GetRequest, NameLookupRequest, PutRequest, RequestHeader};
use gridlink_protocol::message::{Message, Response, Value};
use gridlink_protocol::topic::messages::HeartbeatRequest;
use gridlink_protocol::{Channel, ChannelBuilder, Dispatcher, MessageRegistry};

use common::{MapDirectory, MemoryStore, MemoryTopic};

fn to_envelope(message: &dyn Message, protocol_id: ProtocolId, version: ProtocolVersion) -> Envelope {
    let mut writer = VersionedWriter::new(version);
    message.encode(&mut writer).unwrap();
    Envelope::new(protocol_id, version, message.type_id(), writer.into_bytes())
}

fn decode_response(envelope: &Envelope) -> Response {
    let mut response = if envelope.type_id == protocol::PARTIAL_RESPONSE_TYPE_ID {
        Response::new_partial()
    } else {
        Response::default()
    };
    let mut reader = VersionedReader::new(&envelope.payload, envelope.version);
    response.decode(&mut reader).unwrap();
    assert_eq!(reader.remaining(), 0);
    response
}

fn cache_channel() -> Channel {
    ChannelBuilder::new(Arc::new(MemoryStore::new(8))).build()
}

#[tokio::test]
async fn test_put_then_get_roundtrip() {
    let channel = cache_channel();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    let put = PutRequest {
        header: RequestHeader::new("orders"),
        key: vec![1],
        value: vec![42],
        return_old: false,
        expiry_millis: 0,
    };
    let envelope = to_envelope(&put, ProtocolId::Cache, ProtocolVersion::CURRENT);
    let reply = dispatcher.handle(&channel, 1, &envelope).await.unwrap();
    assert_eq!(reply.type_id, protocol::RESPONSE_TYPE_ID);
    let response = decode_response(&reply);
    assert!(!response.failure);
    assert_eq!(response.request_id, 1);

    let get = GetRequest {
        header: RequestHeader::new("orders"),
        key: vec![1],
    };
    let envelope = to_envelope(&get, ProtocolId::Cache, ProtocolVersion::CURRENT);
    let reply = dispatcher.handle(&channel, 2, &envelope).await.unwrap();
    let response = decode_response(&reply);
    assert_eq!(response.result, Value::Bytes(vec![42]));
}

#[tokio::test]
async fn test_old_version_peer_is_understood() {
    // A V1 peer encodes a put without the expiry field; the server decodes
    // it with the default and executes normally.
    let channel = cache_channel();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    let put = PutRequest {
        header: RequestHeader::new("orders"),
        key: vec![7],
        value: vec![9],
        return_old: true,
        expiry_millis: 120_000,
    };
    let envelope = to_envelope(&put, ProtocolId::Cache, ProtocolVersion::V1);
    let reply = dispatcher.handle(&channel, 5, &envelope).await.unwrap();

    // The response came back at the peer's version.
    assert_eq!(reply.version, ProtocolVersion::V1);
    let response = decode_response(&reply);
    assert!(!response.failure);
    // No previous value bound to the key.
    assert_eq!(response.result, Value::Null);
}

#[tokio::test]
async fn test_unknown_type_id_becomes_failure_response() {
    let channel = cache_channel();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    let envelope = Envelope::new(ProtocolId::Cache, ProtocolVersion::CURRENT, 9999, Vec::new());
    let reply = dispatcher.handle(&channel, 77, &envelope).await.unwrap();
    // The client stub gets a well-formed failure response to re-raise.
    assert_eq!(reply.type_id, protocol::RESPONSE_TYPE_ID);
    let response = decode_response(&reply);
    assert!(response.failure);
    assert_eq!(response.request_id, 77);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("unknown type id 9999"));
}

#[tokio::test]
async fn test_non_request_message_becomes_failure_response() {
    let channel = cache_channel();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    // A response is a registered message but not an executable one.
    let inbound = Response::new(9);
    let envelope = to_envelope(&inbound, ProtocolId::Cache, ProtocolVersion::CURRENT);
    let reply = dispatcher.handle(&channel, 9, &envelope).await.unwrap();
    let response = decode_response(&reply);
    assert!(response.failure);
    assert!(response.error.as_deref().unwrap().contains("not executable"));
}

#[tokio::test]
async fn test_undecodable_payload_becomes_failure_response() {
    let channel = cache_channel();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    // Two bytes cannot hold a get request.
    let envelope = Envelope::new(
        ProtocolId::Cache,
        ProtocolVersion::CURRENT,
        gridlink_protocol::cache::type_ids::GET,
        vec![0, 0],
    );
    let reply = dispatcher.handle(&channel, 8, &envelope).await.unwrap();
    let response = decode_response(&reply);
    assert!(response.failure);
    assert_eq!(response.request_id, 8);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("serialization error"));
}

#[tokio::test]
async fn test_execution_failure_becomes_failure_response() {
    // Name lookup without a wired directory fails inside execution, so the
    // dispatcher still produces a well-formed response envelope.
    let channel = cache_channel();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    let lookup = NameLookupRequest {
        name: "orders".to_string(),
    };
    let envelope = to_envelope(&lookup, ProtocolId::Cache, ProtocolVersion::CURRENT);
    let reply = dispatcher.handle(&channel, 3, &envelope).await.unwrap();
    let response = decode_response(&reply);
    assert!(response.failure);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("unsupported operation"));
}

#[tokio::test]
async fn test_name_lookup_resolves_binding() {
    let directory = MapDirectory {
        bindings: HashMap::from([("orders".to_string(), "grid:orders".to_string())]),
    };
    let channel = ChannelBuilder::new(Arc::new(MemoryStore::new(8)))
        .names(Arc::new(directory))
        .build();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    let lookup = NameLookupRequest {
        name: "orders".to_string(),
    };
    let envelope = to_envelope(&lookup, ProtocolId::Cache, ProtocolVersion::CURRENT);
    let reply = dispatcher.handle(&channel, 4, &envelope).await.unwrap();
    let response = decode_response(&reply);
    assert_eq!(response.result, Value::Str("grid:orders".to_string()));
}

#[tokio::test]
async fn test_topic_message_routes_through_topic_protocol() {
    let topic = Arc::new(MemoryTopic::new());
    let channel = ChannelBuilder::new(Arc::new(MemoryStore::new(8)))
        .topic(topic.clone())
        .build();
    let dispatcher = Dispatcher::new(MessageRegistry::new());

    let heartbeat = HeartbeatRequest {
        async_heartbeat: true,
    };
    let envelope = to_envelope(&heartbeat, ProtocolId::Topic, ProtocolVersion::CURRENT);
    let reply = dispatcher.handle(&channel, 6, &envelope).await.unwrap();
    let response = decode_response(&reply);
    assert!(!response.failure);
    assert_eq!(*topic.heartbeats.lock().unwrap(), 1);
}
