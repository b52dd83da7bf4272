//! The message type registry: the single place mapping (protocol, type id)
//! to a message constructor.

use std::collections::HashMap;

use gridlink_core::{protocol, GridError, ProtocolId, Result};

use crate::message::{Message, Response};

/// Constructs an empty instance of one message type, ready to decode into.
pub type MessageCtor = fn() -> Box<dyn Message>;

/// An immutable lookup table from (protocol, type id) to message factory.
///
/// Populated once at startup and never mutated afterwards, so lookups need
/// no synchronization. An id with no entry is a protocol error surfaced as
/// [`GridError::UnknownTypeId`].
pub struct MessageRegistry {
    factories: HashMap<(ProtocolId, i32), MessageCtor>,
}

impl MessageRegistry {
    /// Builds the registry with every message type this implementation
    /// speaks.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        for protocol_id in [ProtocolId::Cache, ProtocolId::Topic] {
            registry.register(protocol_id, protocol::RESPONSE_TYPE_ID, || {
                Box::new(Response::default())
            });
            registry.register(protocol_id, protocol::PARTIAL_RESPONSE_TYPE_ID, || {
                Box::new(Response::new_partial())
            });
        }
        crate::cache::register(&mut registry);
        crate::topic::messages::register(&mut registry);
        registry
    }

    /// Registers a constructor for one message type. Later registrations
    /// for the same id win; ids are assigned statically so this only
    /// matters in tests.
    pub fn register(&mut self, protocol: ProtocolId, type_id: i32, ctor: MessageCtor) {
        self.factories.insert((protocol, type_id), ctor);
    }

    /// Instantiates an empty message for the given type id.
    pub fn create_message(&self, protocol: ProtocolId, type_id: i32) -> Result<Box<dyn Message>> {
        match self.factories.get(&(protocol, type_id)) {
            Some(ctor) => Ok(ctor()),
            None => Err(GridError::UnknownTypeId {
                protocol: protocol as u8,
                type_id,
            }),
        }
    }

    /// The number of registered message types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no message types are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_id() {
        let registry = MessageRegistry::new();
        let err = registry.create_message(ProtocolId::Cache, 9999).unwrap_err();
        assert!(matches!(
            err,
            GridError::UnknownTypeId {
                protocol: 1,
                type_id: 9999
            }
        ));
    }

    #[test]
    fn test_responses_registered_for_both_protocols() {
        let registry = MessageRegistry::new();
        for protocol_id in [ProtocolId::Cache, ProtocolId::Topic] {
            let plain = registry
                .create_message(protocol_id, protocol::RESPONSE_TYPE_ID)
                .unwrap();
            assert_eq!(plain.type_id(), protocol::RESPONSE_TYPE_ID);
            let partial = registry
                .create_message(protocol_id, protocol::PARTIAL_RESPONSE_TYPE_ID)
                .unwrap();
            assert_eq!(partial.type_id(), protocol::PARTIAL_RESPONSE_TYPE_ID);
        }
    }

    #[test]
    fn test_cache_and_topic_ids_do_not_collide() {
        // Type ids are scoped per protocol; the same numeric id maps to
        // different messages under each.
        let registry = MessageRegistry::new();
        assert!(registry.create_message(ProtocolId::Cache, 1).is_ok());
        assert!(registry.create_message(ProtocolId::Topic, 1).is_ok());
        assert!(!registry.is_empty());
    }
}
