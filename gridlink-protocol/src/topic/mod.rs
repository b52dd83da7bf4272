//! The topic channel sub-protocol: pub/sub messages and their connector
//! boundary. Structurally parallel to the cache protocol: it reuses the
//! message registry, versioned envelope, and request lifecycle, but not the
//! partition scan engine.

pub mod connector;
pub mod messages;

pub use connector::{
    CommitOutcome, CommitStatus, ReceiveOutcome, ReceiveStatus, SeekOutcome, SimpleReceiveResult,
    TopicConnector, TopicElement, TopicPosition,
};
