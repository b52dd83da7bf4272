//! The gridlink message/protocol layer.
//!
//! This crate lets a thin remote client execute operations (map access,
//! queries, entry-processor invocation, locking, pub/sub topic operations,
//! name lookups) against a partitioned, clustered data store without being a
//! cluster member itself. Each operation is a typed, versioned wire message;
//! this layer decodes it, executes it against a backing collaborator, and
//! encodes a response.
//!
//! The two load-bearing pieces are the [`registry::MessageRegistry`] (typed,
//! version-tolerant message dispatch) and the [`partition::scan`] engine
//! (bounded-size, cursor-resumable streaming over independently-owned
//! partitions). The actual key/value store, topic persistence, transport,
//! and filter/processor evaluation are external collaborators specified by
//! the traits in [`store`] and [`topic::connector`].

#![warn(missing_docs)]

pub mod cache;
pub mod channel;
pub mod lifecycle;
pub mod message;
pub mod partition;
pub mod registry;
pub mod store;
pub mod topic;

pub use channel::{Channel, ChannelBuilder};
pub use lifecycle::{execute, Dispatcher, Status};
pub use message::{Message, OrderingKey, Request, Response, Value};
pub use partition::{PartitionSet, ScanConfig, ScanCursor};
pub use registry::MessageRegistry;
