//! Protocol-wide constants.
//!
//! Message type id ranges are a naming convention only; no runtime behavior
//! depends on them beyond uniqueness within a protocol:
//!
//! - 1-10   basic map operations
//! - 11-20  observable/listener operations
//! - 21-30  bulk-read operations
//! - 31-40  concurrent/lock operations
//! - 41-50  query/index operations
//! - 51-60  invocation operations
//! - 61+    service-management operations
//! - 1000+  partial/streaming responses
//! - 0      generic response (reserved per protocol)

/// Reserved type id of the generic response message in every protocol.
pub const RESPONSE_TYPE_ID: i32 = 0;

/// Reserved type id of the partial (streaming) response message.
pub const PARTIAL_RESPONSE_TYPE_ID: i32 = 1000;

/// Size of the envelope length field on the wire.
pub const SIZE_OF_LENGTH_FIELD: usize = 4;

/// Size of the envelope header after the length field:
/// protocol (u8) + version (i32) + type id (i32).
pub const ENVELOPE_HEADER_SIZE: usize = 9;

/// Default target for the serialized size of one streaming response.
///
/// A target, not a guarantee: the probe-then-extrapolate batch sizing may
/// overshoot on heterogeneous entry sizes.
pub const DEFAULT_RESPONSE_BYTE_BUDGET: usize = 1 << 20;
