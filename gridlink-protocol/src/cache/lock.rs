//! Distributed lock requests.
//!
//! Locking is two-phase: a request first takes the channel-local admission
//! gate for the key, then attempts the distributed lock with whatever wait
//! budget is left. The gate keeps a channel's own lock requests for one key
//! from racing each other; the distributed lock arbitrates between
//! channels and members.

use std::time::Duration;

use async_trait::async_trait;
use gridlink_core::{ProtocolVersion, Result, VersionedReader, VersionedWriter};
use tokio::time::{timeout, Instant};

use crate::channel::Channel;
use crate::message::{Message, OrderingKey, Request, Response, Value};

use super::messages::RequestHeader;
use super::type_ids;

/// Acquires the distributed lock on one key.
#[derive(Debug, Clone, Default)]
pub struct LockRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to lock.
    pub key: Vec<u8>,
    /// Wait budget in milliseconds: zero tries once, negative waits
    /// without bound.
    pub wait_millis: i64,
    /// Lock lease in milliseconds, zero for no expiry. On the wire since
    /// V2; older peers always lock without a lease.
    pub lease_millis: i64,
}

impl Message for LockRequest {
    fn type_id(&self) -> i32 {
        type_ids::LOCK
    }

    fn encode(&self, writer: &mut VersionedWriter) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_blob(&self.key)?;
        writer.write_long(self.wait_millis)?;
        writer.write_long_since(ProtocolVersion::V2, self.lease_millis)
    }

    fn decode(&mut self, reader: &mut VersionedReader<'_>) -> Result<()> {
        self.header = RequestHeader::read_from(reader)?;
        self.key = reader.read_blob()?;
        self.wait_millis = reader.read_long()?;
        self.lease_millis = reader.read_long_since(ProtocolVersion::V2, 0)?;
        Ok(())
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

#[async_trait]
impl Request for LockRequest {
    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(OrderingKey::Key(self.key.clone()))
    }

    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        let gate = channel.lock_gate(&self.header.name, &self.key);
        let started = Instant::now();

        // Phase one: the local gate, bounded by the wait budget.
        let guard = if self.wait_millis < 0 {
            Some(gate.lock_owned().await)
        } else if self.wait_millis == 0 {
            gate.try_lock_owned().ok()
        } else {
            timeout(
                Duration::from_millis(self.wait_millis as u64),
                gate.lock_owned(),
            )
            .await
            .ok()
        };

        let acquired = match guard {
            None => false,
            Some(guard) => {
                let acquired = if channel.is_locked(&self.header.name, &self.key) {
                    // This channel already holds the lock.
                    true
                } else {
                    // Phase two: the distributed lock, with whatever budget
                    // remains.
                    let remaining = if self.wait_millis < 0 {
                        -1
                    } else {
                        (self.wait_millis - started.elapsed().as_millis() as i64).max(0)
                    };
                    let acquired = channel
                        .store()
                        .lock(&self.header.name, &self.key, remaining, self.lease_millis)
                        .await?;
                    if acquired {
                        channel.mark_locked(&self.header.name, &self.key);
                    }
                    acquired
                };
                drop(guard);
                acquired
            }
        };
        channel.drop_idle_lock_gate(&self.header.name, &self.key);
        response.result = Value::Bool(acquired);
        Ok(())
    }
}

/// Releases the distributed lock on one key.
#[derive(Debug, Clone, Default)]
pub struct UnlockRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// The serialized key to unlock.
    pub key: Vec<u8>,
}

impl Message for UnlockRequest {
    fn type_id(&self) -> i32 {
        type_ids::UNLOCK
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
impl Request for UnlockRequest {
    fn ordering_key(&self) -> Option<OrderingKey> {
        Some(OrderingKey::Key(self.key.clone()))
    }

    async fn on_run(&self, channel: &Channel, response: &mut Response) -> Result<()> {
        // Unlock always waits its turn at the gate; an unlock racing a
        // bounded lock attempt must not slip in between its two phases.
        let gate = channel.lock_gate(&self.header.name, &self.key);
        let released = {
            let _guard = gate.lock_owned().await;
            let released = channel.store().unlock(&self.header.name, &self.key).await?;
            channel.clear_locked(&self.header.name, &self.key);
            released
        };
        channel.drop_idle_lock_gate(&self.header.name, &self.key);
        response.result = Value::Bool(released);
        Ok(())
    }
}
