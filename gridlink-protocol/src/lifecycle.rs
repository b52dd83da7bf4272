//! Request execution: status tracking, ordering gates, and envelope
//! dispatch.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::warn;

use gridlink_core::{Envelope, GridError, Result, VersionedReader, VersionedWriter};

use crate::channel::Channel;
use crate::message::{Message, Request, Response};
use crate::registry::MessageRegistry;

const STATE_PENDING: u8 = 0;
const STATE_COMPLETED: u8 = 1;
const STATE_CANCELLED: u8 = 2;

/// The observable lifecycle state of one in-flight request.
///
/// Transitions are one-way: a settled request never becomes pending again,
/// and cancellation loses the race against completion.
pub struct Status {
    state: AtomicU8,
}

impl Status {
    /// Creates a pending status.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_PENDING),
        }
    }

    /// Requests cancellation; returns true if the request was still pending.
    /// Cancelling a completed request has no effect.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_PENDING,
                STATE_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks the request completed; returns true unless it was already
    /// cancelled or completed.
    pub fn complete(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_PENDING,
                STATE_COMPLETED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Returns true if the request was cancelled before it completed.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CANCELLED
    }

    /// Returns true if the request ran to completion.
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_COMPLETED
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one request against a channel and produces its response.
///
/// Requests with an ordering key take that key's gate first, so two
/// requests sharing a key never overlap on the same channel; everything
/// else runs concurrently. An execution error never propagates as a
/// transport failure: it is folded into a failure response, discarding any
/// partial results the request had accumulated.
pub async fn execute(channel: &Channel, request_id: i64, request: &dyn Request) -> Response {
    let status = channel.register_status(request_id);
    let mut response = Response::new(request_id);

    let result = match request.ordering_key() {
        Some(key) => {
            let gate = channel.ordering_gate(&key);
            let result = {
                let _guard = gate.lock().await;
                if status.is_cancelled() {
                    Err(GridError::Operation("request cancelled".to_string()))
                } else {
                    request.on_run(channel, &mut response).await
                }
            };
            drop(gate);
            channel.drop_idle_gate(&key);
            result
        }
        None => {
            if status.is_cancelled() {
                Err(GridError::Operation("request cancelled".to_string()))
            } else {
                request.on_run(channel, &mut response).await
            }
        }
    };

    if let Err(e) = result {
        warn!(request_id, type_id = request.type_id(), error = %e, "request failed");
        response.fail(&e);
    }
    status.complete();
    channel.remove_status(request_id);
    response
}

/// Decodes inbound envelopes, executes them, and encodes the responses.
pub struct Dispatcher {
    registry: MessageRegistry,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registry.
    pub fn new(registry: MessageRegistry) -> Self {
        Self { registry }
    }

    /// Handles one inbound request envelope end to end.
    ///
    /// Protocol errors, an unknown type id, a payload that does not decode,
    /// a message the negotiated version predates, or one that is not
    /// executable, come back as a failure response envelope just like
    /// execution errors. Only encoding the response itself can fail the
    /// transport.
    pub async fn handle(
        &self,
        channel: &Channel,
        request_id: i64,
        envelope: &Envelope,
    ) -> Result<Envelope> {
        let response = match self.decode_request(envelope) {
            Ok(mut message) => match message.as_request_mut() {
                Some(request) => execute(channel, request_id, request).await,
                None => {
                    let e = GridError::Protocol(format!(
                        "message type {} is not executable",
                        envelope.type_id
                    ));
                    rejected(request_id, envelope.type_id, &e)
                }
            },
            Err(e) => rejected(request_id, envelope.type_id, &e),
        };

        let mut writer = VersionedWriter::new(envelope.version);
        response.encode(&mut writer)?;
        Ok(Envelope::new(
            envelope.protocol,
            envelope.version,
            response.type_id(),
            writer.into_bytes(),
        ))
    }

    fn decode_request(&self, envelope: &Envelope) -> Result<Box<dyn Message>> {
        let mut message = self
            .registry
            .create_message(envelope.protocol, envelope.type_id)?;
        if !envelope.version.supports(message.min_version()) {
            return Err(GridError::Protocol(format!(
                "message type {} requires at least {}, negotiated {}",
                envelope.type_id,
                message.min_version(),
                envelope.version
            )));
        }
        let mut reader = VersionedReader::new(&envelope.payload, envelope.version);
        message.decode(&mut reader)?;
        Ok(message)
    }
}

/// Builds the failure response for an envelope rejected before execution.
fn rejected(request_id: i64, type_id: i32, error: &GridError) -> Response {
    warn!(request_id, type_id, error = %error, "rejected inbound envelope");
    let mut response = Response::new(request_id);
    response.fail(error);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let status = Status::new();
        assert!(!status.is_cancelled());
        assert!(!status.is_completed());

        assert!(status.complete());
        assert!(status.is_completed());
        // Cancellation after completion is a no-op.
        assert!(!status.cancel());
        assert!(!status.is_cancelled());
    }

    #[test]
    fn test_cancel_wins_only_while_pending() {
        let status = Status::new();
        assert!(status.cancel());
        assert!(status.is_cancelled());
        assert!(!status.complete());
        assert!(!status.is_completed());
    }
}
