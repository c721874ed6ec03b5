//! Surface shared by every protocol handler of the device client.
//!
//! The message loop of the client doesn't know what a handler does; it only asks
//! whether a topic belongs to it, in which form it wants the payload, and forwards
//! the periodic poll and the connection lifecycle calls.

use serde_json::Value;

/// Form in which a handler wants inbound payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ProcessType {
    /// Raw bytes, handed to [`ApiImplementation::process_response`].
    Raw,
    /// Decoded JSON, handed to [`ApiImplementation::process_json_response`].
    Json,
}

pub trait ApiImplementation {
    fn process_type(&self) -> ProcessType;

    fn process_response(&mut self, topic: &str, payload: &[u8]);

    fn process_json_response(&mut self, topic: &str, data: &Value);

    /// Routing predicate: does an inbound message on `topic` belong to this handler.
    fn compare_response_topic(&self, topic: &str) -> bool;

    /// Drops all handler state tied to the connection and unsubscribes its topics.
    fn unsubscribe(&mut self) -> bool;

    /// Called after a reconnect.
    fn resubscribe_topic(&mut self) -> bool;

    /// Called from the client loop on every iteration.
    fn poll(&mut self);

    fn initialize(&mut self);
}
