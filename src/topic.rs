//! Topic layout of the device attribute request exchange.
//!
//! ```text
//! device ── v1/devices/me/attributes/request/{id}  ──▶ server
//! device ◀── v1/devices/me/attributes/response/{id} ── server
//! ```
//!
//! The device subscribes to [`ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC`] while at least one
//! request is outstanding and recovers the request id from the topic suffix.

/// Prefix of the outbound topic, completed by the decimal request id.
pub const ATTRIBUTE_REQUEST_TOPIC: &str = "v1/devices/me/attributes/request/";
/// Wildcard filter matching every response regardless of id.
pub const ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC: &str = "v1/devices/me/attributes/response/+";
/// Prefix of inbound response topics.
pub const ATTRIBUTE_RESPONSE_TOPIC: &str = "v1/devices/me/attributes/response/";

pub fn request_topic(request_id: u64) -> String {
    format!("{ATTRIBUTE_REQUEST_TOPIC}{request_id}")
}

pub fn response_topic(request_id: u64) -> String {
    format!("{ATTRIBUTE_RESPONSE_TOPIC}{request_id}")
}

pub fn is_response_topic(topic: &str) -> bool {
    topic.starts_with(ATTRIBUTE_RESPONSE_TOPIC)
}

/// Parses the decimal id following `prefix`.
///
/// Returns `None` when the topic doesn't start with `prefix` or the suffix isn't a
/// plain unsigned integer (no sign, no extra levels).
pub fn parse_request_id(prefix: &str, topic: &str) -> Option<u64> {
    let suffix = topic.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}
