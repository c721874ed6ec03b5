//! # Request Builder
//!
//! Composes the outbound half of an attribute request: the topic carrying the request
//! id and the single-field JSON payload listing the wanted attribute keys.
//!
//! ```text
//! keys ["firmware_version", "serial"], id 1, client scope
//!
//! topic:   v1/devices/me/attributes/request/1
//! payload: {"clientKeys":"firmware_version,serial,"}
//! ```
//!
//! Building is pure. Empty keys are skipped, and a build only fails when nothing is
//! left to request, a field name is missing, or the joined list doesn't fit the
//! configured bound.

use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::{requester::RequestError, requester::RequestResult, topic};

/// Client-side attribute request field.
pub const CLIENT_REQUEST_KEYS: &str = "clientKeys";
/// Field of the response nesting client-side attributes.
pub const CLIENT_RESPONSE_KEY: &str = "client";
/// Shared attribute request field.
pub const SHARED_REQUEST_KEYS: &str = "sharedKeys";
/// Field of the response nesting shared attributes.
pub const SHARED_RESPONSE_KEY: &str = "shared";

pub const KEY_DELIMITER: char = ',';

/// Which side of the attribute store a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AttributeScope {
    Client,
    Shared,
}

impl AttributeScope {
    pub fn request_field(&self) -> &'static str {
        match self {
            AttributeScope::Client => CLIENT_REQUEST_KEYS,
            AttributeScope::Shared => SHARED_REQUEST_KEYS,
        }
    }

    pub fn response_field(&self) -> &'static str {
        match self {
            AttributeScope::Client => CLIENT_RESPONSE_KEY,
            AttributeScope::Shared => SHARED_RESPONSE_KEY,
        }
    }
}

/// A fully built request, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub request_id: u64,
    pub topic: String,
    pub payload: Value,
}

#[derive(Clone)]
pub struct AttributeRequestBuilder {
    keys: Vec<String>,
    request_id: Option<u64>,
    request_field: Option<String>,
    response_field: Option<String>,
    trailing_delimiter: bool,
    max_len: Option<usize>,
    verbose: bool,
}

impl Default for AttributeRequestBuilder {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            request_id: None,
            request_field: None,
            response_field: None,
            trailing_delimiter: true,
            max_len: None,
            verbose: false,
        }
    }
}

impl AttributeRequestBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn scope(self, scope: AttributeScope) -> Self {
        self.request_field(scope.request_field())
            .response_field(scope.response_field())
    }

    pub fn request_field(mut self, request_field: &str) -> Self {
        self.request_field = Some(request_field.to_string());
        self
    }

    pub fn response_field(mut self, response_field: &str) -> Self {
        self.response_field = Some(response_field.to_string());
        self
    }

    pub fn trailing_delimiter(mut self, trailing_delimiter: bool) -> Self {
        self.trailing_delimiter = trailing_delimiter;
        self
    }

    pub fn max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the payload alone. Doesn't need a request id, which lets a submission
    /// validate everything before it touches the transport.
    pub fn build_payload(&self) -> RequestResult<Value> {
        let request_field = self.request_field.as_deref().ok_or(
            RequestError::InvalidRequest("request field is required".to_string()),
        )?;
        if self.response_field.is_none() {
            return Err(RequestError::InvalidRequest(
                "response field is required".to_string(),
            ));
        }

        let joined = join_keys(&self.keys, self.trailing_delimiter, self.max_len, self.verbose)?;
        let mut object = Map::with_capacity(1);
        object.insert(request_field.to_string(), Value::String(joined));
        Ok(Value::Object(object))
    }

    pub fn build(self) -> RequestResult<OutboundRequest> {
        let request_id = self.request_id.ok_or(RequestError::InvalidRequest(
            "request_id is required".to_string(),
        ))?;
        let payload = self.build_payload()?;
        Ok(OutboundRequest {
            request_id,
            topic: topic::request_topic(request_id),
            payload,
        })
    }
}

pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
}

pub fn has_valid_key<S: AsRef<str>>(keys: &[S]) -> bool {
    keys.iter().any(|key| is_valid_key(key.as_ref()))
}

/// Joins the valid keys with [`KEY_DELIMITER`], observing `max_len` bytes.
///
/// Empty keys are skipped. With `trailing_delimiter` every key is followed by the
/// delimiter, including the last one.
pub fn join_keys<S: AsRef<str>>(
    keys: &[S],
    trailing_delimiter: bool,
    max_len: Option<usize>,
    verbose: bool,
) -> RequestResult<String> {
    let mut joined = String::new();
    let mut count = 0usize;
    for key in keys {
        let key = key.as_ref();
        if !is_valid_key(key) {
            if verbose {
                debug!("Requested attribute key is empty, skipping");
            }
            continue;
        }
        if count > 0 && !trailing_delimiter {
            joined.push(KEY_DELIMITER);
        }
        joined.push_str(key);
        if trailing_delimiter {
            joined.push(KEY_DELIMITER);
        }
        count += 1;

        if let Some(max) = max_len {
            if joined.len() > max {
                return Err(RequestError::PayloadTooLarge {
                    len: joined.len(),
                    max,
                });
            }
        }
    }

    if count == 0 {
        return Err(RequestError::InvalidRequest(
            "no keys to request".to_string(),
        ));
    }
    Ok(joined)
}
