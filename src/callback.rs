use std::{fmt, time::Duration};

use serde_json::Value;

pub type ResponseHandler = Box<dyn FnMut(&Value)>;
pub type TimeoutHandler = Box<dyn FnMut()>;

/// What a caller hands to a submission: the keys to ask for, the handler receiving the
/// narrowed attribute document, and optionally a timeout with its expiry handler.
///
/// The requester takes ownership on admission, so the caller doesn't have to keep
/// anything alive while the request is pending.
pub struct AttributeRequestCallback {
    keys: Vec<String>,
    on_response: ResponseHandler,
    timeout: Option<Duration>,
    on_timeout: Option<TimeoutHandler>,
}

impl AttributeRequestCallback {
    pub fn new<I, S, F>(keys: I, on_response: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&Value) + 'static,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            on_response: Box::new(on_response),
            timeout: None,
            on_timeout: None,
        }
    }

    /// Overrides the configured default timeout for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_timeout<F>(mut self, on_timeout: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.on_timeout = Some(Box::new(on_timeout));
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn call_response(&mut self, value: &Value) {
        (self.on_response)(value)
    }

    /// Returns whether an expiry handler was configured.
    pub(crate) fn call_timeout(&mut self) -> bool {
        match self.on_timeout.as_mut() {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for AttributeRequestCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeRequestCallback")
            .field("keys", &self.keys)
            .field("timeout", &self.timeout)
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}
