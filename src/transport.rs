//! Collaborators the requester consumes: the publish/subscribe client and the shared
//! request id counter.
//!
//! Both are shared with other components of the device client (telemetry, RPC), so
//! the requester only holds `Rc` handles to them and every method takes `&self`.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;
use tracing::trace;

/// Fire-and-forget publish/subscribe client. Every call reports success immediately
/// and never blocks.
pub trait Transport {
    fn send(&self, topic: &str, payload: &Value) -> bool;
    fn subscribe(&self, topic_filter: &str) -> bool;
    fn unsubscribe(&self, topic_filter: &str) -> bool;
}

/// Process-wide source of request ids. `None` means the counter isn't reachable.
pub trait RequestIdSource {
    fn next_request_id(&self) -> Option<u64>;
}

/// Monotonic counter, cheap to clone. Clones share the same sequence, which is how
/// several request-issuing components draw from one counter.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter {
    current: Arc<AtomicU64>,
}

impl RequestCounter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Next id handed out will be `last + 1`.
    pub fn starting_after(last: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(last)),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl RequestIdSource for RequestCounter {
    fn next_request_id(&self) -> Option<u64> {
        Some(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Send { topic: String, payload: Value },
    Subscribe(String),
    Unsubscribe(String),
}

/// Transport that records every call instead of talking to a broker.
///
/// Each operation can be switched to fail, which is how the failure paths of the
/// requester are exercised.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    calls: RefCell<Vec<TransportCall>>,
    subscriptions: RefCell<BTreeSet<String>>,
    fail_send: Cell<bool>,
    fail_subscribe: Cell<bool>,
    fail_unsubscribe: Cell<bool>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.set(fail);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.set(fail);
    }

    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.set(fail);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.borrow().clone()
    }

    /// Successful and failed publications alike, in call order.
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send { topic, payload } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Subscribe(_)))
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Unsubscribe(_)))
    }

    pub fn is_subscribed(&self, topic_filter: &str) -> bool {
        self.subscriptions.borrow().contains(topic_filter)
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|&call| predicate(call)).count()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, topic: &str, payload: &Value) -> bool {
        trace!(topic, %payload, "send");
        self.calls.borrow_mut().push(TransportCall::Send {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        !self.fail_send.get()
    }

    fn subscribe(&self, topic_filter: &str) -> bool {
        trace!(topic_filter, "subscribe");
        self.calls
            .borrow_mut()
            .push(TransportCall::Subscribe(topic_filter.to_string()));
        if self.fail_subscribe.get() {
            return false;
        }
        self.subscriptions
            .borrow_mut()
            .insert(topic_filter.to_string());
        true
    }

    fn unsubscribe(&self, topic_filter: &str) -> bool {
        trace!(topic_filter, "unsubscribe");
        self.calls
            .borrow_mut()
            .push(TransportCall::Unsubscribe(topic_filter.to_string()));
        if self.fail_unsubscribe.get() {
            return false;
        }
        self.subscriptions.borrow_mut().remove(topic_filter);
        true
    }
}
