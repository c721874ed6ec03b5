#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use attribute_request::{
    AttributeRequestCallback, AttributeRequester, InMemoryTransport, ManualClock, RequestConfig,
    RequestCounter,
};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub struct Harness {
    pub transport: Rc<InMemoryTransport>,
    pub clock: Rc<ManualClock>,
    pub counter: RequestCounter,
    pub requester: AttributeRequester,
}

pub fn setup(config: RequestConfig) -> Harness {
    setup_with_counter(config, RequestCounter::new())
}

pub fn setup_with_counter(config: RequestConfig, counter: RequestCounter) -> Harness {
    let transport = Rc::new(InMemoryTransport::new());
    let clock = Rc::new(ManualClock::new());
    let requester = AttributeRequester::new(config, transport.clone(), Rc::new(counter.clone()))
        .with_clock(clock.clone());
    Harness {
        transport,
        clock,
        counter,
        requester,
    }
}

/// Responses received by a callback, in order.
pub type Received = Rc<RefCell<Vec<Value>>>;

pub fn recording_callback<I, S>(keys: I) -> (AttributeRequestCallback, Received)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let received: Received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let callback =
        AttributeRequestCallback::new(keys, move |value| sink.borrow_mut().push(value.clone()));
    (callback, received)
}
