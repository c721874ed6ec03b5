mod common;

use std::{cell::Cell, rc::Rc, time::Duration};

use attribute_request::{
    AttributeRequestCallback, AttributeScope, DispatchOutcome, RequestConfig, RequestCounter,
    RequestError, RequestIdSource,
    subscription::SubscriptionState,
    topic::{ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC, response_topic},
    transport::TransportCall,
};
use common::{recording_callback, setup, setup_with_counter};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_client_request_round_trip() {
    let mut h = setup(RequestConfig::default());
    let (callback, received) = recording_callback(["firmware_version", "serial"]);

    assert!(h.requester.client_attributes_request(callback));
    assert_eq!(
        h.transport.calls(),
        vec![
            TransportCall::Subscribe(ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC.to_string()),
            TransportCall::Send {
                topic: "v1/devices/me/attributes/request/1".to_string(),
                payload: json!({"clientKeys": "firmware_version,serial,"}),
            },
        ]
    );
    assert!(h.requester.is_pending(1));

    let outcome = h.requester.on_response(
        "v1/devices/me/attributes/response/1",
        &json!({"client": {"firmware_version": "1.0"}}),
    );
    assert_eq!(outcome, DispatchOutcome::Fulfilled(1));
    assert_eq!(*received.borrow(), vec![json!({"firmware_version": "1.0"})]);
    assert_eq!(h.requester.pending_count(), 0);
    assert_eq!(h.transport.unsubscribe_count(), 1);
    assert!(!h.transport.is_subscribed(ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC));
}

#[test]
fn test_flat_response_passed_as_is() {
    let mut h = setup(RequestConfig::default());
    let (callback, received) = recording_callback(["interval"]);
    let id = h.requester.request(AttributeScope::Shared, callback).unwrap();

    h.requester
        .on_response(&response_topic(id), &json!({"interval": 30}));
    assert_eq!(*received.borrow(), vec![json!({"interval": 30})]);
}

#[test]
fn test_empty_key_list_rejected() {
    let mut h = setup(RequestConfig::default());
    let empty: [&str; 0] = [];
    let (callback, received) = recording_callback(empty);

    assert!(!h.requester.shared_attributes_request(callback));
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.requester.pending_count(), 0);
    assert!(received.borrow().is_empty());
    assert_eq!(h.counter.current(), 0);
}

#[test]
fn test_all_empty_keys_rejected() {
    let mut h = setup(RequestConfig::default());
    let (callback, _) = recording_callback(["", ""]);

    let result = h.requester.request(AttributeScope::Client, callback);
    assert!(matches!(result, Err(RequestError::InvalidRequest(_))));
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.requester.pending_count(), 0);
}

#[test]
fn test_response_for_one_of_two_pending() {
    let mut h = setup_with_counter(RequestConfig::default(), RequestCounter::starting_after(4));
    let (first, first_received) = recording_callback(["a"]);
    let (second, second_received) = recording_callback(["b"]);

    assert_eq!(h.requester.request(AttributeScope::Client, first), Ok(5));
    assert_eq!(h.requester.request(AttributeScope::Client, second), Ok(6));

    let outcome = h
        .requester
        .on_response(&response_topic(6), &json!({"client": {"b": true}}));
    assert_eq!(outcome, DispatchOutcome::Fulfilled(6));
    assert_eq!(h.requester.pending_ids(), vec![5]);
    assert!(first_received.borrow().is_empty());
    assert_eq!(second_received.borrow().len(), 1);
    assert_eq!(h.transport.unsubscribe_count(), 0);
    assert_eq!(h.requester.subscription_state(), SubscriptionState::Subscribed);

    // id 5 keeps counting down
    h.clock.advance(Duration::from_secs(5));
    assert_eq!(h.requester.tick(), vec![5]);
    assert_eq!(h.transport.unsubscribe_count(), 1);
}

#[test]
fn test_timeout_expires_request() {
    let config = RequestConfig {
        request_timeout: None,
        ..Default::default()
    };
    let mut h = setup_with_counter(config, RequestCounter::starting_after(6));
    let expired = Rc::new(Cell::new(0));
    let counter = expired.clone();
    let (callback, received) = recording_callback(["fw_state"]);
    let callback = callback
        .with_timeout(Duration::from_millis(5000))
        .on_timeout(move || counter.set(counter.get() + 1));

    assert_eq!(h.requester.request(AttributeScope::Shared, callback), Ok(7));

    h.clock.advance(Duration::from_millis(4999));
    assert!(h.requester.tick().is_empty());
    assert!(h.requester.is_pending(7));

    h.clock.advance(Duration::from_millis(1));
    assert_eq!(h.requester.tick(), vec![7]);
    assert_eq!(expired.get(), 1);
    assert!(received.borrow().is_empty());
    assert_eq!(h.requester.pending_count(), 0);
    assert_eq!(h.transport.unsubscribe_count(), 1);

    // late response for the expired id
    let outcome = h
        .requester
        .on_response(&response_topic(7), &json!({"shared": {"fw_state": "DONE"}}));
    assert_eq!(outcome, DispatchOutcome::Unmatched);
    assert!(received.borrow().is_empty());
    assert_eq!(h.transport.unsubscribe_count(), 1);

    // nothing left to expire
    h.clock.advance(Duration::from_secs(60));
    assert!(h.requester.tick().is_empty());
    assert_eq!(expired.get(), 1);
}

#[test]
fn test_expiry_of_several_unsubscribes_once() {
    let config = RequestConfig {
        request_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let mut h = setup(config);
    for key in ["a", "b", "c"] {
        assert!(
            h.requester
                .client_attributes_request(AttributeRequestCallback::new([key], |_| {}))
        );
    }

    h.clock.advance(Duration::from_millis(100));
    assert_eq!(h.requester.tick(), vec![1, 2, 3]);
    assert_eq!(h.transport.unsubscribe_count(), 1);
    assert_eq!(h.requester.subscription_state(), SubscriptionState::Unsubscribed);
}

#[test]
fn test_unmatched_responses_change_nothing() {
    let mut h = setup(RequestConfig::default());
    let (callback, received) = recording_callback(["a"]);
    assert!(h.requester.client_attributes_request(callback));
    h.transport.clear_calls();

    let topics = [
        "v1/devices/me/attributes/response/2",
        "v1/devices/me/attributes/response/x",
        "v1/devices/me/attributes/response/",
        "v1/devices/me/rpc/response/1",
    ];
    for topic in topics {
        assert_eq!(
            h.requester.on_response(topic, &json!({"client": {"a": 1}})),
            DispatchOutcome::Unmatched
        );
    }
    assert!(received.borrow().is_empty());
    assert_eq!(h.requester.pending_ids(), vec![1]);
    assert!(h.transport.calls().is_empty());
}

#[test]
fn test_duplicate_response_runs_callback_once() {
    let mut h = setup(RequestConfig::default());
    let (callback, received) = recording_callback(["a"]);
    assert!(h.requester.client_attributes_request(callback));

    let response = json!({"client": {"a": 1}});
    assert_eq!(
        h.requester.on_response(&response_topic(1), &response),
        DispatchOutcome::Fulfilled(1)
    );
    assert_eq!(
        h.requester.on_response(&response_topic(1), &response),
        DispatchOutcome::Unmatched
    );
    assert_eq!(received.borrow().len(), 1);
    assert_eq!(h.transport.unsubscribe_count(), 1);
}

#[test]
fn test_subscribe_failure_aborts_submission() {
    let mut h = setup(RequestConfig::default());
    h.transport.set_fail_subscribe(true);
    let (callback, _) = recording_callback(["a"]);

    let result = h.requester.request(AttributeScope::Client, callback);
    assert!(matches!(result, Err(RequestError::SubscribeFailed(_))));
    assert_eq!(h.requester.pending_count(), 0);
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.counter.current(), 0);
}

#[test]
fn test_send_failure_leaves_entry_for_timeout() {
    let config = RequestConfig {
        request_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let mut h = setup(config);
    h.transport.set_fail_send(true);
    let (callback, _) = recording_callback(["a"]);

    assert_eq!(
        h.requester.request(AttributeScope::Client, callback),
        Err(RequestError::SendFailed(1))
    );
    assert!(h.requester.is_pending(1));
    assert_eq!(h.requester.subscription_state(), SubscriptionState::Subscribed);

    h.clock.advance(Duration::from_millis(50));
    assert_eq!(h.requester.tick(), vec![1]);
    assert_eq!(h.transport.unsubscribe_count(), 1);
}

#[test]
fn test_cancel_all_drops_without_callbacks() {
    let mut h = setup(RequestConfig::default());
    let expired = Rc::new(Cell::new(false));
    let flag = expired.clone();
    let (first, first_received) = recording_callback(["a"]);
    let (second, _) = recording_callback(["b"]);
    assert!(h.requester.client_attributes_request(first.on_timeout(move || flag.set(true))));
    assert!(h.requester.shared_attributes_request(second));

    assert!(h.requester.unsubscribe_all());
    assert_eq!(h.requester.pending_count(), 0);
    assert_eq!(h.requester.subscription_state(), SubscriptionState::Unsubscribed);
    assert!(!h.transport.is_subscribed(ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC));

    h.clock.advance(Duration::from_secs(60));
    assert!(h.requester.tick().is_empty());
    h.requester
        .on_response(&response_topic(1), &json!({"client": {"a": 1}}));
    assert!(first_received.borrow().is_empty());
    assert!(!expired.get());
}

#[test]
fn test_cancel_all_forces_unsubscribe_when_idle() {
    let mut h = setup(RequestConfig::default());
    assert!(h.requester.unsubscribe_all());
    assert!(h.requester.resubscribe());
    assert_eq!(h.transport.unsubscribe_count(), 2);
}

#[test]
fn test_resubmission_after_reconnect_gets_new_id() {
    let mut h = setup(RequestConfig::default());
    let (callback, _) = recording_callback(["a"]);
    assert_eq!(h.requester.request(AttributeScope::Client, callback), Ok(1));
    assert!(h.requester.resubscribe());

    let (callback, received) = recording_callback(["a"]);
    assert_eq!(h.requester.request(AttributeScope::Client, callback), Ok(2));
    h.requester
        .on_response(&response_topic(2), &json!({"client": {"a": "x"}}));
    assert_eq!(*received.borrow(), vec![json!({"a": "x"})]);
}

#[test]
fn test_ids_shared_with_other_components() {
    let counter = RequestCounter::new();
    let mut h = setup_with_counter(RequestConfig::default(), counter.clone());

    assert_eq!(h.requester.request(AttributeScope::Client, recording_callback(["a"]).0), Ok(1));
    // e.g. an RPC request issued in between
    assert_eq!(counter.next_request_id(), Some(2));
    assert_eq!(h.requester.request(AttributeScope::Client, recording_callback(["a"]).0), Ok(3));
}

#[test]
fn test_without_trailing_delimiter() {
    let config = RequestConfig {
        trailing_delimiter: false,
        ..Default::default()
    };
    let mut h = setup(config);
    let (callback, _) = recording_callback(["a", "", "b"]);
    assert!(h.requester.shared_attributes_request(callback));
    assert_eq!(
        h.transport.sent(),
        vec![(
            "v1/devices/me/attributes/request/1".to_string(),
            json!({"sharedKeys": "a,b"})
        )]
    );
}

#[test]
fn test_max_timeout_never_expires() {
    let mut h = setup(RequestConfig::default());
    let (callback, received) = recording_callback(["a"]);
    let callback = callback.with_timeout(Duration::MAX);

    assert_eq!(h.requester.request(AttributeScope::Client, callback), Ok(1));
    h.clock.advance(Duration::from_secs(24 * 3600));
    assert!(h.requester.tick().is_empty());
    assert!(h.requester.is_pending(1));

    h.requester
        .on_response(&response_topic(1), &json!({"client": {"a": 1}}));
    assert_eq!(*received.borrow(), vec![json!({"a": 1})]);
    assert_eq!(h.transport.unsubscribe_count(), 1);
}

#[test]
fn test_too_many_keys_rejected_before_transport() {
    let config = RequestConfig {
        max_attributes: Some(2),
        ..Default::default()
    };
    let mut h = setup(config);

    let (callback, _) = recording_callback(["a", "b", "c"]);
    assert_eq!(
        h.requester.request(AttributeScope::Client, callback),
        Err(RequestError::TooManyKeys { count: 3, max: 2 })
    );
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.counter.current(), 0);

    let (callback, _) = recording_callback(["a", "b"]);
    assert_eq!(h.requester.request(AttributeScope::Client, callback), Ok(1));
}
