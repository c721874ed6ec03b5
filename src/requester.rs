//! # Attribute Requester
//!
//! The AttributeRequester turns the fire-and-forget publish/subscribe transport into a
//! request-response exchange for attribute values. It sends a request carrying a
//! numeric id in its topic and matches the response arriving later on the topic with
//! the same id.
//!
//! ## Key Features
//!
//! - **Request-Response Correlation**: Tracks pending requests by id and hands each
//!   response to the callback that asked for it
//! - **Timeout Handling**: Retires requests whose countdown runs out on [`AttributeRequester::tick`]
//! - **Subscription Lifecycle**: Subscribed to the response filter only while
//!   something is pending
//! - **Bounded Memory**: Optional fixed capacity for constrained devices
//!
//! ## Request Lifecycle
//!
//! ```text
//!  submit ──▶ validate ──▶ capacity ──▶ subscribe ──▶ admit(id) ──▶ send
//!                                                        │
//!                 ┌──────────────────────────────────────┤
//!                 ▼                                      ▼
//!          response(id) ──▶ callback            tick: deadline ──▶ expiry handler
//!                 │                                      │
//!                 └────────▶ removed ◀───────────────────┘
//!                               │
//!                     registry empty ──▶ unsubscribe
//! ```
//!
//! ## Implementation Details
//!
//! Everything runs on the caller's loop. Submission, dispatch and tick take
//! `&mut self`, so they can't interleave and no locking is needed. The request id comes
//! from a counter shared with the other request-issuing components of the client.
//!
//! A send failure leaves the admitted entry in place; its countdown reclaims it.

use std::{fmt::Display, rc::Rc};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::{
    api::{ApiImplementation, ProcessType},
    builder::{AttributeRequestBuilder, AttributeScope, has_valid_key},
    callback::AttributeRequestCallback,
    config::RequestConfig,
    registry::{CapacityPolicy, PendingRequest, RequestRegistry},
    subscription::{SubscriptionManager, SubscriptionState},
    timeout::{Clock, Countdown, SystemClock},
    topic::{self, ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC, ATTRIBUTE_RESPONSE_TOPIC},
    transport::{RequestIdSource, Transport},
};

/// What [`AttributeRequester::on_response`] did with an inbound document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The callback of this request ran and the entry was removed.
    Fulfilled(u64),
    /// The entry had no response key; removed without running the callback.
    Malformed(u64),
    /// Unknown, expired or foreign id. Nothing changed.
    Unmatched,
}

/// # Attribute Requester
///
/// Owns the pending requests of the attribute request exchange.
///
/// ## Example
///
/// ```rust
/// use std::rc::Rc;
/// use attribute_request::{
///     AttributeRequestCallback, AttributeRequester, InMemoryTransport, RequestConfig,
///     RequestCounter,
/// };
/// use serde_json::json;
///
/// let transport = Rc::new(InMemoryTransport::new());
/// let mut requester = AttributeRequester::new(
///     RequestConfig::default(),
///     transport.clone(),
///     Rc::new(RequestCounter::new()),
/// );
///
/// let callback = AttributeRequestCallback::new(["firmware_version"], |attributes| {
///     println!("firmware: {}", attributes["firmware_version"]);
/// });
/// assert!(requester.client_attributes_request(callback));
///
/// requester.on_response(
///     "v1/devices/me/attributes/response/1",
///     &json!({"client": {"firmware_version": "1.0"}}),
/// );
/// assert_eq!(requester.pending_count(), 0);
/// ```
pub struct AttributeRequester {
    config: RequestConfig,
    registry: RequestRegistry,
    subscription: SubscriptionManager,
    transport: Rc<dyn Transport>,
    request_ids: Rc<dyn RequestIdSource>,
    clock: Rc<dyn Clock>,
}

impl AttributeRequester {
    /// Creates a requester using the system clock.
    ///
    /// # Parameters
    ///
    /// * `config` - Capacity, default timeout and verbosity
    /// * `transport` - Publish/subscribe client shared with the rest of the device client
    /// * `request_ids` - Process-wide request id counter
    pub fn new(
        config: RequestConfig,
        transport: Rc<dyn Transport>,
        request_ids: Rc<dyn RequestIdSource>,
    ) -> Self {
        Self {
            registry: RequestRegistry::new(config.capacity_policy()),
            subscription: SubscriptionManager::new(
                transport.clone(),
                ATTRIBUTE_RESPONSE_SUBSCRIBE_TOPIC,
            ),
            config,
            transport,
            request_ids,
            clock: Rc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Requests client-side attributes (`clientKeys` / `client`).
    pub fn client_attributes_request(&mut self, callback: AttributeRequestCallback) -> bool {
        self.submit(
            callback,
            Some(AttributeScope::Client.request_field()),
            Some(AttributeScope::Client.response_field()),
        )
    }

    /// Requests shared attributes (`sharedKeys` / `shared`).
    pub fn shared_attributes_request(&mut self, callback: AttributeRequestCallback) -> bool {
        self.submit(
            callback,
            Some(AttributeScope::Shared.request_field()),
            Some(AttributeScope::Shared.response_field()),
        )
    }

    /// Like the scope helpers but reports the allocated id or the reason of failure.
    pub fn request(
        &mut self,
        scope: AttributeScope,
        callback: AttributeRequestCallback,
    ) -> RequestResult<u64> {
        self.try_submit(
            callback,
            Some(scope.request_field()),
            Some(scope.response_field()),
        )
    }

    /// Submits a request and reports whether it reached the transport.
    ///
    /// A failed submission never runs its callback.
    pub fn submit(
        &mut self,
        callback: AttributeRequestCallback,
        request_field: Option<&str>,
        response_field: Option<&str>,
    ) -> bool {
        self.try_submit(callback, request_field, response_field)
            .is_ok()
    }

    /// Submits a request and returns its id.
    ///
    /// Validation happens before the transport is touched, so every
    /// [`RequestError::InvalidRequest`], [`RequestError::PayloadTooLarge`] and
    /// [`RequestError::CapacityExceeded`] leaves both the registry and the transport
    /// untouched.
    ///
    /// # Errors
    ///
    /// * `RequestError::InvalidRequest` - No usable key, or a field name is missing
    /// * `RequestError::TooManyKeys` - More keys than `max_attributes` allows
    /// * `RequestError::PayloadTooLarge` - The key list exceeds `max_payload_len`
    /// * `RequestError::CapacityExceeded` - The bounded registry is full
    /// * `RequestError::SubscribeFailed` - The response filter couldn't be subscribed
    /// * `RequestError::RequestIdUnavailable` - The shared counter didn't hand out an id
    /// * `RequestError::SendFailed` - The transport refused the publication. The entry
    ///   stays pending until its countdown expires
    #[instrument(skip(self, callback), fields(keys = ?callback.keys()))]
    pub fn try_submit(
        &mut self,
        callback: AttributeRequestCallback,
        request_field: Option<&str>,
        response_field: Option<&str>,
    ) -> RequestResult<u64> {
        if !has_valid_key(callback.keys()) {
            self.diagnostic("No keys to request were given");
            return Err(RequestError::InvalidRequest(
                "no keys to request".to_string(),
            ));
        }
        let (Some(request_field), Some(response_field)) = (request_field, response_field) else {
            self.diagnostic("Attribute request or response field is missing");
            return Err(RequestError::InvalidRequest(
                "request and response field are required".to_string(),
            ));
        };

        if let Some(max) = self.config.max_attributes {
            let count = callback.keys().len();
            if count > max {
                let e = RequestError::TooManyKeys { count, max };
                self.diagnostic(&e);
                return Err(e);
            }
        }

        let builder = AttributeRequestBuilder::new()
            .keys(callback.keys())
            .request_field(request_field)
            .response_field(response_field)
            .trailing_delimiter(self.config.trailing_delimiter)
            .max_len(self.config.max_payload_len)
            .verbose(self.config.debug);
        builder.build_payload().inspect_err(|e| self.diagnostic(e))?;

        if let Err(e) = self.registry.check_capacity() {
            warn!("{}", e);
            return Err(e);
        }
        self.subscription.ensure_subscribed()?;

        let Some(request_id) = self.request_ids.next_request_id() else {
            warn!("{}", RequestError::RequestIdUnavailable);
            self.release_if_idle();
            return Err(RequestError::RequestIdUnavailable);
        };
        let request = match builder.request_id(request_id).build() {
            Ok(request) => request,
            Err(e) => {
                warn!("{}", e);
                self.release_if_idle();
                return Err(e);
            }
        };

        let timeout = callback.timeout().or(self.config.request_timeout);
        let entry = PendingRequest::new(
            request_id,
            Some(response_field.to_string()),
            Countdown::new(timeout),
            callback,
            self.clock.now(),
        );
        if let Err(e) = self.registry.admit(entry) {
            warn!("{}", e);
            self.release_if_idle();
            return Err(e);
        }

        let topic = request.topic;
        if !self.transport.send(&topic, &request.payload) {
            warn!("Failed to send attribute request ({})", topic);
            return Err(RequestError::SendFailed(request_id));
        }
        debug!(request_id, %topic, "attribute request sent");
        Ok(request_id)
    }

    /// Routing predicate for inbound messages.
    pub fn matches_response_topic(&self, topic: &str) -> bool {
        topic::is_response_topic(topic)
    }

    /// Hands a parsed response to the request it answers.
    ///
    /// The callback gets the value nested under the entry's response key when the
    /// document has it, otherwise the whole document. Unknown ids are dropped without
    /// touching any state.
    #[instrument(skip(self, document))]
    pub fn on_response(&mut self, topic: &str, document: &Value) -> DispatchOutcome {
        if !self.matches_response_topic(topic) {
            return DispatchOutcome::Unmatched;
        }
        let Some(request_id) = topic::parse_request_id(ATTRIBUTE_RESPONSE_TOPIC, topic) else {
            self.diagnostic(format!("No request id in response topic ({})", topic));
            return DispatchOutcome::Unmatched;
        };
        let Some(mut entry) = self.registry.take(request_id) else {
            self.diagnostic(format!("No pending attribute request with id {}", request_id));
            return DispatchOutcome::Unmatched;
        };

        let narrowed = entry.response_key().map(|key| narrow(document, key));
        let outcome = match narrowed {
            Some(attributes) => {
                entry.fulfil(attributes);
                DispatchOutcome::Fulfilled(request_id)
            }
            None => {
                self.diagnostic(RequestError::MalformedEntry(request_id));
                DispatchOutcome::Malformed(request_id)
            }
        };

        // 待機中のリクエストがなくなったらレスポンスの購読を解除する
        self.release_if_idle();
        outcome
    }

    /// Retires every request whose countdown ran out and returns their ids.
    pub fn tick(&mut self) -> Vec<u64> {
        let expired = self.registry.take_expired(self.clock.now());
        if expired.is_empty() {
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(expired.len());
        for mut entry in expired {
            let handled = entry.expire();
            debug!(
                request_id = entry.request_id(),
                outcome = %entry.outcome(),
                handled,
                "attribute request timed out"
            );
            ids.push(entry.request_id());
        }
        self.release_if_idle();
        ids
    }

    /// Cancel-all: drops every pending request without running any callback and
    /// unsubscribes regardless of the current state.
    pub fn unsubscribe_all(&mut self) -> bool {
        let dropped = self.registry.clear();
        if dropped > 0 {
            debug!(dropped, "pending attribute requests cancelled");
        }
        self.subscription.release()
    }

    /// After a reconnect nothing pending can be answered anymore; callers resubmit.
    pub fn resubscribe(&mut self) -> bool {
        self.unsubscribe_all()
    }

    pub fn initialize(&mut self) {
        trace!("attribute requester initialized");
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_pending(&self, request_id: u64) -> bool {
        self.registry.contains(request_id)
    }

    pub fn pending_ids(&self) -> Vec<u64> {
        self.registry.request_ids().collect()
    }

    pub fn capacity_policy(&self) -> CapacityPolicy {
        self.registry.policy()
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    fn release_if_idle(&mut self) {
        if self.registry.is_empty() && self.subscription.state() == SubscriptionState::Subscribed
        {
            self.subscription.release();
        }
    }

    fn diagnostic(&self, message: impl Display) {
        if self.config.debug {
            debug!("{}", message);
        }
    }
}

fn narrow<'a>(document: &'a Value, response_key: &str) -> &'a Value {
    document.get(response_key).unwrap_or(document)
}

impl ApiImplementation for AttributeRequester {
    fn process_type(&self) -> ProcessType {
        ProcessType::Json
    }

    fn process_response(&mut self, _topic: &str, _payload: &[u8]) {
        // JSON only
    }

    fn process_json_response(&mut self, topic: &str, data: &Value) {
        let _ = self.on_response(topic, data);
    }

    fn compare_response_topic(&self, topic: &str) -> bool {
        self.matches_response_topic(topic)
    }

    fn unsubscribe(&mut self) -> bool {
        self.unsubscribe_all()
    }

    fn resubscribe_topic(&mut self) -> bool {
        self.resubscribe()
    }

    fn poll(&mut self) {
        let _ = self.tick();
    }

    fn initialize(&mut self) {
        AttributeRequester::initialize(self);
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Maximum of {0} pending attribute requests exceeded")]
    CapacityExceeded(usize),
    #[error("Failed to subscribe to topic ({0})")]
    SubscribeFailed(String),
    #[error("Failed to send attribute request {0}")]
    SendFailed(u64),
    #[error("Request id source unavailable")]
    RequestIdUnavailable,
    #[error("Pending attribute request {0} has no response key")]
    MalformedEntry(u64),
    #[error("Requested keys need {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("{count} attribute keys requested, limit is {max}")]
    TooManyKeys { count: usize, max: usize },
}

pub type RequestResult<T> = Result<T, RequestError>;
