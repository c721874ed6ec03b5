//! # Subscription Manager
//!
//! Keeps the response topic filter subscribed while requests are pending. The
//! requester calls [`SubscriptionManager::ensure_subscribed`] on every admission and
//! [`SubscriptionManager::release`] when its registry drains.

use std::rc::Rc;

use tracing::warn;

use crate::{
    requester::{RequestError, RequestResult},
    transport::Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SubscriptionState {
    Subscribed,
    Unsubscribed,
}

pub struct SubscriptionManager {
    transport: Rc<dyn Transport>,
    topic_filter: &'static str,
    state: SubscriptionState,
}

impl SubscriptionManager {
    pub fn new(transport: Rc<dyn Transport>, topic_filter: &'static str) -> Self {
        Self {
            transport,
            topic_filter,
            state: SubscriptionState::Unsubscribed,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Subscribes unconditionally; the transport tolerates redundant requests.
    pub fn ensure_subscribed(&mut self) -> RequestResult<()> {
        if !self.transport.subscribe(self.topic_filter) {
            warn!("Failed to subscribe to topic ({})", self.topic_filter);
            return Err(RequestError::SubscribeFailed(self.topic_filter.to_string()));
        }
        self.state = SubscriptionState::Subscribed;
        Ok(())
    }

    /// Unsubscribes regardless of the current state.
    ///
    /// The state is considered unsubscribed afterwards even if the transport refused,
    /// since there is nothing left to receive responses for.
    pub fn release(&mut self) -> bool {
        self.state = SubscriptionState::Unsubscribed;
        let unsubscribed = self.transport.unsubscribe(self.topic_filter);
        if !unsubscribed {
            warn!("Failed to unsubscribe from topic ({})", self.topic_filter);
        }
        unsubscribed
    }
}
