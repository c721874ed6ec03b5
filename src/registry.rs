//! # Request Registry
//!
//! Holds the pending requests of one requester, keyed by request id.
//!
//! Two regimes share the same type:
//!
//! - [`CapacityPolicy::Unbounded`]: growable, limited only by memory.
//! - [`CapacityPolicy::Bounded`]: storage for `max` entries is reserved up front and
//!   admission past it is refused.
//!
//! Entries keep submission order, so expiry and cancellation walk them oldest first.

use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use crate::{
    callback::AttributeRequestCallback,
    requester::{RequestError, RequestResult},
    timeout::Countdown,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPolicy {
    Unbounded,
    Bounded(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RequestOutcome {
    Pending,
    Fulfilled,
    Expired,
}

/// One outstanding correlation record.
#[derive(Debug)]
pub struct PendingRequest {
    request_id: u64,
    response_key: Option<String>,
    countdown: Countdown,
    callback: AttributeRequestCallback,
    outcome: RequestOutcome,
}

impl PendingRequest {
    /// Creates the record and starts its countdown.
    pub fn new(
        request_id: u64,
        response_key: Option<String>,
        mut countdown: Countdown,
        callback: AttributeRequestCallback,
        now: Instant,
    ) -> Self {
        countdown.start(now);
        Self {
            request_id,
            response_key,
            countdown,
            callback,
            outcome: RequestOutcome::Pending,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn response_key(&self) -> Option<&str> {
        self.response_key.as_deref()
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn outcome(&self) -> RequestOutcome {
        self.outcome
    }

    /// Stops the countdown and hands `value` to the response handler.
    pub fn fulfil(&mut self, value: &Value) {
        self.countdown.stop();
        self.callback.call_response(value);
        self.outcome = RequestOutcome::Fulfilled;
    }

    /// Marks the entry expired and runs the expiry handler, if any.
    pub fn expire(&mut self) -> bool {
        self.countdown.stop();
        self.outcome = RequestOutcome::Expired;
        self.callback.call_timeout()
    }
}

#[derive(Debug)]
pub struct RequestRegistry {
    policy: CapacityPolicy,
    entries: Vec<PendingRequest>,
}

impl RequestRegistry {
    /// Reserves storage for a bounded registry. When `max` can't be reserved the
    /// registry grows on demand instead, still refusing admission past `max`.
    pub fn new(policy: CapacityPolicy) -> Self {
        let mut entries: Vec<PendingRequest> = Vec::new();
        if let CapacityPolicy::Bounded(max) = policy {
            if let Err(e) = entries.try_reserve_exact(max) {
                warn!("Unable to reserve {} pending request slots: {}", max, e);
            }
        }
        Self { policy, entries }
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        match self.policy {
            CapacityPolicy::Bounded(max) => self.entries.len() >= max,
            CapacityPolicy::Unbounded => false,
        }
    }

    /// Fails with [`RequestError::CapacityExceeded`] when a bounded registry is full.
    pub fn check_capacity(&self) -> RequestResult<()> {
        match self.policy {
            CapacityPolicy::Bounded(max) if self.entries.len() >= max => {
                Err(RequestError::CapacityExceeded(max))
            }
            _ => Ok(()),
        }
    }

    pub fn admit(&mut self, request: PendingRequest) -> RequestResult<()> {
        self.check_capacity()?;
        if self.contains(request.request_id) {
            return Err(RequestError::InvalidRequest(format!(
                "request id {} is already pending",
                request.request_id
            )));
        }
        self.entries.push(request);
        Ok(())
    }

    pub fn contains(&self, request_id: u64) -> bool {
        self.entries.iter().any(|r| r.request_id == request_id)
    }

    /// Removes and returns the entry with `request_id`.
    pub fn take(&mut self, request_id: u64) -> Option<PendingRequest> {
        let index = self
            .entries
            .iter()
            .position(|r| r.request_id == request_id)?;
        Some(self.entries.remove(index))
    }

    /// Removes every entry whose countdown has run out at `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingRequest> {
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|r| r.countdown.is_expired(now));
        self.entries = pending;
        expired
    }

    /// Drops every entry without running any handler. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn request_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|r| r.request_id)
    }
}
