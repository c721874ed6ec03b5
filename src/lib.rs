//! # Attribute Request
//!
//! Request/response correlation for device attribute requests over a
//! publish/subscribe transport.
//!
//! A device asks the server for the current value of some client-side or shared
//! attributes by publishing to `v1/devices/me/attributes/request/{id}` and receives
//! the answer on `v1/devices/me/attributes/response/{id}`. The transport knows
//! nothing about this pairing; this crate builds it.
//!
//! ## Components
//!
//! - Request Builder ([`builder`]): payload and topic of an outbound request
//! - Request Registry ([`registry`]): pending requests, unbounded or fixed capacity
//! - Subscription Manager ([`subscription`]): response filter subscribed only while needed
//! - Timeout Supervisor ([`timeout`]): per-request countdowns driven by `tick`
//! - Response Dispatcher ([`requester`]): matches responses and runs callbacks
//!
//! The [`requester::AttributeRequester`] ties them together and implements the
//! [`api::ApiImplementation`] surface the client's [`router::MessageRouter`] talks to.
//!
//! ## Flow
//!
//! ```text
//! submit ─▶ Builder ─▶ Registry.admit ─▶ subscribe ─▶ Transport.send
//!
//! Transport ─▶ Router ─▶ Dispatcher ─▶ Registry.take ─▶ callback
//!                                          │
//!                              empty ─▶ unsubscribe
//!
//! loop ─▶ tick ─▶ Registry.take_expired ─▶ expiry handler
//! ```

pub mod api;
pub mod builder;
pub mod callback;
pub mod config;
pub mod error;
pub mod registry;
pub mod requester;
pub mod router;
pub mod subscription;
pub mod timeout;
pub mod topic;
pub mod transport;

// Re-exports
pub use builder::{AttributeRequestBuilder, AttributeScope};
pub use callback::AttributeRequestCallback;
pub use config::RequestConfig;
pub use error::*;
pub use requester::{AttributeRequester, DispatchOutcome, RequestError, RequestResult};
pub use timeout::{Clock, ManualClock, SystemClock};
pub use transport::{InMemoryTransport, RequestCounter, RequestIdSource, Transport};
