//! Hands inbound messages to the protocol handler that owns their topic.

use std::{cell::RefCell, rc::Rc};

use thiserror::Error;
use tracing::{trace, warn};

use crate::api::{ApiImplementation, ProcessType};

pub type SharedApi = Rc<RefCell<dyn ApiImplementation>>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Failed to deserialize payload on topic ({topic}): {source}")]
    Deserialize {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type RouterResult<T> = Result<T, RouterError>;

#[derive(Default)]
pub struct MessageRouter {
    apis: Vec<SharedApi>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&mut self, api: SharedApi) {
        api.borrow_mut().initialize();
        self.apis.push(api);
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    /// Routes to the first handler claiming `topic`. Returns `false` when nobody did.
    pub fn route(&self, topic: &str, payload: &[u8]) -> RouterResult<bool> {
        let Some(api) = self
            .apis
            .iter()
            .find(|api| api.borrow().compare_response_topic(topic))
        else {
            trace!(topic, "no handler for topic");
            return Ok(false);
        };

        let process_type = api.borrow().process_type();
        match process_type {
            ProcessType::Raw => api.borrow_mut().process_response(topic, payload),
            ProcessType::Json => {
                let data = serde_json::from_slice(payload).map_err(|source| {
                    warn!("Unable to deserialize payload on topic ({})", topic);
                    RouterError::Deserialize {
                        topic: topic.to_string(),
                        source,
                    }
                })?;
                api.borrow_mut().process_json_response(topic, &data);
            }
        }
        Ok(true)
    }

    pub fn poll(&self) {
        for api in &self.apis {
            api.borrow_mut().poll();
        }
    }

    /// Returns `true` only if every handler unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        self.apis
            .iter()
            .fold(true, |ok, api| api.borrow_mut().unsubscribe() && ok)
    }

    pub fn resubscribe(&self) -> bool {
        self.apis
            .iter()
            .fold(true, |ok, api| api.borrow_mut().resubscribe_topic() && ok)
    }
}
