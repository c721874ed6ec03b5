use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult, registry::CapacityPolicy};

/// Construction-time settings for an [`AttributeRequester`](crate::requester::AttributeRequester).
///
/// Loaded from JSON; every field has a default so an empty object is a valid config.
///
/// ```json
/// {
///   "max_pending_requests": 2,
///   "request_timeout": 5000,
///   "max_attributes": 5,
///   "debug": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestConfig {
    /// `None` keeps the registry growable, `Some(n)` caps it at `n` pending requests.
    #[serde(default)]
    pub max_pending_requests: Option<usize>,

    /// Default countdown for requests whose callback doesn't carry its own.
    /// `None` disables the timeout.
    #[serde(default = "default_request_timeout", with = "option_duration_ms")]
    pub request_timeout: Option<Duration>,

    /// Emit diagnostic messages (skipped keys, unknown response ids, ...).
    #[serde(default)]
    pub debug: bool,

    /// Upper bound for the joined key list, in bytes.
    #[serde(default)]
    pub max_payload_len: Option<usize>,

    /// Upper bound for the number of keys one request may carry.
    #[serde(default)]
    pub max_attributes: Option<usize>,

    /// Append the delimiter after the last key as well (`"a,b,"`).
    #[serde(default = "default_true")]
    pub trailing_delimiter: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_pending_requests: None,
            request_timeout: default_request_timeout(),
            debug: false,
            max_payload_len: None,
            max_attributes: None,
            trailing_delimiter: default_true(),
        }
    }
}

impl RequestConfig {
    /// Fixed-capacity config, the shape used on constrained devices.
    pub fn bounded(max_pending_requests: usize) -> Self {
        Self {
            max_pending_requests: Some(max_pending_requests),
            ..Default::default()
        }
    }

    pub fn capacity_policy(&self) -> CapacityPolicy {
        match self.max_pending_requests {
            Some(max) => CapacityPolicy::Bounded(max),
            None => CapacityPolicy::Unbounded,
        }
    }

    pub fn from_file(path: &str) -> InternalResult<Self> {
        from_file(path)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

// デフォルト値の定義
fn default_request_timeout() -> Option<Duration> {
    Some(Duration::from_secs(5))
}
fn default_true() -> bool {
    true
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::duration_ms::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
