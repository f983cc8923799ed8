use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default number of in-flight records per destination.
pub const DEFAULT_MAX_RECORDS: usize = 1024;

/// Host proxy configuration.
///
/// Deserializes from JSON with every field optional:
/// `{"response_timeout_ms": 5000, "max_records": 256, "check_blocked_state": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// How long a caller waits for a correlated response. `None` waits forever.
    #[serde(rename = "response_timeout_ms", deserialize_with = "millis")]
    pub response_timeout: Option<Duration>,
    /// Capacity of each destination's response record table.
    pub max_records: usize,
    /// Ask the security domain whether an applet is blocked before opening it.
    pub check_blocked_state: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            response_timeout: None,
            max_records: DEFAULT_MAX_RECORDS,
            check_blocked_state: true,
        }
    }
}

impl ProxyConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}
