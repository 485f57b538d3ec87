//! Oracle service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// NeoFS access parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeoFsConfig {
    /// Gateway node addresses, tried round-robin by `(id + attempts) % n`.
    pub nodes: Vec<String>,
    /// Per-fetch timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for NeoFsConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Parameters of the oracle service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Per-HTTP-request timeout.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// An incomplete request older than this is dropped.
    #[serde(with = "duration_ms")]
    pub max_task_timeout: Duration,
    /// An incomplete request older than this is retried; the retry takes the
    /// backup path.
    #[serde(with = "duration_ms")]
    pub refresh_interval: Duration,
    /// Worker pool size and request channel capacity.
    pub max_concurrent_requests: usize,
    /// Accepted response content types; empty accepts everything.
    pub allowed_content_types: Vec<String>,
    /// Response body ceiling in bytes.
    pub max_response_size: usize,
    /// Maximum redirects an HTTPS fetch may follow.
    pub max_redirects: usize,
    /// NeoFS parameters.
    pub neofs: NeoFsConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_task_timeout: Duration::from_secs(3600),
            refresh_interval: Duration::from_secs(180),
            max_concurrent_requests: 10,
            allowed_content_types: vec!["application/json".to_string()],
            max_response_size: 0xFFFF,
            max_redirects: 5,
            neofs: NeoFsConfig::default(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let config = OracleConfig::default();
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_interval, Duration::from_secs(180));
        assert_eq!(config.max_task_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = OracleConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: OracleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_timeout, config.request_timeout);
        assert_eq!(back.allowed_content_types, config.allowed_content_types);
    }
}
