//! `ProviderConfig`: per-provider network/performance configuration and
//! key pool (spec §3).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Network configuration for a provider: base URL, timeouts, retry/backoff
/// policy, and transport extras.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub base_url: String,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            extra_headers: HashMap::new(),
            proxy: None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Performance configuration: concurrency cap `N` and queue capacity `B`.
/// The invariant `B > N` is enforced by [`PerformanceConfig::validate`] and
/// must hold at worker-pool startup (spec §4.3).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub concurrency: usize,
    pub buffer_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            buffer_size: 64,
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size <= self.concurrency {
            return Err(format!(
                "buffer_size ({}) must exceed concurrency ({})",
                self.buffer_size, self.concurrency
            ));
        }
        Ok(())
    }
}

/// Full configuration for one provider: network, performance, and its key
/// pool. Instances are swapped atomically on reload (spec §5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub keys: Vec<Key>,
    /// Whether raw upstream request/response bytes are retained alongside
    /// the unified response (spec §9: off by default, balloons storage).
    #[serde(default)]
    pub attach_raw_response: bool,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: NetworkConfig::default(),
            performance: PerformanceConfig::default(),
            keys: Vec::new(),
            attach_raw_response: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_must_exceed_concurrency() {
        let cfg = PerformanceConfig {
            concurrency: 8,
            buffer_size: 8,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn valid_buffer_passes() {
        let cfg = PerformanceConfig {
            concurrency: 8,
            buffer_size: 64,
        };
        assert!(cfg.validate().is_ok());
    }
}
