use serde::Deserialize;

/// Broker tuning, deserializable from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// How long the dispatch loop parks when every lane is empty.
    pub idle_timeout_ms: u64,
    /// Fixed interval between delay-store promotion scans.
    pub promotion_interval_ms: u64,
    /// Base unit for exponential retry backoff: `2^retry_count * base`.
    pub retry_backoff_base_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 100,
            promotion_interval_ms: 10_000,
            retry_backoff_base_ms: 1_000,
        }
    }
}

impl BrokerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}
