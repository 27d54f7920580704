//! Queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of stored items (all statuses).
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Maximum number of items in Processing at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Default maximum retries for items that do not set their own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Default retry delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub default_retry_delay_ms: u64,

    /// Capacity of the transition event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_size() -> usize {
    1000
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_concurrent: default_max_concurrent(),
            default_max_retries: default_max_retries(),
            default_retry_delay_ms: default_retry_delay_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl QueueConfig {
    /// Get the default retry delay as a Duration.
    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.default_retry_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_config_serialization() {
        let config = QueueConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: QueueConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_size, config.max_size);
        assert_eq!(parsed.max_concurrent, config.max_concurrent);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: QueueConfig = serde_json::from_str(r#"{"max_size": 10}"#).unwrap();
        assert_eq!(parsed.max_size, 10);
        assert_eq!(parsed.max_concurrent, 4);
    }
}
