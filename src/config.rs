//! Relay configuration

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for a `Dispatcher` and its `LivenessMonitor`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Largest accepted request payload in bytes (default: 1 MiB)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Failed deliveries retained by the in-memory delivery log (default: 10000)
    #[serde(default = "default_delivery_log_capacity")]
    pub delivery_log_capacity: usize,

    /// Buffer size of the observability event channel (default: 256)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Invoke the failure handler when a request times out (default: false)
    #[serde(default)]
    pub notify_on_timeout: bool,

    /// Age after which a Pending request is expired by the liveness monitor
    /// (default: 300000 ms)
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,

    /// How often the liveness monitor sweeps (default: 5000 ms)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

fn default_delivery_log_capacity() -> usize {
    10_000
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_request_deadline_ms() -> u64 {
    300_000
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            delivery_log_capacity: default_delivery_log_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            notify_on_timeout: false,
            request_deadline_ms: default_request_deadline_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl RelayConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: RelayConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Relay config loaded");
        Ok(config)
    }

    /// Reject zero capacities, deadlines and intervals
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(RelayError::Config(
                "maxPayloadBytes must be greater than 0".to_string(),
            ));
        }
        if self.delivery_log_capacity == 0 {
            return Err(RelayError::Config(
                "deliveryLogCapacity must be greater than 0".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(RelayError::Config(
                "eventChannelCapacity must be greater than 0".to_string(),
            ));
        }
        if self.request_deadline_ms == 0 {
            return Err(RelayError::Config(
                "requestDeadlineMs must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(RelayError::Config(
                "sweepIntervalMs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Request deadline as a `Duration`
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Sweep interval as a `Duration`
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.max_payload_bytes, 1_048_576);
        assert_eq!(config.delivery_log_capacity, 10_000);
        assert!(!config.notify_on_timeout);
        assert_eq!(config.request_deadline(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_fields_rejected() {
        let cases: [(&str, fn(&mut RelayConfig)); 5] = [
            ("maxPayloadBytes", |c| c.max_payload_bytes = 0),
            ("deliveryLogCapacity", |c| c.delivery_log_capacity = 0),
            ("eventChannelCapacity", |c| c.event_channel_capacity = 0),
            ("requestDeadlineMs", |c| c.request_deadline_ms = 0),
            ("sweepIntervalMs", |c| c.sweep_interval_ms = 0),
        ];
        for (field, zero) in cases {
            let mut config = RelayConfig::default();
            zero(&mut config);
            match config.validate() {
                Err(RelayError::Config(msg)) => assert!(msg.contains(field), "{msg}"),
                other => panic!("{field}: expected config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"maxPayloadBytes": 2048, "notifyOnTimeout": true}"#).unwrap();
        assert_eq!(config.max_payload_bytes, 2048);
        assert!(config.notify_on_timeout);
        assert_eq!(config.sweep_interval_ms, 5_000);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"requestDeadlineMs": 1000, "sweepIntervalMs": 100}}"#).unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.request_deadline(), Duration::from_secs(1));
        assert_eq!(config.sweep_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sweepIntervalMs": 0}}"#).unwrap();

        let err = RelayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = RelayConfig::from_file("/nonexistent/a3s-relay.json").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_from_file_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = RelayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::Serialization(_)));
    }
}
