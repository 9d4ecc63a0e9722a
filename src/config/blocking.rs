use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Timing parameters for blocking (long-poll) and plain requests
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BlockingConfig {
    /// Read timeout enforced by the HTTP client on blocking requests.
    /// Acts as the ceiling the `wait` parameter is derived from.
    /// Default: 600 (10 minutes)
    #[serde(default = "default_read_timeout_in_secs")]
    pub read_timeout_in_secs: u64,

    /// Operator override for the `wait` parameter; 0 means unset.
    /// Ignored unless it lies strictly between 1s and the derived ceiling.
    #[serde(default)]
    pub wait_time_in_ms: u64,

    /// Timeout for non-blocking requests such as `/v1/agent/self`
    /// Default: 60000
    #[serde(default = "default_request_timeout_in_ms")]
    pub request_timeout_in_ms: u64,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            read_timeout_in_secs: default_read_timeout_in_secs(),
            wait_time_in_ms: 0,
            request_timeout_in_ms: default_request_timeout_in_ms(),
        }
    }
}

impl BlockingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_in_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "blocking read_timeout_in_secs must be > 0".to_string(),
            )));
        }
        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "blocking request_timeout_in_ms must be > 0".to_string(),
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_in_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    /// `None` when no override is configured
    pub fn wait_time_override(&self) -> Option<Duration> {
        (self.wait_time_in_ms > 0).then(|| Duration::from_millis(self.wait_time_in_ms))
    }
}

fn default_read_timeout_in_secs() -> u64 {
    600
}
fn default_request_timeout_in_ms() -> u64 {
    60_000
}
