use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stream::ConnectOptions;

/// Client configuration. Only `endpoint` is required
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Named pipe path on Windows, Unix socket path elsewhere
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_retry_interval_ms() -> u64 {
    50
}

impl ClientConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: Duration::from_millis(self.connect_timeout_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}
