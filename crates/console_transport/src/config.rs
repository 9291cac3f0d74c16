use std::collections::BTreeMap;
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Server the console talks to when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
/// Bound on the WebSocket upgrade plus namespace connect.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`crate::Channel`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the execution server (`http`, `https`, `ws` or `wss`).
    pub server_url: String,
    pub reconnect: ReconnectPolicy,
    pub handshake_timeout: Duration,
    /// Additional headers sent with the WebSocket upgrade request.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl TransportConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
