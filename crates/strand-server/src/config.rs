//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Strand server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// SSE keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Per-subscriber event buffer size.
    pub subscriber_buffer: usize,
    /// Per-session queue capacity.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            keep_alive_secs: 15,
            subscriber_buffer: 256,
            queue_capacity: 100,
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.keep_alive_secs, 15);
        assert_eq!(cfg.subscriber_buffer, 256);
        assert_eq!(cfg.queue_capacity, 100);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.queue_capacity, cfg.queue_capacity);
    }
}
