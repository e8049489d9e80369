//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `":8080"`, `"tcp6://[::1]:8080"` or
    /// `"unix:///run/app.sock"`.
    pub address: String,

    /// Serve HTTP/2 alongside HTTP/1.1 using the `http2` limits.
    pub force_http2: bool,

    /// HTTP/2 concurrency limits.
    pub http2: Http2Config,

    /// Maximum time allowed for binding, in seconds. Zero waits forever.
    pub bind_timeout_secs: u64,

    /// Grace period for draining connections on shutdown, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ":8080".to_string(),
            force_http2: true,
            http2: Http2Config::default(),
            bind_timeout_secs: 0,
            shutdown_timeout_secs: 5,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// HTTP/2 limits, if HTTP/2 is enabled.
    pub fn http2_config(&self) -> Option<&Http2Config> {
        self.force_http2.then_some(&self.http2)
    }

    pub fn bind_timeout(&self) -> Option<Duration> {
        (self.bind_timeout_secs > 0).then(|| Duration::from_secs(self.bind_timeout_secs))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// HTTP/2 concurrency limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Http2Config {
    /// Maximum handler invocations running at once, across all connections.
    pub max_handlers: usize,

    /// Maximum concurrent streams per HTTP/2 connection.
    pub max_concurrent_streams: u32,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            max_handlers: 10_240,
            max_concurrent_streams: 4_096,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for production.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "gracehttp=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.address, ":8080");
        assert_eq!(config.http2_config(), Some(&Http2Config::default()));
        assert_eq!(config.bind_timeout(), None);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_document_overrides() {
        let config: ServerConfig = toml::from_str(
            r#"
            address = "unix:///tmp/app.sock"
            force_http2 = false
            bind_timeout_secs = 3

            [http2]
            max_concurrent_streams = 128

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.address, "unix:///tmp/app.sock");
        assert_eq!(config.http2_config(), None);
        assert_eq!(config.http2.max_concurrent_streams, 128);
        assert_eq!(config.http2.max_handlers, 10_240);
        assert_eq!(config.bind_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
