//! Observer configuration.
//!
//! Configuration is an explicit value handed to the observer. The only
//! environment lookup is [`ObserverConfig::from_env`], which callers opt
//! into.

use crate::error::ConfigError;

/// Environment variable holding the notifier's `host:port`.
pub const HOST_ENV_VAR: &str = "CONCORD_STATUS_CHANGE_NOTIFIER_HOST";

/// Default WebSocket path for observers.
pub const DEFAULT_PATH: &str = "/observers";

/// Where and how the observer connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// Dial target: `host:port`, or a full `ws://` base URL.
    pub endpoint_address: String,
    /// Path appended to the endpoint address.
    pub path: String,
    /// Capacity of the bounded frame channel between reader and dispatcher.
    pub frame_queue_capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            endpoint_address: "localhost:5555".to_string(),
            path: DEFAULT_PATH.to_string(),
            frame_queue_capacity: 1024,
        }
    }
}

impl ObserverConfig {
    /// Config for `endpoint_address` with default path and capacity.
    #[must_use]
    pub fn new(endpoint_address: impl Into<String>) -> Self {
        Self {
            endpoint_address: endpoint_address.into(),
            ..Self::default()
        }
    }

    /// Read the endpoint address from [`HOST_ENV_VAR`].
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(HOST_ENV_VAR) {
            Ok(host) if !host.trim().is_empty() => Ok(Self::new(host.trim())),
            _ => Err(ConfigError::MissingVar {
                name: HOST_ENV_VAR.to_string(),
            }),
        }
    }

    /// Set the WebSocket path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the frame channel capacity.
    #[must_use]
    pub fn with_frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = capacity;
        self
    }

    /// Check the endpoint address and path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.endpoint_address.trim();
        if addr.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                reason: "endpoint address is empty".to_string(),
            });
        }
        // The transport is built without TLS.
        if addr.starts_with("wss://") {
            return Err(ConfigError::InvalidEndpoint {
                reason: format!("TLS endpoints are not supported: '{addr}'"),
            });
        }
        if addr.contains("://") && !addr.starts_with("ws://") {
            return Err(ConfigError::InvalidEndpoint {
                reason: format!("unsupported scheme in '{addr}'"),
            });
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint {
                reason: format!("path '{}' must start with '/'", self.path),
            });
        }
        Ok(())
    }

    /// The URL to dial.
    #[must_use]
    pub fn url(&self) -> String {
        let addr = self.endpoint_address.trim().trim_end_matches('/');
        if addr.starts_with("ws://") {
            format!("{addr}{}", self.path)
        } else {
            format!("ws://{addr}{}", self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_host_port() {
        let cfg = ObserverConfig::new("notifier:8080");
        assert_eq!(cfg.url(), "ws://notifier:8080/observers");
    }

    #[test]
    fn test_url_keeps_explicit_scheme() {
        let cfg = ObserverConfig::new("ws://notifier.example.com/");
        assert_eq!(cfg.url(), "ws://notifier.example.com/observers");
    }

    #[test]
    fn test_validate_rejects_tls_endpoint() {
        let err = ObserverConfig::new("wss://notifier.example.com").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
        assert!(err.to_string().contains("TLS"));
    }

    #[test]
    fn test_custom_path() {
        let cfg = ObserverConfig::new("h:1").with_path("/v2/observers");
        assert_eq!(cfg.url(), "ws://h:1/v2/observers");
    }

    #[test]
    fn test_validate() {
        assert!(ObserverConfig::default().validate().is_ok());
        assert!(ObserverConfig::new("  ").validate().is_err());
        assert!(ObserverConfig::new("http://h:1").validate().is_err());
        assert!(ObserverConfig::new("h:1").with_path("observers").validate().is_err());
    }

    #[test]
    fn test_builder_capacity() {
        let cfg = ObserverConfig::new("h:1").with_frame_queue_capacity(8);
        assert_eq!(cfg.frame_queue_capacity, 8);
    }
}
