//! Client configuration
//!
//! Settings come from an optional `config.json` file, overridden by CLI flags
//! and environment variables. Everything the broker session and relays need is
//! derived once here and never mutated afterwards.

use netpass_common::{
    TunnelError,
    constants::{
        BROKER_PORT, DEFAULT_HOST, IDENTITY_ENDPOINT_PATH, IDENTITY_TIMEOUT_SECS,
        LOCAL_REQUEST_TIMEOUT_SECS, PUBLIC_PATH_PREFIX, PUBLISH_TIMEOUT_SECS,
        RECONNECT_MAX_DELAY_MS, RECONNECT_MIN_DELAY_MS, RECONNECT_MULTIPLIER,
        SUBSCRIBE_TIMEOUT_SECS, TUNNEL_PATH, TUNNEL_PORT,
    },
};
use serde::Deserialize;
use std::{io::ErrorKind, path::Path, time::Duration};
use tracing::{debug, warn};
use url::Url;

/// Contents of `config.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub auto_update: bool,
}

impl FileConfig {
    /// Load the config file; a missing or undecodable file yields defaults
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config file at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Self::default();
            }
        };

        serde_json::from_slice(&contents).unwrap_or_else(|e| {
            warn!("Error decoding {}: {}", path.display(), e);
            Self::default()
        })
    }
}

/// Reconnection configuration with capped exponential backoff
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(RECONNECT_MIN_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            multiplier: RECONNECT_MULTIPLIER,
        }
    }
}

impl ReconnectConfig {
    /// Delay to use after `current`, never above `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::from_millis(
            ((current.as_millis() as f64 * self.multiplier).min(self.max_delay.as_millis() as f64))
                as u64,
        )
    }
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker/API base URL (e.g., "https://netpass.mars-cloud.com")
    pub host: String,

    /// Key presented to the identity assignment endpoint
    pub api_key: String,

    /// Whether the operator asked for automatic updates
    pub auto_update: bool,

    /// Host name of the broker, without scheme, port or path
    pub broker_domain: String,

    /// Broker publish/subscribe port
    pub broker_port: u16,

    /// Streaming tunnel endpoint, without the token query
    pub tunnel_endpoint: String,

    /// Timeout for every local HTTP relay call
    pub request_timeout: Duration,

    /// Timeout for the identity assignment call
    pub identity_timeout: Duration,

    /// Bounded wait for the subscription request
    pub subscribe_timeout: Duration,

    /// Bounded wait for handing a response to the broker
    pub publish_timeout: Duration,

    /// Reconnection strategy
    pub reconnect_config: ReconnectConfig,
}

impl Config {
    /// Build a configuration for a broker host with default timings
    pub fn new(host: &str, api_key: &str) -> netpass_common::Result<Self> {
        let host = if host.trim().is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.trim().to_string()
        };
        let broker_domain = broker_domain(&host)?;

        Ok(Self {
            tunnel_endpoint: format!("wss://{}:{}{}", broker_domain, TUNNEL_PORT, TUNNEL_PATH),
            broker_domain,
            host,
            api_key: api_key.to_string(),
            auto_update: false,
            broker_port: BROKER_PORT,
            request_timeout: Duration::from_secs(LOCAL_REQUEST_TIMEOUT_SECS),
            identity_timeout: Duration::from_secs(IDENTITY_TIMEOUT_SECS),
            subscribe_timeout: Duration::from_secs(SUBSCRIBE_TIMEOUT_SECS),
            publish_timeout: Duration::from_secs(PUBLISH_TIMEOUT_SECS),
            reconnect_config: ReconnectConfig::default(),
        })
    }

    /// Combine the file with overrides; explicit flags and env vars win
    pub fn resolve(
        file: FileConfig,
        host_override: Option<String>,
        api_key_override: Option<String>,
    ) -> netpass_common::Result<Self> {
        let host = host_override.unwrap_or(file.host);
        let api_key = api_key_override.unwrap_or(file.api_key);

        let mut config = Self::new(&host, &api_key)?;
        config.auto_update = file.auto_update;
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tunnel_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.tunnel_endpoint = endpoint.into();
        self
    }

    /// Host without a trailing slash, used to build API URLs
    fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }

    /// Public URL through which callers reach this client
    pub fn public_url(&self, client_id: &str) -> String {
        format!("{}/{}/{}/", self.base_url(), PUBLIC_PATH_PREFIX, client_id)
    }

    /// Identity assignment endpoint
    pub fn identity_url(&self) -> String {
        format!("{}{}", self.base_url(), IDENTITY_ENDPOINT_PATH)
    }
}

/// Extract the broker host name from the configured base URL
///
/// Scheme, port and path are dropped: `https://example.com:8080/x` gives `example.com`.
pub fn broker_domain(host: &str) -> netpass_common::Result<String> {
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| TunnelError::InvalidMessage(format!("Invalid host {:?}: {}", host, e)))?;

    url.host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TunnelError::InvalidMessage(format!("Host {:?} has no domain", host)))
}
