//! Client configuration
//!
//! Defaults target a conference server on localhost; every value can be
//! overridden from the environment or by the builder methods.

use crate::protocol::DEFAULT_MAX_REVISIONS;
use crate::session::Protocol;
use thiserror::Error;
use url::Url;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";
pub const DEFAULT_HTTP_URL: &str = "http://localhost:8000";
pub const DEFAULT_CONFERENCE_PATH: &str = "/api/ws/conference";
pub const DEFAULT_HITL_PATH: &str = "/api/ws/hitl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name} URL {value:?}: {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{name} must use one of {expected:?}, got {scheme:?}")]
    UnsupportedScheme {
        name: &'static str,
        scheme: String,
        expected: &'static [&'static str],
    },
    #[error("Invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket base, e.g. `ws://localhost:8000`
    pub ws_url: String,
    /// HTTP base that relative download URLs resolve against
    pub http_url: String,
    pub conference_path: String,
    pub hitl_path: String,
    pub default_max_revisions: u32,
    pub event_queue_capacity: usize,
    pub update_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            http_url: DEFAULT_HTTP_URL.to_string(),
            conference_path: DEFAULT_CONFERENCE_PATH.to_string(),
            hitl_path: DEFAULT_HITL_PATH.to_string(),
            default_max_revisions: DEFAULT_MAX_REVISIONS,
            event_queue_capacity: 256,
            update_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `CONFERENCE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("CONFERENCE_WS_URL") {
            config.ws_url = url;
        }
        if let Some(url) = lookup("CONFERENCE_HTTP_URL") {
            config.http_url = url;
        }
        if let Some(path) = lookup("CONFERENCE_PATH") {
            config.conference_path = path;
        }
        if let Some(path) = lookup("CONFERENCE_HITL_PATH") {
            config.hitl_path = path;
        }
        if let Some(value) = lookup("CONFERENCE_MAX_REVISIONS") {
            config.default_max_revisions =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber {
                        name: "CONFERENCE_MAX_REVISIONS",
                        value,
                    })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_http_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = url.into();
        self
    }

    pub fn with_default_max_revisions(mut self, max_revisions: u32) -> Self {
        self.default_max_revisions = max_revisions;
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity.max(1);
        self
    }

    /// Full endpoint URL for a protocol
    pub fn endpoint_for(&self, protocol: Protocol) -> String {
        let path = match protocol {
            Protocol::Standard => &self.conference_path,
            Protocol::Hitl => &self.hitl_path,
        };
        format!(
            "{}/{}",
            self.ws_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Endpoint URL for a pattern name
    pub fn endpoint_for_pattern(&self, pattern: &str) -> String {
        self.endpoint_for(Protocol::for_pattern(pattern))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("CONFERENCE_WS_URL", &self.ws_url, &["ws", "wss"])?;
        check_url("CONFERENCE_HTTP_URL", &self.http_url, &["http", "https"])?;
        Ok(())
    }
}

fn check_url(
    name: &'static str,
    value: &str,
    expected: &'static [&'static str],
) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        source,
    })?;
    if !expected.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            name,
            scheme: url.scheme().to_string(),
            expected,
        });
    }
    Ok(url)
}
