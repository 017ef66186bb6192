use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use super::null_as_default;
use crate::error::Result;
use crate::validation::{ValidationError, normalize_path, validate_port};

/// What the gateway wants done with a forwarded request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// One-shot HTTP call answered by a single response message
    #[default]
    Relay,
    /// Open a persistent streaming tunnel to a local WebSocket service
    Tunnel,
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        // Anything other than "tunnel" (including "") is a plain relay
        if value == "tunnel" {
            Action::Tunnel
        } else {
            Action::Relay
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Relay => "relay".to_string(),
            Action::Tunnel => "tunnel".to_string(),
        }
    }
}

/// A request forwarded by the public gateway through the broker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardedRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: Action,

    /// Session credential for the tunnel endpoint (tunnel requests only)
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,

    /// Local port to call, e.g. "8080"
    #[serde(default, deserialize_with = "port_string")]
    pub target_port: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,

    /// Local-relative path and query, e.g. "/api/v1/users?limit=10"
    #[serde(rename = "url", default, deserialize_with = "null_as_default")]
    pub path: String,

    /// Header name to list of values, as received by the gateway
    #[serde(rename = "header", default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, Vec<String>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,

    /// Identifier of the broker-side client that forwarded the call
    #[serde(rename = "hardware_id", default, deserialize_with = "null_as_default")]
    pub source_client_id: String,

    /// Correlates exactly one response with this request
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_id: String,
}

impl ForwardedRequest {
    /// Create a relay request for a local port and path
    pub fn new(target_port: impl Into<String>, method: &str, path: &str, session_id: &str) -> Self {
        Self {
            target_port: target_port.into(),
            method: method.to_string(),
            path: path.to_string(),
            session_id: session_id.to_string(),
            ..Default::default()
        }
    }

    /// Decode and validate an inbound broker message
    ///
    /// Fails on malformed JSON, a missing or invalid `target_port`, or a tunnel
    /// request without a token. Such messages carry no usable routing data.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let request: ForwardedRequest = serde_json::from_slice(payload)?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_port(&self.target_port)?;
        if self.is_tunnel() && self.token.is_empty() {
            return Err(ValidationError::MissingToken);
        }
        Ok(())
    }

    pub fn is_tunnel(&self) -> bool {
        self.action == Action::Tunnel
    }

    /// Target port as a number; zero if the request was never validated
    pub fn port(&self) -> u16 {
        validate_port(&self.target_port).unwrap_or(0)
    }

    /// HTTP method, defaulting to GET when the gateway sent none
    pub fn method(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }

    /// Path with a guaranteed leading slash
    pub fn local_path(&self) -> String {
        normalize_path(&self.path)
    }

    /// Check if the request has a body
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

/// Accept the port as either a JSON string or a number
fn port_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Port>::deserialize(deserializer)? {
        Some(Port::Text(text)) => text,
        Some(Port::Number(number)) => number.to_string(),
        None => String::new(),
    })
}
