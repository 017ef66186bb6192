use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::LOCAL_FAILURE_STATUS;
use crate::error::Result;

/// Represents the result of a local call, published back to the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    /// HTTP status code (200, 404, ...); 502 when the local call failed
    pub status_code: u16,

    /// Status line text ("200 OK") or "Error: <reason>"
    pub status: String,

    /// Response headers as a map of header name to list of values
    #[serde(rename = "header", default)]
    pub headers: HashMap<String, Vec<String>>,

    /// Response body, verbatim text or Base64 for binary content
    #[serde(default)]
    pub body: String,

    /// Identifier of this client
    #[serde(rename = "hardware_id")]
    pub client_id: String,

    /// Local URL that produced this response (diagnostic only)
    #[serde(rename = "request_url")]
    pub requested_url: String,

    /// Copied verbatim from the originating request
    pub session_id: String,
}

impl RelayResponse {
    /// Create a response carrying only correlation data
    pub fn new(session_id: &str, client_id: &str, requested_url: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            client_id: client_id.to_string(),
            requested_url: requested_url.to_string(),
            ..Default::default()
        }
    }

    /// Turn this response into a local-call failure with the given status text
    pub fn failed(mut self, status: impl Into<String>) -> Self {
        self.status_code = LOCAL_FAILURE_STATUS;
        self.status = status.into();
        self.headers.clear();
        self.body.clear();
        self
    }

    /// Serialize for publishing on the response topic
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check if the response has a body
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Check if the response is successful (2xx status code)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Check if this response reports a failed local call
    pub fn is_local_failure(&self) -> bool {
        self.status_code == LOCAL_FAILURE_STATUS && self.status.starts_with("Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_response_creation() {
        let res = RelayResponse::new("sess-1", "a1b2c3d4e5f6", "http://localhost:8080/");

        assert_eq!(res.session_id, "sess-1");
        assert_eq!(res.client_id, "a1b2c3d4e5f6");
        assert_eq!(res.requested_url, "http://localhost:8080/");
        assert!(res.headers.is_empty());
        assert!(!res.has_body());
    }

    #[test]
    fn test_failed_response() {
        let mut res = RelayResponse::new("sess-1", "id", "https://localhost:8443/");
        res.body = "partial".to_string();
        let res = res.failed("Error: connection refused");

        assert_eq!(res.status_code, 502);
        assert_eq!(res.status, "Error: connection refused");
        assert!(res.headers.is_empty());
        assert!(!res.has_body());
        assert!(res.is_local_failure());
        assert!(!res.is_success());
        assert_eq!(res.session_id, "sess-1");
    }

    #[test]
    fn test_wire_field_names() {
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            vec!["application/json".to_string()],
        );

        let res = RelayResponse {
            status_code: 200,
            status: "200 OK".to_string(),
            headers,
            body: r#"{"ok":true}"#.to_string(),
            client_id: "a1b2c3d4e5f6".to_string(),
            requested_url: "http://localhost:8080/status".to_string(),
            session_id: "abc".to_string(),
        };

        let value: serde_json::Value = serde_json::from_slice(&res.encode().unwrap()).unwrap();
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["status"], "200 OK");
        assert_eq!(value["header"]["Content-Type"][0], "application/json");
        assert_eq!(value["body"], r#"{"ok":true}"#);
        assert_eq!(value["hardware_id"], "a1b2c3d4e5f6");
        assert_eq!(value["request_url"], "http://localhost:8080/status");
        assert_eq!(value["session_id"], "abc");
    }

    #[test]
    fn test_status_code_ranges() {
        let codes = vec![(100, false), (200, true), (299, true), (302, false), (502, false)];

        for (code, is_success) in codes {
            let mut res = RelayResponse::new("s", "c", "u");
            res.status_code = code;
            assert_eq!(
                res.is_success(),
                is_success,
                "Failed for status code {}",
                code
            );
        }
    }
}
