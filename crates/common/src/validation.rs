//! Validation of the routing fields of forwarded requests
//!
//! Requests that fail validation carry no usable routing data and are dropped
//! before any local connection is attempted.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid target port: {0:?}")]
    InvalidPort(String),

    #[error("Tunnel request without a session token")]
    MissingToken,
}

/// Validate the local target port
///
/// The port must be a decimal number in 1..=65535.
///
/// # Examples
///
/// ```
/// use netpass_common::validation::validate_port;
///
/// assert_eq!(validate_port("8080").unwrap(), 8080);
/// assert!(validate_port("").is_err());
/// assert!(validate_port("0").is_err());
/// ```
pub fn validate_port(port: &str) -> Result<u16, ValidationError> {
    match port.trim().parse::<u16>() {
        Ok(value) if value != 0 => Ok(value),
        _ => Err(ValidationError::InvalidPort(
            port.chars().take(16).collect::<String>(), // Limit error message
        )),
    }
}

/// Normalize a local path so it can be appended to `scheme://localhost:port`
///
/// # Examples
///
/// ```
/// use netpass_common::validation::normalize_path;
///
/// assert_eq!(normalize_path(""), "/");
/// assert_eq!(normalize_path("api/v1"), "/api/v1");
/// assert_eq!(normalize_path("/status?x=1"), "/status?x=1");
/// ```
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
