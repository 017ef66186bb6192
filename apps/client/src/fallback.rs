//! Scheme fallback for local calls
//!
//! Local services may serve only TLS. A plain attempt that fails in one of the
//! ways a TLS-only port typically fails is retried once over the secure scheme.
//! Any other failure (timeouts, HTTP-level rejections) is final.

use std::{error::Error as StdError, fmt, io};
use tokio_tungstenite::tungstenite::{self, error::ProtocolError};

/// Host used for every local call
pub const LOCAL_HOST: &str = "localhost";

/// Transport failures that justify retrying under the secure scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    ConnectionRefused,
    ConnectionReset,
    UnexpectedEof,
    MalformedResponse,
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FallbackCause::ConnectionRefused => "connection refused",
            FallbackCause::ConnectionReset => "connection reset",
            FallbackCause::UnexpectedEof => "unexpected EOF",
            FallbackCause::MalformedResponse => "malformed response",
        };
        f.write_str(text)
    }
}

/// URL scheme family used for a local call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalScheme {
    Plain,
    Secure,
}

impl LocalScheme {
    pub fn http_url(self, port: u16, path: &str) -> String {
        let scheme = match self {
            LocalScheme::Plain => "http",
            LocalScheme::Secure => "https",
        };
        format!("{}://{}:{}{}", scheme, LOCAL_HOST, port, path)
    }

    pub fn ws_url(self, port: u16, path: &str) -> String {
        let scheme = match self {
            LocalScheme::Plain => "ws",
            LocalScheme::Secure => "wss",
        };
        format!("{}://{}:{}{}", scheme, LOCAL_HOST, port, path)
    }

    /// Origin a local WebSocket service expects from a same-host page
    pub fn origin(self, port: u16) -> String {
        self.http_url(port, "")
    }
}

pub fn classify_io(kind: io::ErrorKind) -> Option<FallbackCause> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(FallbackCause::ConnectionRefused),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            Some(FallbackCause::ConnectionReset)
        }
        io::ErrorKind::UnexpectedEof => Some(FallbackCause::UnexpectedEof),
        _ => None,
    }
}

/// Classify a failed local HTTP call
pub fn classify_http_error(err: &reqwest::Error) -> Option<FallbackCause> {
    if err.is_timeout() {
        return None;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && let Some(found) = classify_io(io_err.kind())
        {
            return Some(found);
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() {
                return Some(FallbackCause::UnexpectedEof);
            }
            if hyper_err.is_parse() {
                return Some(FallbackCause::MalformedResponse);
            }
        }
        source = cause.source();
    }

    None
}

/// Classify a failed local WebSocket handshake
pub fn classify_ws_error(err: &tungstenite::Error) -> Option<FallbackCause> {
    match err {
        tungstenite::Error::Io(io_err) => classify_io(io_err.kind()),
        tungstenite::Error::Protocol(ProtocolError::HttparseError(_)) => {
            Some(FallbackCause::MalformedResponse)
        }
        tungstenite::Error::Protocol(ProtocolError::HandshakeIncomplete) => {
            Some(FallbackCause::UnexpectedEof)
        }
        tungstenite::Error::ConnectionClosed => Some(FallbackCause::UnexpectedEof),
        _ => None,
    }
}
