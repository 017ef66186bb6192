//! Common types and utilities for the NetPass tunnel client
//!
//! This crate provides the broker wire protocol, constants and the pure helpers
//! (header hygiene, body encoding, identity digest, validation) used by the client agent.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use protocol::{Action, ForwardedRequest, RelayResponse, request_topic, response_topic};
pub use utils::{
    EncodedBody, canonical_header_name, derive_local_id, encode_body, encode_body_for_content_type,
    headers_to_map, is_text_like, map_to_headers, relay_header_filter, websocket_header_filter,
};
pub use validation::ValidationError;
