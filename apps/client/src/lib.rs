//! NetPass tunnel client
//!
//! Keeps one broker session open, relays forwarded HTTP calls to services on
//! `localhost` and bridges tunnel requests to local WebSocket endpoints.

pub mod broker;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod fallback;
pub mod identity;
pub mod relay;
pub mod tls;
pub mod tunnel;

#[cfg(test)]
mod test_support;
