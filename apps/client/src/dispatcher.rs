//! Routes inbound broker messages to the HTTP relay or the tunnel relay
//!
//! Each message becomes its own task so the broker event loop never waits on
//! a local call.

use bytes::Bytes;
use netpass_common::{ForwardedRequest, Result};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::broker::{MessageHandler, Publisher};
use crate::context::ClientContext;
use crate::relay::HttpRelay;
use crate::tunnel::TunnelRelay;

pub struct Dispatcher<P> {
    relay: Arc<HttpRelay<P>>,
    tunnels: Arc<TunnelRelay>,
    shutdown: watch::Receiver<bool>,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(
        ctx: Arc<ClientContext>,
        publisher: P,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        Ok(Self {
            relay: Arc::new(HttpRelay::new(ctx.clone(), publisher)?),
            tunnels: Arc::new(TunnelRelay::new(ctx)?),
            shutdown,
        })
    }

    /// Decode one message and start handling it
    ///
    /// Undecodable messages have no session id to answer to, so they are
    /// logged and dropped.
    pub fn dispatch(&self, payload: &[u8]) -> Option<JoinHandle<()>> {
        let request = match ForwardedRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping malformed request ({} bytes): {}", payload.len(), e);
                return None;
            }
        };

        if request.is_tunnel() {
            debug!(session_id = %request.session_id, "Opening tunnel to port {}", request.port());
            let tunnels = self.tunnels.clone();
            let shutdown = self.shutdown.clone();
            return Some(tokio::spawn(async move {
                // Failures are logged by the relay; tunnels publish no response
                let _ = tunnels.run(&request, shutdown).await;
            }));
        }

        let relay = self.relay.clone();
        Some(tokio::spawn(async move {
            relay.handle(&request).await;
        }))
    }
}

impl<P: Publisher> MessageHandler for Dispatcher<P> {
    fn on_message(&self, payload: Bytes) {
        self.dispatch(&payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryPublisher, Published, test_context, unused_port};
    use netpass_common::RelayResponse;

    fn dispatcher(upstream_port: u16) -> (Dispatcher<MemoryPublisher>, Published) {
        let (publisher, published) = MemoryPublisher::new();
        let ctx = test_context(|config| {
            config.with_tunnel_endpoint(format!("ws://127.0.0.1:{}/tunnel", upstream_port))
        });
        let (_, shutdown) = watch::channel(false);
        (Dispatcher::new(ctx, publisher, shutdown).unwrap(), published)
    }

    #[tokio::test]
    async fn test_malformed_messages_are_dropped() {
        let (dispatcher, mut published) = dispatcher(1);

        assert!(dispatcher.dispatch(b"not json").is_none());
        assert!(dispatcher.dispatch(br#"{"target_port":"0"}"#).is_none());
        assert!(
            dispatcher
                .dispatch(br#"{"action":"tunnel","target_port":"9000"}"#)
                .is_none()
        );

        drop(dispatcher);
        assert!(published.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_relay_request_publishes_one_correlated_response() {
        let (dispatcher, mut published) = dispatcher(1);
        let port = unused_port().await;
        let payload = format!(
            r#"{{"method":"GET","url":"/status","target_port":"{}","session_id":"abc"}}"#,
            port
        );

        dispatcher.dispatch(payload.as_bytes()).unwrap().await.unwrap();
        drop(dispatcher);

        let (topic, body) = published.recv().await.unwrap();
        assert_eq!(topic, "http/response/srv-test-id");
        let response: RelayResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.session_id, "abc");
        assert_eq!(response.status_code, 502);
        assert!(published.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tunnel_request_publishes_nothing() {
        let upstream_port = unused_port().await;
        let (dispatcher, mut published) = dispatcher(upstream_port);

        let handle = dispatcher
            .dispatch(br#"{"action":"tunnel","token":"T1","target_port":"9000","session_id":"s-1"}"#)
            .unwrap();
        handle.await.unwrap();

        drop(dispatcher);
        assert!(published.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_handler_spawns_without_waiting() {
        let (dispatcher, mut published) = dispatcher(1);
        let port = unused_port().await;

        for id in ["c-1", "c-2"] {
            let payload = format!(r#"{{"target_port":{},"session_id":"{}"}}"#, port, id);
            dispatcher.on_message(Bytes::from(payload));
        }

        let mut sessions = Vec::new();
        for _ in 0..2 {
            let (_, body) = published.recv().await.unwrap();
            let response: RelayResponse = serde_json::from_slice(&body).unwrap();
            sessions.push(response.session_id);
        }
        sessions.sort();
        assert_eq!(sessions, ["c-1", "c-2"]);
    }
}
