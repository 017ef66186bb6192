//! Shared fixtures for the client's unit tests

use netpass_common::{Result, TunnelError};
use rustls::{
    ServerConfig,
    crypto::ring,
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tokio_rustls::TlsAcceptor;

use crate::broker::Publisher;
use crate::config::Config;
use crate::context::ClientContext;
use crate::identity::ClientIdentity;

pub type Published = mpsc::UnboundedReceiver<(String, Vec<u8>)>;

/// Publisher that records every message instead of sending it to a broker
#[derive(Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

impl MemoryPublisher {
    pub fn new() -> (Self, Published) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.tx
            .send((topic.to_string(), payload))
            .map_err(|_| TunnelError::BrokerError("test receiver dropped".to_string()))
    }
}

/// Context with a fixed identity; `customize` adjusts the default config
pub fn test_context(customize: impl FnOnce(Config) -> Config) -> Arc<ClientContext> {
    let config = customize(Config::new("https://broker.example.com", "").unwrap());
    let identity = ClientIdentity {
        local_id: "a1b2c3d4e5f6".to_string(),
        assigned_id: "srv-test-id".to_string(),
    };
    Arc::new(ClientContext::new(config, identity))
}

/// A port nothing listens on
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Serve one connection with a canned response and hand back the raw request
pub async fn spawn_http_responder(response: Vec<u8>) -> (u16, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let raw = read_request(&mut stream).await;
        stream.write_all(&response).await.unwrap();
        let _ = stream.shutdown().await;
        let _ = tx.send(raw);
    });

    (port, rx)
}

/// TLS acceptor with a fresh self-signed certificate for `localhost`
pub fn tls_acceptor() -> TlsAcceptor {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![certified.cert.der().clone()], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Like [`spawn_http_responder`], but the port only speaks TLS
///
/// Connections that fail the TLS handshake (plain HTTP) are dropped and the
/// listener keeps accepting until one request is served.
pub async fn spawn_https_responder(response: Vec<u8>) -> (u16, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = tls_acceptor();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(mut stream) = acceptor.accept(stream).await else {
                continue;
            };
            let raw = read_request(&mut stream).await;
            stream.write_all(&response).await.unwrap();
            let _ = stream.shutdown().await;
            let _ = tx.send(raw);
            break;
        }
    });

    (port, rx)
}

/// Accept connections and never answer
pub async fn spawn_stalled_server(hold: Duration) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(hold).await;
                drop(stream);
            });
        }
    });

    port
}

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}
