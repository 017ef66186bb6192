//! Streaming tunnel relay
//!
//! A tunnel session joins the broker's tunnel endpoint to a local WebSocket
//! service and pumps frames both ways. Whichever pump finishes first ends the
//! session, and both legs are closed together.

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use http::header::{HeaderValue, ORIGIN};
use netpass_common::{
    ForwardedRequest, Result, TunnelError, constants::TUNNEL_CLOSE_TIMEOUT_SECS, map_to_headers,
    websocket_header_filter,
};
use rustls::ClientConfig;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{self, Message, client::IntoClientRequest},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::context::ClientContext;
use crate::fallback::{LocalScheme, classify_ws_error};
use crate::tls::{insecure_client_config, ws_connector};

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of one tunnel session; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Init,
    ConnectUpstream,
    ConnectLocal,
    Relaying,
    Closed,
}

/// Which connection a pump reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Upstream,
    Local,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Upstream => f.write_str("tunnel"),
            Leg::Local => f.write_str("local"),
        }
    }
}

/// Terminal condition of one pump
#[derive(Debug)]
struct PumpReport {
    leg: Leg,
    outcome: Result<()>,
}

struct TunnelSession<'a> {
    session_id: &'a str,
    state: TunnelState,
}

impl<'a> TunnelSession<'a> {
    fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            state: TunnelState::Init,
        }
    }

    fn enter(&mut self, next: TunnelState) {
        debug!(session_id = %self.session_id, "Tunnel {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Opens tunnel sessions for tunnel requests
pub struct TunnelRelay {
    ctx: Arc<ClientContext>,
    tls: Arc<ClientConfig>,
}

impl TunnelRelay {
    pub fn new(ctx: Arc<ClientContext>) -> Result<Self> {
        Ok(Self {
            ctx,
            tls: insecure_client_config()?,
        })
    }

    /// Run one session to completion
    ///
    /// Returns an error when either leg cannot be established; in that case
    /// nothing is left open. Once relaying, the session ends on the first
    /// close or error from either side, or when `shutdown` flips.
    pub async fn run(
        &self,
        request: &ForwardedRequest,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<TunnelState> {
        let mut session = TunnelSession::new(&request.session_id);

        session.enter(TunnelState::ConnectUpstream);
        let mut upstream = match self.connect_upstream(&request.token).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(session_id = %request.session_id, "[tunnel] Connect failed: {}", e);
                session.enter(TunnelState::Closed);
                return Err(e);
            }
        };

        session.enter(TunnelState::ConnectLocal);
        let local = match self.connect_local(request).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(session_id = %request.session_id, "[local] Connect failed: {}", e);
                close_quietly(&mut upstream).await;
                session.enter(TunnelState::Closed);
                return Err(e);
            }
        };

        session.enter(TunnelState::Relaying);
        info!(
            session_id = %request.session_id,
            "Tunnel open to localhost:{}{}",
            request.port(),
            request.local_path()
        );

        let (upstream_sink, upstream_stream) = upstream.split();
        let (local_sink, local_stream) = local.split();

        // Room for both reports so neither pump blocks on exit
        let (report_tx, mut report_rx) = mpsc::channel::<PumpReport>(2);
        let (stop_tx, stop_rx) = watch::channel(false);

        let to_local = tokio::spawn(pump(
            Leg::Upstream,
            upstream_stream,
            local_sink,
            report_tx.clone(),
            stop_rx.clone(),
        ));
        let to_upstream = tokio::spawn(pump(
            Leg::Local,
            local_stream,
            upstream_sink,
            report_tx,
            stop_rx,
        ));

        tokio::select! {
            report = report_rx.recv() => match report {
                Some(PumpReport { leg, outcome: Ok(()) }) => {
                    info!(session_id = %request.session_id, "[{}] Closed", leg);
                }
                Some(PumpReport { leg, outcome: Err(e) }) => {
                    warn!(session_id = %request.session_id, "[{}] {}", leg, e);
                }
                None => {}
            },
            _ = shutdown.changed() => {
                info!(session_id = %request.session_id, "Tunnel cancelled by shutdown");
            }
        }

        let _ = stop_tx.send(true);
        let _ = tokio::join!(to_local, to_upstream);

        session.enter(TunnelState::Closed);
        Ok(session.state)
    }

    async fn connect_upstream(&self, token: &str) -> Result<WebSocket> {
        let url = Url::parse_with_params(&self.ctx.config.tunnel_endpoint, &[("token", token)])
            .map_err(|e| TunnelError::ConnectionError(format!("Invalid tunnel endpoint: {}", e)))?;

        debug!("[tunnel] Connecting to {}", url.path());
        let (ws, _) =
            connect_async_tls_with_config(url.as_str(), None, false, Some(ws_connector(&self.tls)))
                .await
                .map_err(|e| TunnelError::WebSocketError(e.to_string()))?;

        Ok(ws)
    }

    async fn connect_local(&self, request: &ForwardedRequest) -> Result<WebSocket> {
        let port = request.port();
        let path = request.local_path();

        let err = match self
            .dial_local(LocalScheme::Plain, port, &path, &request.headers)
            .await
        {
            Ok(ws) => return Ok(ws),
            Err(e) => e,
        };

        let Some(cause) = classify_ws_error(&err) else {
            return Err(handshake_failure(err));
        };

        info!(
            session_id = %request.session_id,
            "[local] Plain WebSocket failed ({}), retrying {}",
            cause,
            LocalScheme::Secure.ws_url(port, &path)
        );
        self.dial_local(LocalScheme::Secure, port, &path, &request.headers)
            .await
            .map_err(handshake_failure)
    }

    async fn dial_local(
        &self,
        scheme: LocalScheme,
        port: u16,
        path: &str,
        headers: &HashMap<String, Vec<String>>,
    ) -> std::result::Result<WebSocket, tungstenite::Error> {
        let mut handshake = scheme.ws_url(port, path).into_client_request()?;

        let forwarded = map_to_headers(headers, websocket_header_filter);
        for (name, value) in forwarded.iter() {
            handshake.headers_mut().append(name, value.clone());
        }

        let origin = HeaderValue::from_str(&scheme.origin(port)).map_err(http::Error::from)?;
        handshake.headers_mut().insert(ORIGIN, origin);

        let (ws, _) =
            connect_async_tls_with_config(handshake, None, false, Some(ws_connector(&self.tls)))
                .await?;
        Ok(ws)
    }
}

/// Log a rejected upgrade with whatever the server sent back
fn handshake_failure(err: tungstenite::Error) -> TunnelError {
    if let tungstenite::Error::Http(response) = &err {
        let body = response
            .body()
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        warn!("[local] Upgrade rejected: {} {}", response.status(), body);
    }
    TunnelError::WebSocketError(err.to_string())
}

/// Forward frames from `source` into `sink` until either side ends or `stop` flips
async fn pump(
    from: Leg,
    mut source: SplitStream<WebSocket>,
    mut sink: SplitSink<WebSocket, Message>,
    reports: mpsc::Sender<PumpReport>,
    mut stop: watch::Receiver<bool>,
) {
    let outcome = tokio::select! {
        outcome = forward(from, &mut source, &mut sink) => outcome,
        _ = stop.changed() => Ok(()),
    };

    let _ = reports.send(PumpReport { leg: from, outcome }).await;

    match tokio::time::timeout(Duration::from_secs(TUNNEL_CLOSE_TIMEOUT_SECS), sink.close()).await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("[{}] Close of peer leg: {}", from, e),
        Err(_) => debug!("[{}] Close of peer leg timed out", from),
    }
}

async fn forward(
    from: Leg,
    source: &mut SplitStream<WebSocket>,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Result<()> {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                sink.send(message)
                    .await
                    .map_err(|e| TunnelError::WebSocketError(format!("write failed: {}", e)))?;
            }
            Ok(Message::Close(frame)) => {
                debug!("[{}] Close frame: {:?}", from, frame);
                return Ok(());
            }
            // Ping and pong are answered per leg
            Ok(_) => {}
            Err(e) => return Err(TunnelError::WebSocketError(e.to_string())),
        }
    }

    Ok(())
}

async fn close_quietly(ws: &mut WebSocket) {
    let close = tokio::time::timeout(
        Duration::from_secs(TUNNEL_CLOSE_TIMEOUT_SECS),
        ws.close(None),
    );
    if let Ok(Err(e)) = close.await {
        debug!("Close failed: {}", e);
    }
}
