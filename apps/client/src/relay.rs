//! One-shot HTTP relay
//!
//! Rebuilds a forwarded request against `localhost`, retries once over HTTPS on
//! a classified transport failure, and publishes exactly one correlated
//! [`RelayResponse`] per request.

use http::header::{CONTENT_TYPE, HOST, HeaderValue};
use netpass_common::{
    ForwardedRequest, RelayResponse, Result, TunnelError, encode_body_for_content_type,
    headers_to_map, map_to_headers, relay_header_filter,
};
use reqwest::{Client, Method};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};

use crate::broker::Publisher;
use crate::context::ClientContext;
use crate::fallback::{LOCAL_HOST, LocalScheme, classify_http_error};

/// Header marking a Base64 encoded body
const TRANSFER_ENCODING_HEADER: &str = "Content-Transfer-Encoding";

/// Canonical name under which the content type is echoed
const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Executes relay requests against local services and publishes the results
pub struct HttpRelay<P> {
    client: Client,
    ctx: Arc<ClientContext>,
    publisher: P,
}

impl<P: Publisher> HttpRelay<P> {
    pub fn new(ctx: Arc<ClientContext>, publisher: P) -> Result<Self> {
        let client = Client::builder()
            .timeout(ctx.config.request_timeout)
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .build()
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            ctx,
            publisher,
        })
    }

    /// Relay the request and publish its response on the response topic
    ///
    /// Publish failures are logged; the request counts as handled either way.
    pub async fn handle(&self, request: &ForwardedRequest) {
        let response = self.respond(request).await;

        let payload = match response.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(session_id = %request.session_id, "Failed to encode response: {}", e);
                return;
            }
        };

        let topic = self.ctx.response_topic();
        if let Err(e) = self.publisher.publish(&topic, payload).await {
            error!(session_id = %request.session_id, "Failed to publish response: {}", e);
        }
    }

    /// Execute the local call and build the response, never failing
    pub async fn respond(&self, request: &ForwardedRequest) -> RelayResponse {
        let start_time = Instant::now();
        let port = request.port();
        let path = request.local_path();

        debug!(session_id = %request.session_id, "Forwarding: {} {}", request.method(), path);

        let method = match Method::from_bytes(request.method().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                warn!(session_id = %request.session_id, "Invalid HTTP method {:?}", request.method);
                let url = LocalScheme::Plain.http_url(port, &path);
                return self
                    .blank_response(request, &url)
                    .failed("Error: invalid HTTP method");
            }
        };

        let mut url = LocalScheme::Plain.http_url(port, &path);
        let mut result = self.execute(request, method.clone(), &url).await;

        if let Some(cause) = result.as_ref().err().and_then(classify_http_error) {
            url = LocalScheme::Secure.http_url(port, &path);
            info!(session_id = %request.session_id, "Plain HTTP failed ({}), retrying {}", cause, url);
            result = self.execute(request, method, &url).await;
        }

        let response = match result {
            Ok(response) => self.into_relay_response(request, &url, response).await,
            Err(e) => {
                error!(session_id = %request.session_id, "Local request failed: {}", e);
                self.blank_response(request, &url)
                    .failed(format!("Error: {}", e))
            }
        };

        debug!(
            session_id = %request.session_id,
            "Response: {} ({}ms)",
            response.status_code,
            start_time.elapsed().as_millis()
        );

        response
    }

    async fn execute(
        &self,
        request: &ForwardedRequest,
        method: Method,
        url: &str,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut req_builder = self
            .client
            .request(method, url)
            .headers(map_to_headers(&request.headers, relay_header_filter))
            .header(HOST, HeaderValue::from_static(LOCAL_HOST));

        if request.has_body() {
            req_builder = req_builder.body(request.body.clone());
        }

        req_builder.send().await
    }

    async fn into_relay_response(
        &self,
        request: &ForwardedRequest,
        url: &str,
        response: reqwest::Response,
    ) -> RelayResponse {
        let relay = self.blank_response(request, url);
        let status = response.status();
        let mut headers = headers_to_map(response.headers());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body_bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(session_id = %request.session_id, "Failed to read response body: {}", e);
                return relay.failed("Error reading response");
            }
        };

        let encoded = encode_body_for_content_type(&content_type, &body_bytes);
        if encoded.base64 {
            headers.insert(
                TRANSFER_ENCODING_HEADER.to_string(),
                vec!["base64".to_string()],
            );
            if !content_type.is_empty() {
                headers.insert(
                    CONTENT_TYPE_HEADER.to_string(),
                    vec![format!("{}; base64", content_type)],
                );
            }
        }

        RelayResponse {
            status_code: status.as_u16(),
            status: format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            headers,
            body: encoded.body,
            ..relay
        }
    }

    fn blank_response(&self, request: &ForwardedRequest, url: &str) -> RelayResponse {
        RelayResponse::new(&request.session_id, self.ctx.client_id(), url)
    }
}
