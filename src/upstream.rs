//! The binary's downstream handler: forward the request to one origin.
//!
//! [`ForwardHandler`] rewrites the URI onto the configured origin, strips
//! hop-by-hop headers, rewrites `Host`, and appends proxy metadata
//! (`X-Forwarded-For`, `X-Forwarded-Host`, `X-Forwarded-Proto`, `Via`)
//! before sending the request through the shared hyper client. Upstream
//! failures are answered with `502` / `504` like any proxy would; they
//! are not handler errors.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::ACCEPT_ENCODING;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Full};
use url::Url;

use crate::enrich::headers::strip_request_hop_by_hop;
use crate::enrich::RequestHandler;
use crate::error::HandlerError;
use crate::server::HttpClient;

pub struct ForwardHandler {
    client: HttpClient,
    origin: Url,
    timeout: Duration,
}

impl ForwardHandler {
    #[must_use]
    pub const fn new(client: HttpClient, origin: Url, timeout: Duration) -> Self {
        Self {
            client,
            origin,
            timeout,
        }
    }

    /// Origin base joined with the request's path and query.
    #[must_use]
    pub fn target_uri(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!(
            "{}{}",
            self.origin.as_str().trim_end_matches('/'),
            path_and_query
        )
    }

    fn forwarded_headers(&self, mut headers: HeaderMap, client_ip: Option<String>) -> HeaderMap {
        let original_host = headers.get("host").cloned();
        strip_request_hop_by_hop(&mut headers);
        // Placeholders can only be found in an uncompressed body.
        headers.remove(ACCEPT_ENCODING);

        if let Some(host) = self.origin.host_str() {
            let host_value = self
                .origin
                .port()
                .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
            if let Ok(val) = HeaderValue::from_str(&host_value) {
                headers.insert("host", val);
            }
        }

        if let Some(ip) = client_ip {
            let xff = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .map_or_else(|| ip.clone(), |existing| format!("{existing}, {ip}"));
            if let Ok(val) = HeaderValue::from_str(&xff) {
                headers.insert("x-forwarded-for", val);
            }
        }

        if let Some(host) = original_host {
            headers.insert("x-forwarded-host", host);
        }
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        headers.insert("via", HeaderValue::from_static("1.1 splicegate"));

        headers
    }
}

#[async_trait]
impl RequestHandler for ForwardHandler {
    #[allow(clippy::cast_possible_truncation)]
    async fn serve(&self, req: Request) -> Result<Response, HandlerError> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await.map_err(HandlerError::failed)?.to_bytes();

        let target = self.target_uri(&parts.uri);
        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let headers = self.forwarded_headers(parts.headers, client_ip);

        let mut builder = hyper::Request::builder()
            .method(parts.method)
            .uri(target.as_str());
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }
        let upstream_req = builder.body(Full::new(body)).map_err(HandlerError::failed)?;

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.client.request(upstream_req)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                tracing::debug!(
                    target = %target,
                    status = response.status().as_u16(),
                    latency_ms,
                    "upstream responded"
                );
                Ok(response.map(Body::new))
            }
            Ok(Err(e)) => {
                tracing::warn!(target = %target, error = %e, latency_ms, "upstream request failed");
                Ok(StatusCode::BAD_GATEWAY.into_response())
            }
            Err(_) => {
                tracing::warn!(target = %target, latency_ms, "upstream request timed out");
                Ok(StatusCode::GATEWAY_TIMEOUT.into_response())
            }
        }
    }
}
