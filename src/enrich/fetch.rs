//! Outbound enrichment fetches.
//!
//! [`Fetcher`] is the capability the orchestrator consumes; tests plug in
//! stubs. [`HttpFetcher`] issues a plain `GET` through the shared,
//! connection-pooled hyper client and returns the collected body.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use url::Url;

use crate::error::FetchError;
use crate::server::HttpClient;

// async_trait is required here because fetchers are shared as Arc<dyn Fetcher>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    #[must_use]
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        let req = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(url.as_str())
            .header(hyper::header::USER_AGENT, concat!("splicegate/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(Bytes::new()))
            .map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Body {
                url: url.to_string(),
                source: Box::new(e),
            })?;
        Ok(collected.to_bytes())
    }
}
