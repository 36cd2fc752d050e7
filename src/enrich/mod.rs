//! Header-driven response enrichment.
//!
//! An [`Enricher`] wraps a downstream [`RequestHandler`]. For each request
//! it matches every registered rule against every request header, fetches
//! the resulting URLs concurrently with the downstream call, and splices
//! the fetched content into the downstream body. Submodules hold the rule
//! registry ([`registry`]), the fork-join orchestration ([`fanout`]), the
//! body splicer ([`splice`]), and the collaborator capabilities
//! ([`fetch`], [`handler`]).
//!
//! ```no_run
//! use splicegate::enrich::{handler_fn, Enricher};
//!
//! # fn demo() -> Result<(), splicegate::error::ConfigError> {
//! let enricher = Enricher::builder()
//!     .register("X-User: (.*)", "http://users/user/$1")?
//!     .downstream(handler_fn(|_req| async { r#"{"user": "{{enrich:rule-0}}"}"# }))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod fanout;
pub mod fetch;
pub mod handler;
pub mod headers;
pub mod registry;
pub mod splice;
pub mod template;

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};

use crate::config::model::RuleConfig;
use crate::error::{ConfigError, HandlerError};

pub use fetch::{Fetcher, HttpFetcher};
pub use handler::{handler_fn, BoxedHandler, RequestHandler, ServiceHandler};
pub use registry::{Registry, RegistryBuilder, Rule};

use fanout::{FanOutRequest, FanOutResult};
use splice::Splicer;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug)]
pub struct Stats {
    pub served: AtomicU64,
    pub enriched: AtomicU64,
    pub passthrough: AtomicU64,
    pub degraded: AtomicU64,
    pub failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            served: AtomicU64::new(0),
            enriched: AtomicU64::new(0),
            passthrough: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

pub struct EnricherBuilder {
    rules: RegistryBuilder,
    downstream: Option<BoxedHandler>,
    fetcher: Option<Arc<dyn Fetcher>>,
    fetch_timeout: Duration,
}

impl Default for EnricherBuilder {
    fn default() -> Self {
        Self {
            rules: RegistryBuilder::new(),
            downstream: None,
            fetcher: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl EnricherBuilder {
    pub fn register(mut self, pattern: &str, target: &str) -> Result<Self, ConfigError> {
        self.rules.register(pattern, target)?;
        Ok(self)
    }

    pub fn register_rule(mut self, rule: RuleConfig) -> Result<Self, ConfigError> {
        self.rules.register_rule(rule)?;
        Ok(self)
    }

    /// Replace the rules registered so far with `rules`.
    #[must_use]
    pub fn rules(mut self, rules: RegistryBuilder) -> Self {
        self.rules = rules;
        self
    }

    /// Set the wrapped handler. The last call wins.
    #[must_use]
    pub fn downstream<H: RequestHandler + 'static>(mut self, handler: H) -> Self {
        self.downstream = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn fetcher<F: Fetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Timeout for rules that do not set their own.
    #[must_use]
    pub const fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Freeze the rules and produce a servable enricher.
    ///
    /// Without an explicit [`fetcher`](Self::fetcher), fetches go through a
    /// fresh pooled client from [`build_http_client`](crate::server::build_http_client).
    pub fn build(self) -> Result<Enricher, ConfigError> {
        let downstream = self.downstream.ok_or(ConfigError::MissingHandler)?;
        let fetcher = self.fetcher.unwrap_or_else(|| {
            Arc::new(HttpFetcher::new(crate::server::build_http_client())) as Arc<dyn Fetcher>
        });
        let registry = self.rules.build();
        let splicer = Splicer::new(&registry)?;

        Ok(Enricher {
            inner: Arc::new(Inner {
                registry,
                splicer,
                downstream,
                fetcher,
                fetch_timeout: self.fetch_timeout,
                stats: Stats::new(),
            }),
        })
    }
}

struct Inner {
    registry: Registry,
    splicer: Splicer,
    downstream: BoxedHandler,
    fetcher: Arc<dyn Fetcher>,
    fetch_timeout: Duration,
    stats: Stats,
}

/// Cheap to clone; clones share rules, client, and stats.
#[derive(Clone)]
pub struct Enricher {
    inner: Arc<Inner>,
}

impl Enricher {
    #[must_use]
    pub fn builder() -> EnricherBuilder {
        EnricherBuilder::default()
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    /// Serve one request. Never fails: fetch and downstream errors become
    /// 5xx responses, splice errors fall back to the unmodified response.
    pub async fn handle(&self, request: Request) -> Response {
        let inner = &self.inner;
        inner.stats.served.fetch_add(1, Ordering::Relaxed);

        let correlation_id = request
            .headers()
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let jobs = inner.registry.jobs(request.headers());
        tracing::info!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            fetches = jobs.len(),
            "request received"
        );

        let fan_out = FanOutRequest {
            registry: &inner.registry,
            fetcher: &inner.fetcher,
            downstream: &inner.downstream,
            jobs: &jobs,
            default_timeout: inner.fetch_timeout,
            correlation_id: &correlation_id,
        };

        let FanOutResult { captured, results } = match fanout::fan_out(fan_out, request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "enrichment failed"
                );
                inner.stats.failed.fetch_add(1, Ordering::Relaxed);
                return e.status().into_response();
            }
        };

        if jobs.is_empty() {
            inner.stats.passthrough.fetch_add(1, Ordering::Relaxed);
            return captured.into_response();
        }

        let spliced = captured
            .ensure_identity()
            .and_then(|()| inner.splicer.select_contents(&jobs, results))
            .and_then(|contents| inner.splicer.splice(&captured.body, &contents));

        match spliced {
            Ok(body) => {
                inner.stats.enriched.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    correlation_id = %correlation_id,
                    status = captured.status.as_u16(),
                    bytes = body.len(),
                    "response enriched"
                );
                captured.with_body(body)
            }
            Err(e) => {
                inner.stats.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "splice failed, returning downstream response unmodified"
                );
                captured.degraded(&e)
            }
        }
    }
}

#[async_trait]
impl RequestHandler for Enricher {
    async fn serve(&self, req: Request) -> Result<Response, HandlerError> {
        Ok(self.handle(req).await)
    }
}

impl tower::Service<Request> for Enricher {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let enricher = self.clone();
        Box::pin(async move { Ok(enricher.handle(req).await) })
    }
}
