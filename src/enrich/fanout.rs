//! Concurrent fan-out of one request: enrichment fetches plus the
//! downstream handler.
//!
//! Every matching (rule, header) pair gets its own task on a
//! [`JoinSet`], each bounded by its rule's timeout. The downstream handler
//! runs in a separately spawned task that is aborted when dropped. Both
//! sides are joined with `try_join!`: the first failure drops the other
//! side, which aborts every sibling still in flight, and the request fails
//! instead of the process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use bytes::Bytes;
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;
use url::Url;

use super::fetch::Fetcher;
use super::handler::BoxedHandler;
use super::registry::{FetchJob, Registry};
use super::splice::CapturedResponse;
use crate::error::{EnrichError, FetchError, HandlerError};

pub struct FanOutRequest<'a> {
    pub registry: &'a Registry,
    pub fetcher: &'a Arc<dyn Fetcher>,
    pub downstream: &'a BoxedHandler,
    pub jobs: &'a [FetchJob],
    pub default_timeout: Duration,
    pub correlation_id: &'a str,
}

#[derive(Debug)]
pub struct FanOutResult {
    pub captured: CapturedResponse,
    /// One slot per job, in job order.
    pub results: Vec<Option<Bytes>>,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub async fn fan_out(req: FanOutRequest<'_>, request: Request) -> Result<FanOutResult, EnrichError> {
    let mut fetches = JoinSet::new();

    for (idx, job) in req.jobs.iter().enumerate() {
        let rule = &req.registry.rules()[job.rule];
        let timeout = rule.timeout().unwrap_or(req.default_timeout);
        let fetcher = Arc::clone(req.fetcher);
        let url = job.url.clone();
        let span = tracing::info_span!(
            "enrich_fetch",
            correlation_id = %req.correlation_id,
            rule = %rule.name(),
            url = %job.url
        );

        fetches.spawn(
            async move { (idx, fetch_one(fetcher.as_ref(), &url, timeout).await) }.instrument(span),
        );
    }

    let downstream = Arc::clone(req.downstream);
    let span = tracing::info_span!("downstream", correlation_id = %req.correlation_id);
    let handle = tokio::spawn(
        async move {
            let response = downstream.serve(request).await?;
            CapturedResponse::capture(response).await
        }
        .instrument(span),
    );

    let (captured, results) = tokio::try_join!(
        join_downstream(AbortOnDrop(handle)),
        join_fetches(fetches, req.jobs.len())
    )?;

    Ok(FanOutResult { captured, results })
}

#[allow(clippy::cast_possible_truncation)]
async fn fetch_one(fetcher: &dyn Fetcher, url: &str, timeout: Duration) -> Result<Bytes, FetchError> {
    let target = parse_target(url)?;
    let start = Instant::now();

    let result = match tokio::time::timeout(timeout, fetcher.fetch(&target)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    };
    let latency_ms = start.elapsed().as_millis() as u64;

    match &result {
        Ok(body) => tracing::debug!(latency_ms, bytes = body.len(), "enrichment fetched"),
        Err(e) => tracing::warn!(latency_ms, error = %e, "enrichment fetch failed"),
    }
    result
}

/// Parse an expanded template; only absolute `http`/`https` URLs are fetched.
pub fn parse_target(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

async fn join_downstream(
    mut task: AbortOnDrop<Result<CapturedResponse, HandlerError>>,
) -> Result<CapturedResponse, EnrichError> {
    match (&mut task.0).await {
        Ok(result) => Ok(result?),
        Err(e) if e.is_panic() => Err(HandlerError::Panicked.into()),
        Err(_) => Err(HandlerError::Cancelled.into()),
    }
}

async fn join_fetches(
    mut tasks: JoinSet<(usize, Result<Bytes, FetchError>)>,
    count: usize,
) -> Result<Vec<Option<Bytes>>, EnrichError> {
    let mut slots = vec![None; count];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, Ok(body))) => slots[idx] = Some(body),
            // Returning drops the set, which aborts the remaining fetches.
            Ok((_, Err(e))) => return Err(e.into()),
            Err(e) => return Err(FetchError::TaskFailed(e.to_string()).into()),
        }
    }
    Ok(slots)
}
