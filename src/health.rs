//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config metadata, the number of loaded rules, and
//! cumulative enrichment statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub upstream: String,
    pub rules: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_served: u64,
    pub requests_enriched: u64,
    pub requests_passed_through: u64,
    pub requests_degraded: u64,
    pub requests_failed: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let loaded = &state.config;
    let stats = state.enricher.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: loaded.source_name.clone(),
            version: loaded.version.short().to_string(),
            loaded_ago_seconds: loaded.loaded_at.elapsed().as_secs(),
            upstream: loaded.upstream.clone(),
            rules: state.enricher.registry().len(),
        },
        stats: StatsResponse {
            requests_served: stats.served.load(Ordering::Relaxed),
            requests_enriched: stats.enriched.load(Ordering::Relaxed),
            requests_passed_through: stats.passthrough.load(Ordering::Relaxed),
            requests_degraded: stats.degraded.load(Ordering::Relaxed),
            requests_failed: stats.failed.load(Ordering::Relaxed),
        },
    })
}
