//! `splicegate health`: query a running instance and report on enrichment.
//!
//! Prints the instance's config summary and its enrichment counters as a
//! table. Degraded or failed enrichments are called out on stderr; with
//! `--strict` they make the command exit non-zero so it can gate a deploy or
//! a container health check.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::cli::HealthArgs;
use crate::error::SplicegateError;
use crate::health::{HealthResponse, StatsResponse};
use crate::server::build_http_client;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn execute(args: HealthArgs) -> Result<(), SplicegateError> {
    let base = args.url.trim_end_matches('/');
    let body = get_health(&format!("{base}/health")).await?;

    let health: HealthResponse = match serde_json::from_slice(&body) {
        Ok(health) => health,
        Err(e) => {
            if !args.json {
                eprintln!("Failed to parse health response: {e}");
            }
            println!("{}", String::from_utf8_lossy(&body));
            return Ok(());
        }
    };

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
    } else {
        print!("{}", summary(base, &health));
    }

    match check_counters(&health.stats) {
        Ok(()) => Ok(()),
        Err(problems) if args.strict => Err(problems),
        Err(problems) => {
            eprintln!("warning: {problems}");
            Ok(())
        }
    }
}

async fn get_health(url: &str) -> Result<Bytes, SplicegateError> {
    let uri: hyper::Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        SplicegateError::UriParse {
            source: Box::new(e),
        }
    })?;
    let req = hyper::Request::get(uri)
        .body(Full::new(Bytes::new()))
        .map_err(|e| SplicegateError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(HEALTH_TIMEOUT, build_http_client().request(req))
        .await
        .map_err(|_| SplicegateError::HttpRequest {
            source: format!("no answer from {url} within {}s", HEALTH_TIMEOUT.as_secs()).into(),
        })?
        .map_err(|e| SplicegateError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SplicegateError::HealthCheckFailed(status));
    }
    Ok(response
        .into_body()
        .collect()
        .await
        .map_err(|e| SplicegateError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes())
}

/// `Err` when any enrichment failed or was served without its content.
fn check_counters(stats: &StatsResponse) -> Result<(), SplicegateError> {
    if stats.requests_failed == 0 && stats.requests_degraded == 0 {
        return Ok(());
    }
    Err(SplicegateError::EnrichmentProblems {
        failed: stats.requests_failed,
        degraded: stats.requests_degraded,
    })
}

fn summary(base: &str, health: &HealthResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "splicegate {} at {base}: {} (up {})",
        health.version,
        health.status,
        clock(health.uptime_seconds)
    );
    let _ = writeln!(
        out,
        "config {} from {}, {} rule(s), upstream {}",
        health.config.version, health.config.source, health.config.rules, health.config.upstream
    );
    out.push('\n');
    out.push_str(&counter_table(&health.stats));
    out
}

/// Counters with their share of all served requests.
#[allow(clippy::cast_precision_loss)]
fn counter_table(stats: &StatsResponse) -> String {
    let rows = [
        ("enriched", stats.requests_enriched),
        ("passed through", stats.requests_passed_through),
        ("degraded", stats.requests_degraded),
        ("failed", stats.requests_failed),
    ];

    let mut out = format!("{:<16}{:>10}{:>9}\n", "requests", "count", "share");
    let _ = writeln!(out, "{:<16}{:>10}{:>9}", "served", stats.requests_served, "");
    for (label, count) in rows {
        let share = if stats.requests_served == 0 {
            "-".to_string()
        } else {
            format!("{:.1}%", count as f64 * 100.0 / stats.requests_served as f64)
        };
        let _ = writeln!(out, "{label:<16}{count:>10}{share:>9}");
    }
    out
}

/// `d.hh:mm:ss`, days omitted when zero.
fn clock(seconds: u64) -> String {
    let (days, rest) = (seconds / 86_400, seconds % 86_400);
    let hms = format!("{:02}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    if days > 0 {
        format!("{days}.{hms}")
    } else {
        hms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(served: u64, enriched: u64, passed: u64, degraded: u64, failed: u64) -> StatsResponse {
        StatsResponse {
            requests_served: served,
            requests_enriched: enriched,
            requests_passed_through: passed,
            requests_degraded: degraded,
            requests_failed: failed,
        }
    }

    #[test]
    fn clean_counters_pass() {
        assert!(check_counters(&stats(10, 6, 4, 0, 0)).is_ok());
        assert!(check_counters(&stats(0, 0, 0, 0, 0)).is_ok());
    }

    #[test]
    fn degraded_or_failed_counters_are_reported() {
        let err = check_counters(&stats(10, 6, 1, 2, 1)).unwrap_err();
        assert!(matches!(
            err,
            SplicegateError::EnrichmentProblems {
                failed: 1,
                degraded: 2
            }
        ));
        assert!(check_counters(&stats(3, 2, 0, 1, 0)).is_err());
    }

    #[test]
    fn table_lists_every_counter_with_share() {
        let table = counter_table(&stats(8, 4, 2, 1, 1));
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("requests"));
        assert!(lines[1].starts_with("served") && lines[1].contains('8'));
        assert!(lines[2].starts_with("enriched") && lines[2].ends_with("50.0%"));
        assert!(lines[3].starts_with("passed through") && lines[3].ends_with("25.0%"));
        assert!(lines[4].starts_with("degraded") && lines[4].ends_with("12.5%"));
        assert!(lines[5].starts_with("failed") && lines[5].ends_with("12.5%"));
    }

    #[test]
    fn table_without_traffic_has_no_shares() {
        let table = counter_table(&stats(0, 0, 0, 0, 0));
        assert!(table.lines().skip(2).all(|line| line.trim_end().ends_with('-')));
    }

    #[test]
    fn clock_formats() {
        assert_eq!(clock(42), "00:00:42");
        assert_eq!(clock(3_725), "01:02:05");
        assert_eq!(clock(90_061), "1.01:01:01");
    }
}
