//! `splicegate run`: start the enrichment proxy.
//!
//! Loads and validates the config file, applies CLI overrides, builds the
//! enricher in front of a [`ForwardHandler`] for the configured upstream,
//! and serves it with Axum until SIGTERM / Ctrl+C.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use url::Url;

use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::validation::validate_url;
use crate::config::{self, registry_from};
use crate::enrich::{Enricher, HttpFetcher};
use crate::error::{SplicegateError, ValidationError};
use crate::logging;
use crate::server::{self, AppState, LoadedConfig};
use crate::upstream::ForwardHandler;

pub async fn execute(args: RunArgs) -> Result<(), SplicegateError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let path = resolve_config_path(args.config.as_deref()).await?;
    let (mut config, version) = config::load(&path).await?;
    apply_overrides(&mut config, &args)?;

    let origin = Url::parse(&config.upstream.url).map_err(|e| SplicegateError::UriParse {
        source: Box::new(e),
    })?;

    let client = server::build_http_client();
    let enricher = Enricher::builder()
        .rules(registry_from(&config)?)
        .fetch_timeout(Duration::from_millis(config.defaults.fetch_timeout))
        .fetcher(HttpFetcher::new(client.clone()))
        .downstream(ForwardHandler::new(
            client,
            origin,
            Duration::from_millis(config.upstream.timeout),
        ))
        .build()?;

    let rule_count = enricher.registry().len();
    let state = Arc::new(AppState {
        config: LoadedConfig {
            version,
            source_name: path.display().to_string(),
            upstream: config.upstream.url.clone(),
            loaded_at: Instant::now(),
        },
        enricher,
        start_time: Instant::now(),
    });

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        rules = rule_count,
        upstream = %config.upstream.url,
        fetch_timeout_ms = config.defaults.fetch_timeout,
        "splicegate started"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    tracing::info!("splicegate stopped");
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<(), SplicegateError> {
    if let Some(ref url) = args.upstream {
        if let Err(message) = validate_url(url) {
            return Err(SplicegateError::ConfigValidation {
                errors: vec![ValidationError {
                    rule: "(cli)".into(),
                    field: "--upstream".into(),
                    message,
                    suggestion: None,
                }],
            });
        }
        config.upstream.url.clone_from(url);
    }

    if let Some(timeout) = args.fetch_timeout {
        if timeout == 0 {
            return Err(SplicegateError::ConfigValidation {
                errors: vec![ValidationError {
                    rule: "(cli)".into(),
                    field: "--fetch-timeout".into(),
                    message: "timeout must be greater than zero".into(),
                    suggestion: None,
                }],
            });
        }
        config.defaults.fetch_timeout = timeout;
    }

    Ok(())
}

async fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, SplicegateError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let candidates = [
        "splicegate.yaml",
        "splicegate.yml",
        "splicegate.json",
        "splicegate.toml",
    ];

    for name in &candidates {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return Ok(path);
        }
    }

    Err(SplicegateError::NoConfigSource {
        hint: "Provide --config <file> or create ./splicegate.yaml.".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::config::model::{Defaults, RuleConfig, Upstream};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["splicegate", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Some(Commands::Run(args)) => *args,
            _ => panic!("expected run"),
        }
    }

    fn config() -> Config {
        Config {
            upstream: Upstream {
                url: "http://app:8080".into(),
                timeout: 30_000,
            },
            defaults: Defaults::default(),
            rules: vec![RuleConfig::new("X-User: (.*)", "http://users/$1")],
        }
    }

    #[test]
    fn cli_overrides_upstream_and_timeout() {
        let mut config = config();
        let args = run_args(&["--upstream", "http://other:9000", "--fetch-timeout", "250"]);
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.upstream.url, "http://other:9000");
        assert_eq!(config.defaults.fetch_timeout, 250);
    }

    #[test]
    fn invalid_upstream_override_is_rejected() {
        let mut config = config();
        let args = run_args(&["--upstream", "ftp://other"]);
        let err = apply_overrides(&mut config, &args).unwrap_err();
        assert!(matches!(err, SplicegateError::ConfigValidation { .. }));
        assert_eq!(config.upstream.url, "http://app:8080");
    }

    #[tokio::test]
    async fn explicit_path_is_used_as_is() {
        let path = resolve_config_path(Some(Path::new("custom.toml")))
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("custom.toml"));
    }
}
