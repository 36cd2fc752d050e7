//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every `run` flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "splicegate",
    version,
    about = "Header-driven response enrichment proxy",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        splicegate run                      Start with ./splicegate.yaml\n  \
        splicegate run -c rules.yaml        Start with a specific config\n  \
        splicegate validate rules.yaml      Check a config without starting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the enrichment proxy
    Run(Box<RunArgs>),

    /// Validate a config file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        splicegate run                                      Auto-detect config\n  \
        splicegate run -c rules.yaml -p 8080 --pretty       Local dev mode\n  \
        splicegate run --upstream http://app:8080           Override the upstream")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Upstream URL (overrides `upstream.url` in the config)
    #[arg(short, long, env = "UPSTREAM_URL")]
    pub upstream: Option<String>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Default enrichment fetch timeout in milliseconds (overrides `defaults.fetch_timeout`)
    #[arg(long, env = "FETCH_TIMEOUT_MS", help_heading = "Tuning")]
    pub fetch_timeout: Option<u64>,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "splicegate.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit non-zero when the instance reports degraded or failed enrichments
    #[arg(long)]
    pub strict: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["splicegate", "run"]).unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.port, 3000);
        assert_eq!(args.max_body, 1_048_576);
        assert!(args.fetch_timeout.is_none());
    }

    #[test]
    fn pretty_conflicts_with_json() {
        assert!(Cli::try_parse_from(["splicegate", "run", "--pretty", "--json"]).is_err());
    }

    #[test]
    fn validate_defaults_to_yaml_file() {
        let cli = Cli::try_parse_from(["splicegate", "validate"]).unwrap();
        let Some(Commands::Validate(args)) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.config, PathBuf::from("splicegate.yaml"));
    }

    #[test]
    fn health_takes_url_and_strict() {
        let cli =
            Cli::try_parse_from(["splicegate", "health", "http://edge:8080", "--strict"]).unwrap();
        let Some(Commands::Health(args)) = cli.command else {
            panic!("expected health");
        };
        assert_eq!(args.url, "http://edge:8080");
        assert!(args.strict);
        assert!(!args.json);
    }
}
