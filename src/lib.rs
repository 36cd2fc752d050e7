//! Splicegate is a header-driven response enrichment proxy.
//!
//! Each incoming request's headers are matched against a registry of
//! regex rules. Every match yields a URL that is fetched concurrently with
//! the downstream handler; the fetched bodies are then spliced into the
//! downstream response in place of per-rule placeholder tokens.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Configuration file loading and validation.
//! - [`enrich`] -- The enricher: rule registry, concurrent fan-out, and
//!   body splicing, usable as a library around any [`enrich::RequestHandler`].
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//! - [`upstream`] -- The forwarding handler the binary wraps.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod enrich;
pub mod error;
pub mod health;
pub mod logging;
pub mod server;
pub mod upstream;
