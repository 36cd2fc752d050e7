//! Serde data structures for the Splicegate configuration file.
//!
//! Contains [`Config`] (the root), [`Upstream`], [`Defaults`], and
//! [`RuleConfig`]. All types derive `Serialize` and `Deserialize` with
//! `deny_unknown_fields` for strict parsing.

use serde::{Deserialize, Serialize};

const fn default_timeout() -> u64 {
    5000
}

const fn default_upstream_timeout() -> u64 {
    30_000
}

fn is_default_timeout(v: &u64) -> bool {
    *v == default_timeout()
}

fn is_default_upstream_timeout(v: &u64) -> bool {
    *v == default_upstream_timeout()
}

fn is_default_defaults(v: &Defaults) -> bool {
    v.fetch_timeout == default_timeout()
}

/// Root of a config file:
///
/// ```yaml
/// upstream:
///   url: http://app:8080
/// rules:
///   - name: user
///     pattern: "X-User: (.*)"
///     target: "http://users/user/$1"
///     placeholder: '"PLACEHOLDER"'
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub upstream: Upstream,

    #[serde(default, skip_serializing_if = "is_default_defaults")]
    pub defaults: Defaults,

    pub rules: Vec<RuleConfig>,
}

/// The origin whose responses are enriched.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Upstream {
    pub url: String,

    #[serde(
        default = "default_upstream_timeout",
        skip_serializing_if = "is_default_upstream_timeout"
    )]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Fetch timeout in milliseconds for rules without their own.
    #[serde(
        default = "default_timeout",
        skip_serializing_if = "is_default_timeout"
    )]
    pub fetch_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            fetch_timeout: default_timeout(),
        }
    }
}

/// A header pattern and the enrichment it triggers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Regex applied to `"<Header-Name>: <value>"` lines.
    pub pattern: String,

    /// Target URL with `$1` / `${name}` capture references.
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl RuleConfig {
    #[must_use]
    pub fn new(pattern: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }
}
