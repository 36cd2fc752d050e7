//! Unified error types for Splicegate.
//!
//! The enrichment core reports four families of failure: [`ConfigError`]
//! while rules are registered, [`FetchError`] and [`HandlerError`] while a
//! request is in flight (joined as [`EnrichError`]), and [`SpliceError`]
//! when the downstream body cannot take the fetched content. The binary
//! wraps everything in [`SplicegateError`], and config files report
//! per-field [`ValidationError`] values with contextual hints.

use std::path::PathBuf;

use axum::http::StatusCode;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub rule: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  rule {}: {}: {}", self.rule, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

/// Raised while rules and the downstream handler are being registered.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("rule '{rule}': invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule}': invalid target template: {message}")]
    InvalidTemplate { rule: String, message: String },

    #[error("rule '{rule}': placeholder cannot be empty")]
    EmptyPlaceholder { rule: String },

    #[error("rule '{rule}': placeholder '{placeholder}' is already used by rule '{existing}'")]
    DuplicatePlaceholder {
        rule: String,
        placeholder: String,
        existing: String,
    },

    #[error("duplicate rule name '{0}'")]
    DuplicateName(String),

    #[error("no downstream handler configured")]
    MissingHandler,
}

/// Transport-level failure of a single enrichment fetch.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("'{url}' is not a valid enrichment URL: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("reading body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

/// Failure of the wrapped downstream handler.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandlerError {
    #[error("downstream handler failed: {source}")]
    Failed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("reading downstream response body failed: {source}")]
    Body {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("downstream handler panicked")]
    Panicked,

    #[error("downstream handler was cancelled")]
    Cancelled,
}

impl HandlerError {
    pub fn failed(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed {
            source: source.into(),
        }
    }
}

/// The downstream body could not take the fetched content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpliceError {
    #[error("placeholder '{placeholder}' for rule '{rule}' not found in downstream body")]
    PlaceholderMissing { rule: String, placeholder: String },

    #[error("no enrichment result recorded for rule '{rule}'")]
    MissingResult { rule: String },

    #[error("downstream body is encoded with '{encoding}' and cannot be spliced")]
    EncodedBody { encoding: String },
}

/// The first fatal error of a request's fan-out.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl EnrichError {
    /// Status code the client receives when the request fails with this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Fetch(FetchError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SplicegateError {
    #[error("No config file found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("instance reports enrichment problems: {failed} failed, {degraded} degraded")]
    EnrichmentProblems { failed: u64, degraded: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = EnrichError::from(FetchError::Timeout {
            url: "http://svc/user/1".into(),
            timeout_ms: 100,
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn transport_failure_maps_to_bad_gateway() {
        let err = EnrichError::from(FetchError::TaskFailed("boom".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn handler_failure_maps_to_internal_error() {
        let err = EnrichError::from(HandlerError::Panicked);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_errors_render_with_suggestion() {
        let err = SplicegateError::ConfigValidation {
            errors: vec![ValidationError {
                rule: "user".into(),
                field: "target".into(),
                message: "'svc/user' is not a valid URL".into(),
                suggestion: Some("did you mean 'http://svc/user'?".into()),
            }],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("rule user: target"));
        assert!(rendered.contains("did you mean 'http://svc/user'?"));
    }
}
