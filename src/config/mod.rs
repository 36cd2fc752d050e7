//! Configuration loading and validation.
//!
//! Config files are YAML, JSON, or TOML depending on the enabled
//! features, selected by file extension. [`load`] reads a file through
//! Tokio, validates it, and tags it with a SHA-256 [`ConfigVersion`] that
//! `/health` reports. [`registry_from`] turns the validated rules into a
//! [`RegistryBuilder`] for the enricher.

pub mod model;
pub mod validation;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::enrich::RegistryBuilder;
use crate::error::{ConfigError, SplicegateError};
use model::Config;
use validation::validate;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    /// First eight hex digits, for display.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, SplicegateError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| SplicegateError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| SplicegateError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| SplicegateError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(SplicegateError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Read, parse, and validate a config file.
pub async fn load(path: &Path) -> Result<(Config, ConfigVersion), SplicegateError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SplicegateError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            SplicegateError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = parse_config_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validate(&config) {
        return Err(SplicegateError::ConfigValidation { errors });
    }

    let hash = sha256_hex(content.as_bytes());
    Ok((config, ConfigVersion::Hash(hash)))
}

/// Register every configured rule, in file order.
pub fn registry_from(config: &Config) -> Result<RegistryBuilder, ConfigError> {
    let mut rules = RegistryBuilder::new();
    for rule in &config.rules {
        rules.register_rule(rule.clone())?;
    }
    Ok(rules)
}
