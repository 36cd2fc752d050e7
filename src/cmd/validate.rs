//! `splicegate validate`: check a configuration file for errors.
//!
//! Parses and validates the config file, reporting results in either
//! human-readable text or machine-readable JSON format. Rules that pass
//! validation are also registered against a throwaway registry so the
//! placeholder checks match what `run` would do.

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::validation;
use crate::config::{parse_config_str, registry_from};
use crate::enrich::splice::Splicer;
use crate::error::SplicegateError;

pub async fn execute(args: &ValidateArgs) -> Result<(), SplicegateError> {
    let path = &args.config;

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SplicegateError::ConfigFileNotFound { path: path.clone() }
        } else {
            SplicegateError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = parse_config_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validation::validate(&config) {
        match args.format {
            ValidateFormat::Text => {
                eprintln!("\u{2717} {} has {} errors\n", path.display(), errors.len());
                for error in &errors {
                    eprintln!("{error}");
                }
            }
            ValidateFormat::Json => {
                let json_errors: Vec<serde_json::Value> = errors
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "rule": e.rule,
                            "field": e.field,
                            "message": e.message,
                            "suggestion": e.suggestion,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "valid": false,
                        "errors": json_errors,
                    })
                );
            }
        }
        return Err(SplicegateError::ConfigValidation { errors });
    }

    let registry = registry_from(&config)?.build();
    Splicer::new(&registry)?;

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path.display().to_string(), &config)
            );
        }
        ValidateFormat::Json => {
            let placeholders: Vec<&str> =
                registry.rules().iter().map(|r| r.placeholder()).collect();
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "rules": registry.len(),
                    "upstream": config.upstream.url,
                    "placeholders": placeholders,
                })
            );
        }
    }

    Ok(())
}
