//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors: a bad upstream URL, missing rules, patterns that do not
//! compile, target templates that do not form a URL or refer to missing
//! capture groups, and clashing rule names or placeholders. Returns a
//! list of [`ValidationError`] values with per-field suggestions.

use std::collections::HashMap;

use regex::Regex;
use url::Url;

use super::model::Config;
use crate::enrich::registry::default_placeholder;
use crate::enrich::template;
use crate::error::ValidationError;

/// Validate an absolute `http`/`https` URL. Returns `Ok(())` or a human-readable error.
pub fn validate_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate a target template by standing in for every capture reference.
pub fn validate_target(target: &str) -> Result<(), String> {
    validate_url(&template::fill_with(target, "_p")).map_err(|msg| {
        if msg.contains("is not a valid URL") {
            format!("'{target}' is not a valid URL template")
        } else {
            msg
        }
    })
}

fn missing_scheme_hint(url: &str) -> Option<String> {
    if url.contains("://") || url.is_empty() {
        None
    } else {
        Some(format!("did you mean 'http://{url}'?"))
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(msg) = validate_url(&config.upstream.url) {
        errors.push(ValidationError {
            rule: "(root)".into(),
            field: "upstream.url".into(),
            message: msg,
            suggestion: missing_scheme_hint(&config.upstream.url),
        });
    }

    if config.upstream.timeout == 0 {
        errors.push(ValidationError {
            rule: "(root)".into(),
            field: "upstream.timeout".into(),
            message: "timeout must be greater than zero".into(),
            suggestion: None,
        });
    }

    if config.defaults.fetch_timeout == 0 {
        errors.push(ValidationError {
            rule: "(root)".into(),
            field: "defaults.fetch_timeout".into(),
            message: "timeout must be greater than zero".into(),
            suggestion: None,
        });
    }

    if config.rules.is_empty() {
        errors.push(ValidationError {
            rule: "(root)".into(),
            field: "rules".into(),
            message: "at least one rule must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut seen_names: HashMap<String, usize> = HashMap::new();
    let mut seen_placeholders: HashMap<String, String> = HashMap::new();

    for (i, rule) in config.rules.iter().enumerate() {
        let name = rule.name.clone().unwrap_or_else(|| format!("rule-{i}"));
        let rule_id = rule
            .name
            .clone()
            .unwrap_or_else(|| format!("rules[{i}]"));

        if seen_names.insert(name.clone(), i).is_some() {
            errors.push(ValidationError {
                rule: rule_id.clone(),
                field: "name".into(),
                message: "duplicate rule name".into(),
                suggestion: None,
            });
        }

        match Regex::new(&rule.pattern) {
            Ok(pattern) => {
                if let Err(msg) = template::check_refs(&pattern, &rule.target) {
                    errors.push(ValidationError {
                        rule: rule_id.clone(),
                        field: "target".into(),
                        message: msg,
                        suggestion: Some("use ${1} when a group is followed by letters or digits".into()),
                    });
                }
            }
            Err(e) => {
                let message = e.to_string();
                errors.push(ValidationError {
                    rule: rule_id.clone(),
                    field: "pattern".into(),
                    message: message.lines().last().unwrap_or("invalid regex").trim().to_string(),
                    suggestion: None,
                });
            }
        }

        if let Err(msg) = validate_target(&rule.target) {
            errors.push(ValidationError {
                rule: rule_id.clone(),
                field: "target".into(),
                message: msg,
                suggestion: missing_scheme_hint(&rule.target),
            });
        }

        let placeholder = rule
            .placeholder
            .clone()
            .unwrap_or_else(|| default_placeholder(&name));
        if placeholder.is_empty() {
            errors.push(ValidationError {
                rule: rule_id.clone(),
                field: "placeholder".into(),
                message: "placeholder cannot be empty".into(),
                suggestion: None,
            });
        } else if let Some(existing) = seen_placeholders.get(&placeholder) {
            errors.push(ValidationError {
                rule: rule_id.clone(),
                field: "placeholder".into(),
                message: format!("placeholder already used by rule '{existing}'"),
                suggestion: None,
            });
        } else {
            seen_placeholders.insert(placeholder, name.clone());
        }

        if rule.timeout == Some(0) {
            errors.push(ValidationError {
                rule: rule_id,
                field: "timeout".into(),
                message: "timeout must be greater than zero".into(),
                suggestion: None,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} rules, upstream {}\n",
        config.rules.len(),
        config.upstream.url
    )];

    for (i, rule) in config.rules.iter().enumerate() {
        let name = rule.name.clone().unwrap_or_else(|| format!("rule-{i}"));
        let placeholder = rule
            .placeholder
            .clone()
            .unwrap_or_else(|| default_placeholder(&name));
        let timeout = rule.timeout.map_or_else(
            || format!("{}ms (default)", config.defaults.fetch_timeout),
            |t| format!("{t}ms"),
        );

        lines.push(format!("  {name}  {}  -> {}", rule.pattern, rule.target));
        lines.push(format!("    placeholder: {placeholder}"));
        lines.push(format!("    timeout: {timeout}"));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
