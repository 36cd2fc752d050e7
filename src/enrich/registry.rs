//! Header-pattern rules and the immutable registry that holds them.
//!
//! Rules are appended to a [`RegistryBuilder`] during setup. Calling
//! [`RegistryBuilder::build`] consumes the builder and yields a
//! [`Registry`] with no mutating methods, which the serving path shares
//! behind an `Arc`. No rule can be added once requests are being served.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::HeaderMap;
use regex::Regex;

use super::headers::header_lines;
use super::template;
use crate::config::model::RuleConfig;
use crate::error::ConfigError;

#[derive(Debug)]
pub struct Rule {
    name: String,
    pattern: Regex,
    target: String,
    placeholder: String,
    timeout: Option<Duration>,
}

impl Rule {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Expand the target template against `line`, or `None` when the
    /// pattern does not match it.
    #[must_use]
    pub fn resolve(&self, line: &str) -> Option<String> {
        let captures = self.pattern.captures(line)?;
        let mut url = String::with_capacity(self.target.len() + line.len());
        captures.expand(&self.target, &mut url);
        Some(url)
    }
}

/// A rule that matched one request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub rule: usize,
    pub line: String,
    pub url: String,
}

#[must_use]
pub fn default_placeholder(name: &str) -> String {
    format!("{{{{enrich:{name}}}}}")
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    rules: Vec<Rule>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule with a generated name and placeholder.
    pub fn register(&mut self, pattern: &str, target: &str) -> Result<&mut Self, ConfigError> {
        self.register_rule(RuleConfig::new(pattern, target))
    }

    /// Register a rule whose pattern the caller already compiled.
    pub fn register_regex(&mut self, pattern: Regex, target: &str) -> Result<&mut Self, ConfigError> {
        let name = format!("rule-{}", self.rules.len());
        let placeholder = default_placeholder(&name);
        self.push(name, pattern, target.to_string(), placeholder, None)
    }

    pub fn register_rule(&mut self, config: RuleConfig) -> Result<&mut Self, ConfigError> {
        let name = config
            .name
            .unwrap_or_else(|| format!("rule-{}", self.rules.len()));
        let pattern = Regex::new(&config.pattern).map_err(|source| ConfigError::InvalidPattern {
            rule: name.clone(),
            source,
        })?;
        let placeholder = config
            .placeholder
            .unwrap_or_else(|| default_placeholder(&name));
        let timeout = config.timeout.map(Duration::from_millis);
        self.push(name, pattern, config.target, placeholder, timeout)
    }

    fn push(
        &mut self,
        name: String,
        pattern: Regex,
        target: String,
        placeholder: String,
        timeout: Option<Duration>,
    ) -> Result<&mut Self, ConfigError> {
        if self.rules.iter().any(|r| r.name == name) {
            return Err(ConfigError::DuplicateName(name));
        }
        if placeholder.is_empty() {
            return Err(ConfigError::EmptyPlaceholder { rule: name });
        }
        if let Some(existing) = self.rules.iter().find(|r| r.placeholder == placeholder) {
            return Err(ConfigError::DuplicatePlaceholder {
                rule: name,
                placeholder,
                existing: existing.name.clone(),
            });
        }
        template::check_refs(&pattern, &target)
            .map_err(|message| ConfigError::InvalidTemplate {
                rule: name.clone(),
                message,
            })?;

        self.rules.push(Rule {
            name,
            pattern,
            target,
            placeholder,
            timeout,
        });
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn build(self) -> Registry {
        Registry { rules: self.rules }
    }
}

/// Frozen, read-only rule set.
#[derive(Debug)]
pub struct Registry {
    rules: Vec<Rule>,
}

impl Registry {
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One job per (rule, header) pair whose line the rule's pattern
    /// matches. Non-matching pairs produce nothing.
    #[must_use]
    pub fn jobs(&self, headers: &HeaderMap) -> Vec<FetchJob> {
        if self.rules.is_empty() {
            return Vec::new();
        }
        let lines = header_lines(headers);
        let mut jobs = Vec::new();
        for (rule_idx, rule) in self.rules.iter().enumerate() {
            for line in &lines {
                if let Some(url) = rule.resolve(line) {
                    jobs.push(FetchJob {
                        rule: rule_idx,
                        line: line.clone(),
                        url,
                    });
                }
            }
        }
        jobs
    }

    /// Map each rule that has a job to the first of its jobs.
    #[must_use]
    pub fn first_job_per_rule(jobs: &[FetchJob]) -> HashMap<usize, usize> {
        let mut first = HashMap::new();
        for (job_idx, job) in jobs.iter().enumerate() {
            first.entry(job.rule).or_insert(job_idx);
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut builder = RegistryBuilder::new();
        let err = builder.register("X-User: (", "http://svc/$1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
        assert!(builder.is_empty());
    }

    #[test]
    fn template_with_unknown_group_is_rejected() {
        let mut builder = RegistryBuilder::new();
        let err = builder
            .register("X-User: (.*)", "http://svc/$2")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
    }

    #[test]
    fn generated_names_and_placeholders() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("X-User: (.*)", "http://svc/user/$1")
            .unwrap()
            .register("X-Team: (.*)", "http://svc/team/$1")
            .unwrap();
        let registry = builder.build();
        assert_eq!(registry.rules()[0].name(), "rule-0");
        assert_eq!(registry.rules()[0].placeholder(), "{{enrich:rule-0}}");
        assert_eq!(registry.rules()[1].placeholder(), "{{enrich:rule-1}}");
    }

    #[test]
    fn duplicate_placeholder_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_rule(RuleConfig::new("X-A: (.*)", "http://a/$1").placeholder("TOKEN"))
            .unwrap();
        let err = builder
            .register_rule(RuleConfig::new("X-B: (.*)", "http://b/$1").placeholder("TOKEN"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePlaceholder { .. }));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_rule(RuleConfig::new("X-A: (.*)", "http://a/$1").name("a"))
            .unwrap();
        let err = builder
            .register_rule(RuleConfig::new("X-B: (.*)", "http://b/$1").name("a"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(_)));
    }

    #[test]
    fn matching_header_yields_substituted_url() {
        let mut builder = RegistryBuilder::new();
        builder.register("X-User: (.*)", "http://svc/user/$1").unwrap();
        let registry = builder.build();

        let jobs = registry.jobs(&headers(&[("x-user", "ABC123"), ("accept", "*/*")]));
        assert_eq!(
            jobs,
            vec![FetchJob {
                rule: 0,
                line: "X-User: ABC123".into(),
                url: "http://svc/user/ABC123".into(),
            }]
        );
    }

    #[test]
    fn non_matching_headers_yield_nothing() {
        let mut builder = RegistryBuilder::new();
        builder.register("X-User: (.*)", "http://svc/user/$1").unwrap();
        let registry = builder.build();

        let jobs = registry.jobs(&headers(&[("accept", "*/*"), ("host", "example.com")]));
        assert!(jobs.is_empty());
    }

    #[test]
    fn expansion_drops_unmatched_line_text() {
        let mut builder = RegistryBuilder::new();
        builder.register("User: (\\w+)", "http://svc/$1").unwrap();
        let registry = builder.build();

        let jobs = registry.jobs(&headers(&[("x-user", "bob trailing")]));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].url, "http://svc/bob");
    }

    #[test]
    fn precompiled_pattern_is_accepted() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_regex(Regex::new("X-Id: (?P<id>\\d+)").unwrap(), "http://svc/${id}")
            .unwrap();
        let registry = builder.build();
        let jobs = registry.jobs(&headers(&[("x-id", "42")]));
        assert_eq!(jobs[0].url, "http://svc/42");
    }

    #[test]
    fn rule_matching_several_headers() {
        let mut builder = RegistryBuilder::new();
        builder.register("X-(\\w+)-Id: (.*)", "http://svc/$1/$2").unwrap();
        let registry = builder.build();

        let jobs = registry.jobs(&headers(&[("x-user-id", "1"), ("x-team-id", "2")]));
        assert_eq!(jobs.len(), 2);
        assert_eq!(Registry::first_job_per_rule(&jobs).len(), 1);
        assert!(jobs.iter().any(|j| j.url == "http://svc/User/1"));
        assert!(jobs.iter().any(|j| j.url == "http://svc/Team/2"));
    }
}
