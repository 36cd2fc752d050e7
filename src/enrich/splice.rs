//! Capturing the downstream response and splicing enrichment into it.
//!
//! [`CapturedResponse`] buffers the downstream status, headers, and body
//! without touching the client connection. [`Splicer`] replaces each
//! matched rule's placeholder with that rule's fetched content in a single
//! left-to-right pass: placeholders are compiled into one alternation,
//! longest first, and inserted content is never re-scanned, so one rule's
//! content cannot be mistaken for another rule's placeholder.

use std::collections::{BTreeMap, HashMap, HashSet};

use axum::body::Body;
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use http_body_util::BodyExt;
use regex::bytes::{Captures, Regex};

use super::headers::strip_response_hop_by_hop;
use super::registry::{FetchJob, Registry};
use crate::error::{ConfigError, HandlerError, SpliceError};

pub const DIAGNOSTIC_HEADER: &str = "x-splicegate-diagnostic";

#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    /// Drain a downstream response into memory.
    pub async fn capture(response: Response) -> Result<Self, HandlerError> {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| HandlerError::Body {
                source: Box::new(e),
            })?
            .to_bytes();
        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    /// Replay the captured response unchanged.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Fails when the body carries a `Content-Encoding` other than
    /// `identity`; placeholders are never searched for in encoded bytes.
    pub fn ensure_identity(&self) -> Result<(), SpliceError> {
        match self.headers.get(CONTENT_ENCODING) {
            None => Ok(()),
            Some(value) => {
                let encoding = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
                if encoding.is_empty() || encoding.eq_ignore_ascii_case("identity") {
                    Ok(())
                } else {
                    Err(SpliceError::EncodedBody { encoding })
                }
            }
        }
    }

    /// Replay with a new body; `Content-Length` is recomputed from it.
    #[must_use]
    pub fn with_body(self, body: Bytes) -> Response {
        let mut headers = self.headers;
        strip_response_hop_by_hop(&mut headers);
        headers.insert(hyper::header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }

    /// Replay unchanged, with a diagnostic header describing why the
    /// enrichment was not applied.
    #[must_use]
    pub fn degraded(self, error: &SpliceError) -> Response {
        let mut response = self.into_response();
        if let Ok(value) = HeaderValue::from_str(&error.to_string()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(DIAGNOSTIC_HEADER), value);
        }
        response
    }
}

#[derive(Debug)]
pub struct Splicer {
    matcher: Option<Regex>,
    tokens: HashMap<Vec<u8>, usize>,
    names: Vec<String>,
    placeholders: Vec<String>,
}

impl Splicer {
    pub fn new(registry: &Registry) -> Result<Self, ConfigError> {
        let rules = registry.rules();
        let names = rules.iter().map(|r| r.name().to_string()).collect();
        let placeholders: Vec<String> = rules.iter().map(|r| r.placeholder().to_string()).collect();
        let tokens = placeholders
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.as_bytes().to_vec(), idx))
            .collect();

        // Longest first so a placeholder that prefixes another cannot shadow it.
        let mut sorted: Vec<&str> = placeholders.iter().map(String::as_str).collect();
        sorted.sort_by_key(|p| std::cmp::Reverse(p.len()));

        let matcher = if sorted.is_empty() {
            None
        } else {
            let alternation = sorted
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                Regex::new(&alternation).map_err(|e| ConfigError::InvalidPattern {
                    rule: "(placeholders)".into(),
                    source: e,
                })?,
            )
        };

        Ok(Self {
            matcher,
            tokens,
            names,
            placeholders,
        })
    }

    /// Pick the content each matched rule splices: the result of its first
    /// job in header order.
    pub fn select_contents(
        &self,
        jobs: &[FetchJob],
        mut results: Vec<Option<Bytes>>,
    ) -> Result<BTreeMap<usize, Bytes>, SpliceError> {
        let mut contents = BTreeMap::new();
        for (rule, job_idx) in Registry::first_job_per_rule(jobs) {
            let content = results
                .get_mut(job_idx)
                .and_then(Option::take)
                .ok_or_else(|| SpliceError::MissingResult {
                    rule: self.names[rule].clone(),
                })?;
            contents.insert(rule, content);
        }
        Ok(contents)
    }

    /// Replace every occurrence of each rule's placeholder in `body` with
    /// its content. Fails without producing a body when a rule with content
    /// has no placeholder to land in.
    pub fn splice(&self, body: &[u8], contents: &BTreeMap<usize, Bytes>) -> Result<Bytes, SpliceError> {
        if contents.is_empty() {
            return Ok(Bytes::copy_from_slice(body));
        }

        let mut seen = HashSet::new();
        let spliced = match &self.matcher {
            Some(matcher) => matcher.replace_all(body, |caps: &Captures<'_>| {
                let token = &caps[0];
                match self.tokens.get(token).and_then(|rule| contents.get(rule).map(|c| (rule, c))) {
                    Some((rule, content)) => {
                        seen.insert(*rule);
                        content.clone()
                    }
                    None => Bytes::copy_from_slice(token),
                }
            }),
            None => std::borrow::Cow::Borrowed(body),
        };

        if let Some(&rule) = contents.keys().find(|rule| !seen.contains(*rule)) {
            return Err(SpliceError::PlaceholderMissing {
                rule: self.names[rule].clone(),
                placeholder: self.placeholders[rule].clone(),
            });
        }

        Ok(Bytes::from(spliced.into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RuleConfig;
    use crate::enrich::registry::RegistryBuilder;

    fn splicer(placeholders: &[&str]) -> Splicer {
        let mut builder = RegistryBuilder::new();
        for (i, p) in placeholders.iter().enumerate() {
            builder
                .register_rule(
                    RuleConfig::new(format!("X-H{i}: (.*)"), "http://svc/$1").placeholder(*p),
                )
                .unwrap();
        }
        Splicer::new(&builder.build()).unwrap()
    }

    fn contents(pairs: &[(usize, &'static str)]) -> BTreeMap<usize, Bytes> {
        pairs
            .iter()
            .map(|(rule, c)| (*rule, Bytes::from_static(c.as_bytes())))
            .collect()
    }

    #[test]
    fn replaces_placeholder() {
        let s = splicer(&["\"PLACEHOLDER\""]);
        let out = s
            .splice(br#"{"user": "PLACEHOLDER"}"#, &contents(&[(0, r#"{"name":"Ben"}"#)]))
            .unwrap();
        assert_eq!(&out[..], br#"{"user": {"name":"Ben"}}"#);
    }

    #[test]
    fn replaces_every_occurrence() {
        let s = splicer(&["%%U%%"]);
        let out = s.splice(b"a %%U%% b %%U%%", &contents(&[(0, "x")])).unwrap();
        assert_eq!(&out[..], b"a x b x");
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let s = splicer(&["%%U%%"]);
        let err = s.splice(b"no token here", &contents(&[(0, "x")])).unwrap_err();
        assert_eq!(
            err,
            SpliceError::PlaceholderMissing {
                rule: "rule-0".into(),
                placeholder: "%%U%%".into(),
            }
        );
    }

    #[test]
    fn unmatched_rule_placeholder_is_left_alone() {
        let s = splicer(&["%%A%%", "%%B%%"]);
        let out = s.splice(b"%%A%% %%B%%", &contents(&[(1, "b")])).unwrap();
        assert_eq!(&out[..], b"%%A%% b");
    }

    #[test]
    fn inserted_content_is_not_rescanned() {
        let s = splicer(&["%%A%%", "%%B%%"]);
        let out = s
            .splice(b"[%%A%%][%%B%%]", &contents(&[(0, "%%B%%"), (1, "b")]))
            .unwrap();
        assert_eq!(&out[..], b"[%%B%%][b]");
    }

    #[test]
    fn longer_placeholder_wins_over_prefix() {
        let s = splicer(&["{{u}}", "{{u}}x"]);
        let out = s
            .splice(b"{{u}}x {{u}}", &contents(&[(0, "short"), (1, "long")]))
            .unwrap();
        assert_eq!(&out[..], b"long short");
    }

    #[test]
    fn no_contents_leaves_body() {
        let s = splicer(&["%%U%%"]);
        let out = s.splice(b"%%U%%", &BTreeMap::new()).unwrap();
        assert_eq!(&out[..], b"%%U%%");
    }

    #[test]
    fn with_body_recomputes_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", "3".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        let captured = CapturedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"abc"),
        };

        let body = Bytes::from("{\"name\":\"Zoë 😀\"}");
        let expected = body.len().to_string();
        let resp = captured.with_body(body);
        assert_eq!(resp.headers().get("content-length").unwrap(), expected.as_str());
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/json");
    }

    fn captured_with_encoding(encoding: Option<&'static str>) -> CapturedResponse {
        let mut headers = HeaderMap::new();
        if let Some(encoding) = encoding {
            headers.insert("content-encoding", HeaderValue::from_static(encoding));
        }
        CapturedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"%%U%%"),
        }
    }

    #[test]
    fn identity_bodies_can_be_spliced() {
        assert!(captured_with_encoding(None).ensure_identity().is_ok());
        assert!(captured_with_encoding(Some("identity")).ensure_identity().is_ok());
        assert!(captured_with_encoding(Some("Identity")).ensure_identity().is_ok());
    }

    #[test]
    fn encoded_bodies_are_refused() {
        let err = captured_with_encoding(Some("gzip"))
            .ensure_identity()
            .unwrap_err();
        assert_eq!(
            err,
            SpliceError::EncodedBody {
                encoding: "gzip".into()
            }
        );
    }

    #[test]
    fn select_contents_uses_first_job_per_rule() {
        let s = splicer(&["%%U%%"]);
        let jobs = vec![
            FetchJob {
                rule: 0,
                line: "X-H0: a".into(),
                url: "http://svc/a".into(),
            },
            FetchJob {
                rule: 0,
                line: "X-H0: b".into(),
                url: "http://svc/b".into(),
            },
        ];
        let picked = s
            .select_contents(&jobs, vec![Some(Bytes::from("a")), Some(Bytes::from("b"))])
            .unwrap();
        assert_eq!(picked.get(&0).unwrap(), &Bytes::from("a"));
    }

    #[test]
    fn select_contents_reports_empty_slot() {
        let s = splicer(&["%%U%%"]);
        let jobs = vec![FetchJob {
            rule: 0,
            line: "X-H0: a".into(),
            url: "http://svc/a".into(),
        }];
        let err = s.select_contents(&jobs, vec![None]).unwrap_err();
        assert!(matches!(err, SpliceError::MissingResult { .. }));
    }
}
