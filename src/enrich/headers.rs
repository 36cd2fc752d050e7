//! Header rendering for rule matching, and hop-by-hop stripping.
//!
//! `http::HeaderMap` stores names lowercased, so [`header_lines`] renders
//! each name in canonical MIME form (`x-user` becomes `X-User`) before
//! building the `"<Name>: <value>"` lines rules are matched against.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName};

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Render a header name with each `-`-separated word capitalised.
#[must_use]
pub fn canonical_name(name: &HeaderName) -> String {
    let mut out = String::with_capacity(name.as_str().len());
    let mut upper = true;
    for c in name.as_str().chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// One `"<Canonical-Name>: <value>"` line per distinct header name, in the
/// map's iteration order. The value is the first one that is visible
/// ASCII; a name whose values are all opaque bytes yields no line.
#[must_use]
pub fn header_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .keys()
        .filter_map(|name| {
            let value = headers
                .get_all(name)
                .iter()
                .find_map(|v| v.to_str().ok())?;
            Some(format!("{}: {value}", canonical_name(name)))
        })
        .collect()
}

/// Strip hop-by-hop headers and `content-length` from a captured response.
///
/// The body has been fully collected and is about to be rewritten, so the
/// downstream framing headers no longer describe it.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(hyper::header::CONTENT_LENGTH);
}

/// Strip hop-by-hop headers from a request about to be forwarded.
pub fn strip_request_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}
