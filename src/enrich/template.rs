//! Capture references in target URL templates.
//!
//! Templates use the same syntax as [`regex::Captures::expand`]: `$1`,
//! `$name`, `${1}`, `${name}`, and `$$` for a literal dollar sign. A name
//! after a bare `$` extends as far as `[_0-9A-Za-z]` allows, so `$1abc`
//! refers to a group called `1abc`; write `${1}abc` instead.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureRef {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Capture(CaptureRef),
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn parse_ref(name: &str) -> CaptureRef {
    name.parse::<usize>()
        .map_or_else(|_| CaptureRef::Name(name.to_string()), CaptureRef::Index)
}

fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        if pos > 0 {
            out.push(Segment::Literal(&rest[..pos]));
        }
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push(Segment::Literal("$"));
            rest = tail;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                if !name.is_empty() && name.chars().all(is_name_char) {
                    out.push(Segment::Capture(parse_ref(name)));
                    rest = &braced[end + 1..];
                    continue;
                }
            }
            out.push(Segment::Literal("$"));
            rest = after;
            continue;
        }

        let len = after
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(after.len(), |(i, _)| i);
        if len == 0 {
            out.push(Segment::Literal("$"));
            rest = after;
        } else {
            out.push(Segment::Capture(parse_ref(&after[..len])));
            rest = &after[len..];
        }
    }

    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    out
}

/// Every capture group the template refers to, in order of appearance.
#[must_use]
pub fn capture_refs(template: &str) -> Vec<CaptureRef> {
    segments(template)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Capture(r) => Some(r),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Check that every reference in `template` names a group of `pattern`.
pub fn check_refs(pattern: &Regex, template: &str) -> Result<(), String> {
    for capture in capture_refs(template) {
        match capture {
            CaptureRef::Index(i) if i >= pattern.captures_len() => {
                return Err(format!(
                    "'${i}' refers to a missing capture group (pattern has {})",
                    pattern.captures_len() - 1
                ));
            }
            CaptureRef::Name(ref name) if !pattern.capture_names().flatten().any(|n| n == name) => {
                return Err(format!("'${name}' is not a named capture group of the pattern"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Replace every capture reference with `stand_in`, for validating the
/// shape of a URL before any header has been seen.
#[must_use]
pub fn fill_with(template: &str, stand_in: &str) -> String {
    let mut result = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Literal(s) => result.push_str(s),
            Segment::Capture(_) => result.push_str(stand_in),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_and_named_refs() {
        assert_eq!(
            capture_refs("http://svc/$1/${id}/$user"),
            vec![
                CaptureRef::Index(1),
                CaptureRef::Name("id".into()),
                CaptureRef::Name("user".into()),
            ]
        );
    }

    #[test]
    fn escaped_dollar_is_literal() {
        assert!(capture_refs("http://svc/cost$$1").is_empty());
        assert_eq!(fill_with("http://svc/cost$$1", "_p"), "http://svc/cost$1");
    }

    #[test]
    fn greedy_bare_name() {
        assert_eq!(capture_refs("$1abc"), vec![CaptureRef::Name("1abc".into())]);
        assert_eq!(capture_refs("${1}abc"), vec![CaptureRef::Index(1)]);
    }

    #[test]
    fn trailing_dollar_is_literal() {
        assert_eq!(fill_with("http://svc/a$", "_p"), "http://svc/a$");
        assert_eq!(fill_with("http://svc/${}", "_p"), "http://svc/${}");
    }

    #[test]
    fn fill_replaces_all_refs() {
        assert_eq!(
            fill_with("http://svc/user/$1?team=${team}", "_p"),
            "http://svc/user/_p?team=_p"
        );
    }

    #[test]
    fn check_refs_rejects_missing_group() {
        let re = Regex::new("X-User: (.*)").unwrap();
        assert!(check_refs(&re, "http://svc/$1").is_ok());
        assert!(check_refs(&re, "http://svc/$2").is_err());
        assert!(check_refs(&re, "http://svc/$id").is_err());
    }

    #[test]
    fn check_refs_accepts_named_group() {
        let re = Regex::new("X-User: (?P<id>.*)").unwrap();
        assert!(check_refs(&re, "http://svc/${id}").is_ok());
        assert!(check_refs(&re, "http://svc/$0").is_ok());
    }
}
