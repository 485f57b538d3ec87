//! The JSONPath-like response filter.

use crate::{Error, Result};

/// Deepest path a filter may address.
const MAX_SEGMENTS: usize = 6;

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parses a filter of the shape `$`, `$.a.b`, `$[0]`, `$.a[2].b`.
fn parse(filter: &str) -> Result<Vec<Segment>> {
    let rest = filter
        .strip_prefix('$')
        .ok_or_else(|| Error::Filter("filter must start with '$'".into()))?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(Error::Filter("empty key segment".into()));
                }
                segments.push(Segment::Key(key));
            }
            '[' => {
                chars.next();
                let mut digits = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    digits.push(c);
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| Error::Filter(format!("bad index [{digits}]")))?;
                segments.push(Segment::Index(index));
            }
            other => {
                return Err(Error::Filter(format!("unexpected character '{other}'")));
            }
        }
        if segments.len() > MAX_SEGMENTS {
            return Err(Error::Filter(format!(
                "filter exceeds {MAX_SEGMENTS} segments"
            )));
        }
    }
    Ok(segments)
}

/// Applies `filter` to a JSON document, returning the matched value in its
/// canonical JSON encoding. A missing path or non-JSON input is an error.
pub fn filter_json(data: &[u8], filter: &str) -> Result<Vec<u8>> {
    let document: serde_json::Value =
        serde_json::from_slice(data).map_err(|e| Error::Filter(e.to_string()))?;
    let segments = parse(filter)?;
    let mut current = &document;
    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current
                .get(key)
                .ok_or_else(|| Error::Filter(format!("key '{key}' not found")))?,
            Segment::Index(index) => current
                .get(index)
                .ok_or_else(|| Error::Filter(format!("index {index} not found")))?,
        };
    }
    serde_json::to_vec(current).map_err(|e| Error::Filter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_filter() {
        let result = filter_json(br#"{"value":42}"#, "$").unwrap();
        assert_eq!(result, br#"{"value":42}"#);
    }

    #[test]
    fn test_key_filter() {
        let result = filter_json(br#"{"value":42}"#, "$.value").unwrap();
        assert_eq!(result, b"42");
    }

    #[test]
    fn test_nested_path_with_index() {
        let body = br#"{"a":{"b":[10,20,30]}}"#;
        let result = filter_json(body, "$.a.b[1]").unwrap();
        assert_eq!(result, b"20");
    }

    #[test]
    fn test_missing_key_is_error() {
        assert!(filter_json(br#"{"value":42}"#, "$.other").is_err());
    }

    #[test]
    fn test_non_json_body_is_error() {
        assert!(filter_json(b"not json", "$.value").is_err());
    }

    #[test]
    fn test_depth_bound() {
        assert!(filter_json(b"{}", "$.a.b.c.d.e.f.g").is_err());
    }

    #[test]
    fn test_malformed_filter() {
        assert!(filter_json(b"{}", "value").is_err());
        assert!(filter_json(b"{}", "$.").is_err());
        assert!(filter_json(b"[1]", "$[x]").is_err());
    }
}
