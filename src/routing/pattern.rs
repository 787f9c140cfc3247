//! Path pattern parsing.
//!
//! # Responsibilities
//! - Split a route pattern into literal, parameter and wildcard segments
//! - Reject malformed patterns at registration time
//! - Join prefixes and paths the same way for routes and collections
//!
//! # Design Decisions
//! - Empty segments are dropped, so `/a/`, `/a` and `a` are the same pattern
//! - A wildcard is only legal as the final segment

use std::fmt;

/// Name under which a wildcard capture is stored.
pub const WILDCARD: &str = "*";

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches identical text only.
    Literal(String),
    /// Matches any single non-empty segment.
    Param(String),
    /// Matches all remaining segments.
    Wildcard,
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

/// Why a route could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("wildcard must be the last segment in '{0}'")]
    WildcardNotLast(String),

    #[error("empty parameter name in '{0}'")]
    EmptyParam(String),

    #[error("collection attached without a preceding prefix")]
    CollectionWithoutPrefix,
}

impl Pattern {
    pub fn parse(source: &str) -> Result<Self, RouteError> {
        let raw: Vec<&str> = split(source).collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (index, part) in raw.iter().enumerate() {
            let segment = if *part == WILDCARD {
                if index + 1 != raw.len() {
                    return Err(RouteError::WildcardNotLast(source.to_string()));
                }
                Segment::Wildcard
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(RouteError::EmptyParam(source.to_string()));
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all captures, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Wildcard => Some(WILDCARD),
            Segment::Literal(_) => None,
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split a path into its non-empty segments.
pub fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Join a prefix and a path into one normalized path.
///
/// `join("/p", "/")` is `/p`; `join("/", "/a")` is `/a`.
pub fn join(prefix: &str, path: &str) -> String {
    let joined: Vec<&str> = split(prefix).chain(split(path)).collect();
    format!("/{}", joined.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let pattern = Pattern::parse("/animals/:name/files/*").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal("animals".into()),
                Segment::Param("name".into()),
                Segment::Literal("files".into()),
                Segment::Wildcard,
            ]
        );
        assert_eq!(pattern.param_names().collect::<Vec<_>>(), vec!["name", "*"]);
    }

    #[test]
    fn test_root_and_trailing_slash() {
        assert!(Pattern::parse("/").unwrap().segments().is_empty());
        assert_eq!(
            Pattern::parse("/a/").unwrap().segments(),
            Pattern::parse("/a").unwrap().segments()
        );
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(
            Pattern::parse("/a/*/b"),
            Err(RouteError::WildcardNotLast("/a/*/b".into()))
        );
        assert_eq!(Pattern::parse("/a/:"), Err(RouteError::EmptyParam("/a/:".into())));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/p", "/"), "/p");
        assert_eq!(join("/", "/a"), "/a");
        assert_eq!(join("/api/", "/v1/users"), "/api/v1/users");
        assert_eq!(join("/", "/"), "/");
    }
}
