//! Route lookup.
//!
//! # Responsibilities
//! - Store registered chains in one segment tree per method
//! - Resolve (method, path) into captured params plus the chain
//! - Return an explicit no-match instead of failing
//!
//! # Design Decisions
//! - Immutable after setup (shared without locks while serving)
//! - Literal children are tried before parameters, parameters before the
//!   wildcard, with backtracking when a deeper segment fails
//! - `HEAD` falls back to `GET`; preflight `OPTIONS` may match any method

use std::collections::HashMap;

use axum::http::Method;
use percent_encoding::percent_decode_str;

use crate::handler::Chain;
use crate::routing::pattern::{split, Pattern, RouteError, Segment, WILDCARD};

/// A successful lookup.
#[derive(Debug)]
pub struct Matched<'r> {
    pub params: HashMap<String, String>,
    pub chain: &'r Chain,
}

#[derive(Default)]
struct Node {
    literals: Vec<(String, Node)>,
    params: Vec<(String, Node)>,
    wildcard: Option<Chain>,
    chain: Option<Chain>,
}

impl Node {
    /// Insert `chain` at the end of `segments`. Returns false on a duplicate.
    fn insert(&mut self, segments: &[Segment], chain: Chain) -> bool {
        let Some((segment, rest)) = segments.split_first() else {
            if self.chain.is_some() {
                return false;
            }
            self.chain = Some(chain);
            return true;
        };

        match segment {
            Segment::Wildcard => {
                if self.wildcard.is_some() {
                    return false;
                }
                self.wildcard = Some(chain);
                true
            }
            Segment::Literal(text) => child(&mut self.literals, text).insert(rest, chain),
            Segment::Param(name) => child(&mut self.params, name).insert(rest, chain),
        }
    }

    fn search<'r>(
        &'r self,
        segments: &[&str],
        params: &mut Vec<(String, String)>,
    ) -> Option<&'r Chain> {
        let Some((segment, rest)) = segments.split_first() else {
            if let Some(chain) = &self.chain {
                return Some(chain);
            }
            if let Some(chain) = &self.wildcard {
                params.push((WILDCARD.to_string(), String::new()));
                return Some(chain);
            }
            return None;
        };

        for (text, node) in &self.literals {
            if text == segment {
                if let Some(chain) = node.search(rest, params) {
                    return Some(chain);
                }
            }
        }

        for (name, node) in &self.params {
            params.push((name.clone(), decode(segment)));
            if let Some(chain) = node.search(rest, params) {
                return Some(chain);
            }
            params.pop();
        }

        if let Some(chain) = &self.wildcard {
            let remaining: Vec<String> = segments.iter().map(|s| decode(s)).collect();
            params.push((WILDCARD.to_string(), remaining.join("/")));
            return Some(chain);
        }

        None
    }
}

fn child<'n>(children: &'n mut Vec<(String, Node)>, key: &str) -> &'n mut Node {
    let index = match children.iter().position(|(k, _)| k == key) {
        Some(index) => index,
        None => {
            children.push((key.to_string(), Node::default()));
            children.len() - 1
        }
    };
    &mut children[index].1
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Per-method route registry.
#[derive(Default)]
pub struct Router {
    methods: Vec<(Method, Node)>,
    routes: usize,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `chain` for `method` and `path`.
    ///
    /// A duplicate registration keeps the first chain.
    pub fn add(&mut self, method: Method, path: &str, chain: Chain) -> Result<(), RouteError> {
        let pattern = Pattern::parse(path)?;

        let index = match self.methods.iter().position(|(m, _)| *m == method) {
            Some(index) => index,
            None => {
                self.methods.push((method.clone(), Node::default()));
                self.methods.len() - 1
            }
        };

        if self.methods[index].1.insert(pattern.segments(), chain) {
            self.routes += 1;
            tracing::debug!(method = %method, path = %pattern, "Route registered");
        } else {
            tracing::warn!(method = %method, path = %pattern, "Duplicate route ignored");
        }
        Ok(())
    }

    /// Resolve a request. `None` means no route.
    pub fn match_route(&self, method: &Method, path: &str, allow_preflight: bool) -> Option<Matched<'_>> {
        let segments: Vec<&str> = split(path).collect();

        if let Some(found) = self.lookup(method, &segments) {
            return Some(found);
        }

        if *method == Method::HEAD {
            return self.lookup(&Method::GET, &segments);
        }

        if *method == Method::OPTIONS && allow_preflight {
            return self
                .methods
                .iter()
                .find_map(|(_, node)| Self::search(node, &segments));
        }

        None
    }

    fn lookup(&self, method: &Method, segments: &[&str]) -> Option<Matched<'_>> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .and_then(|(_, node)| Self::search(node, segments))
    }

    fn search<'r>(node: &'r Node, segments: &[&str]) -> Option<Matched<'r>> {
        let mut params = Vec::new();
        let chain = node.search(segments, &mut params)?;
        Some(Matched {
            params: params.into_iter().collect(),
            chain,
        })
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field(
                "methods",
                &self.methods.iter().map(|(m, _)| m.as_str()).collect::<Vec<_>>(),
            )
            .field("routes", &self.routes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Error;

    fn chain(tag: &'static str) -> Chain {
        Chain::new(move |_ctx: Context| async move { Ok::<_, Error>(tag) })
    }

    fn router() -> Router {
        let mut router = Router::new();
        router.add(Method::GET, "/", chain("root")).unwrap();
        router.add(Method::GET, "/animals/:name", chain("param")).unwrap();
        router.add(Method::GET, "/animals/cat", chain("literal")).unwrap();
        router.add(Method::GET, "/files/*", chain("wildcard")).unwrap();
        router.add(Method::GET, "/users/:id/posts", chain("posts")).unwrap();
        router.add(Method::GET, "/users/:user/comments", chain("comments")).unwrap();
        router.add(Method::POST, "/submit", chain("submit")).unwrap();
        router
    }

    #[test]
    fn test_static_routes_have_no_params() {
        let router = router();
        let matched = router.match_route(&Method::GET, "/", false).unwrap();
        assert!(matched.params.is_empty());

        let matched = router.match_route(&Method::POST, "/submit/", false).unwrap();
        assert!(matched.params.is_empty());
    }

    #[test]
    fn test_literal_wins_over_param() {
        let router = router();
        let literal = router.match_route(&Method::GET, "/animals/cat", false).unwrap();
        assert!(literal.params.is_empty());

        let param = router.match_route(&Method::GET, "/animals/dog", false).unwrap();
        assert_eq!(param.params["name"], "dog");
    }

    #[test]
    fn test_params_are_decoded() {
        let router = router();
        let matched = router
            .match_route(&Method::GET, "/animals/big%20cat", false)
            .unwrap();
        assert_eq!(matched.params["name"], "big cat");
    }

    #[test]
    fn test_backtracking_across_param_names() {
        let router = router();
        let posts = router.match_route(&Method::GET, "/users/7/posts", false).unwrap();
        assert_eq!(posts.params["id"], "7");
        assert!(!posts.params.contains_key("user"));

        let comments = router
            .match_route(&Method::GET, "/users/7/comments", false)
            .unwrap();
        assert_eq!(comments.params["user"], "7");
        assert!(!comments.params.contains_key("id"));
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let router = router();
        let matched = router.match_route(&Method::GET, "/files/a/b.txt", false).unwrap();
        assert_eq!(matched.params[WILDCARD], "a/b.txt");

        let empty = router.match_route(&Method::GET, "/files", false).unwrap();
        assert_eq!(empty.params[WILDCARD], "");
    }

    #[test]
    fn test_no_match_and_method_fallbacks() {
        let router = router();
        assert!(router.match_route(&Method::GET, "/missing", false).is_none());
        assert!(router.match_route(&Method::DELETE, "/", false).is_none());

        assert!(router.match_route(&Method::HEAD, "/animals/cat", false).is_some());

        assert!(router.match_route(&Method::OPTIONS, "/submit", false).is_none());
        assert!(router.match_route(&Method::OPTIONS, "/submit", true).is_some());
    }

    #[test]
    fn test_duplicates_keep_first() {
        let mut router = Router::new();
        router.add(Method::GET, "/a", chain("first")).unwrap();
        router.add(Method::GET, "/a/", chain("second")).unwrap();
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut router = Router::new();
        assert!(router.add(Method::GET, "/*/a", chain("bad")).is_err());
        assert!(router.is_empty());
    }
}
