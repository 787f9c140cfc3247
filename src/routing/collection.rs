//! Reusable route groups.
//!
//! A [`Collection`] records routes without registering them; the app
//! registers them later under a prefix (see `App::attach`).

use axum::http::Method;

use crate::handler::Chain;

/// A group of routes attached under a prefix.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    routes: Vec<(Method, String, Chain)>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, path: impl Into<String>, chain: Chain) -> Self {
        self.routes.push((method, path.into(), chain));
        self
    }

    pub fn get(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::GET, path, chain)
    }

    pub fn post(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::POST, path, chain)
    }

    pub fn put(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::PUT, path, chain)
    }

    pub fn patch(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::PATCH, path, chain)
    }

    pub fn delete(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::DELETE, path, chain)
    }

    pub fn head(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::HEAD, path, chain)
    }

    pub fn options(self, path: impl Into<String>, chain: Chain) -> Self {
        self.route(Method::OPTIONS, path, chain)
    }

    pub fn into_routes(self) -> Vec<(Method, String, Chain)> {
        self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
