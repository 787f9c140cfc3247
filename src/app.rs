//! Dispatch orchestrator.
//!
//! # Responsibilities
//! - Register routes, collections and extensions at setup
//! - Sequence one request: cache lookup, pre-dispatch extensions, routing,
//!   preflight, handler chain, normalization, post-dispatch extensions,
//!   cache write
//! - Catch every condition once and render it
//!
//! # Design Decisions
//! - Setup takes `&mut self`; serving takes `&self` and never mutates
//! - Recognized conditions keep their status; only unhandled errors reach
//!   the app error handler
//! - `HEAD` responses are stripped at the very end, on both paths

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{self, Method};
use futures_util::future::BoxFuture;
use tracing::Instrument;

use crate::config::{AppSettings, CacheSettings, Config};
use crate::context::{Context, ContextParts, Limits, ResponseContext};
use crate::error::{generic_failure, Error};
use crate::extension::{Extension, Registry, GLOBAL_PREFIX};
use crate::handler::Chain;
use crate::http::response::{
    finalize, is_preflight, normalize, preflight, renormalize, route_defaults, strip_body,
};
use crate::http::{Payload, Request, Response, X_REQUEST_ID};
use crate::observability::metrics;
use crate::routing::pattern::join;
use crate::routing::{Collection, RouteError, Router};
use crate::runtime::{CacheKey, Env, MemoryCache, ResponseCache, Runtime, RuntimeConfig};

type NotFoundFn = Arc<dyn Fn(Arc<Request>) -> BoxFuture<'static, Response> + Send + Sync>;
type ErrorFn = Arc<dyn Fn(Error, Arc<Request>) -> BoxFuture<'static, Result<Response, Error>> + Send + Sync>;

/// One item of an [`App::attach`] call.
pub enum Attachment {
    /// Prefix for the collections and extensions that follow.
    Prefix(String),
    Collection(Collection),
    Extension(Arc<dyn Extension>),
}

impl Attachment {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Attachment::Prefix(prefix.into())
    }

    pub fn collection(collection: Collection) -> Self {
        Attachment::Collection(collection)
    }

    pub fn extension(extension: impl Extension) -> Self {
        Attachment::Extension(Arc::new(extension))
    }
}

/// The application: routes, extensions and dispatch settings.
pub struct App {
    settings: AppSettings,
    limits: Limits,
    cache: Option<CacheSettings>,
    runtime: RuntimeConfig,
    router: Router,
    extensions: Registry,
    not_found: Option<NotFoundFn>,
    on_error: Option<ErrorFn>,
}

impl App {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            limits: Limits::from(&settings),
            settings,
            cache: None,
            runtime: RuntimeConfig::server(),
            router: Router::new(),
            extensions: Registry::new(),
            not_found: None,
            on_error: None,
        }
    }

    /// Build an app from configuration, resolving runtime capabilities.
    ///
    /// The edge runtime gets an in-process [`MemoryCache`] when caching is
    /// configured.
    pub fn from_config(config: &Config) -> Self {
        let runtime = match config.runtime.kind {
            Runtime::Server => RuntimeConfig::server(),
            Runtime::Edge => {
                let cache = config.cache.as_ref().map(|settings| {
                    Arc::new(MemoryCache::new(settings.name.clone())) as Arc<dyn ResponseCache>
                });
                RuntimeConfig::edge(config.runtime.ip_header.clone(), cache)
            }
        };

        let mut app = Self::new(config.app.clone());
        app.runtime = runtime;
        app.cache = config.cache.clone();
        app
    }

    pub fn with_runtime(&mut self, runtime: RuntimeConfig) -> &mut Self {
        self.runtime = runtime;
        self
    }

    pub fn with_cache(&mut self, cache: CacheSettings) -> &mut Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.router.len()
    }

    /// Handle unmatched requests instead of the bodyless 404.
    pub fn not_found<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: NotFoundFn = Arc::new(move |request| -> BoxFuture<'static, Response> {
            Box::pin(handler(request))
        });
        self.not_found = Some(handler);
        self
    }

    /// Render unhandled errors. A failure here renders the generic 500.
    pub fn on_error<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Error, Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Error>> + Send + 'static,
    {
        let handler: ErrorFn =
            Arc::new(move |err, request| -> BoxFuture<'static, Result<Response, Error>> {
                Box::pin(handler(err, request))
            });
        self.on_error = Some(handler);
        self
    }

    /// Register `chain` for `method` at `path`, below the app base.
    pub fn route(&mut self, method: Method, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        let path = join(&self.settings.base, path);
        self.router.add(method, &path, chain)?;
        Ok(self)
    }

    pub fn get(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::GET, path, chain)
    }

    pub fn post(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::POST, path, chain)
    }

    pub fn put(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::PUT, path, chain)
    }

    pub fn patch(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::PATCH, path, chain)
    }

    pub fn delete(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::DELETE, path, chain)
    }

    pub fn head(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::HEAD, path, chain)
    }

    pub fn options(&mut self, path: &str, chain: Chain) -> Result<&mut Self, RouteError> {
        self.route(Method::OPTIONS, path, chain)
    }

    /// Attach prefixes, collections and extensions in order.
    ///
    /// A prefix applies to every following item. Collections need a prefix;
    /// extensions without one are global.
    pub fn attach(&mut self, items: impl IntoIterator<Item = Attachment>) -> Result<&mut Self, RouteError> {
        let mut prefix: Option<String> = None;

        for item in items {
            match item {
                Attachment::Prefix(p) => prefix = Some(p),
                Attachment::Collection(collection) => {
                    let Some(prefix) = prefix.as_deref() else {
                        return Err(RouteError::CollectionWithoutPrefix);
                    };
                    for (method, path, chain) in collection.into_routes() {
                        self.route(method, &join(prefix, &path), chain)?;
                    }
                }
                Attachment::Extension(extension) => {
                    let scope = prefix.as_deref().unwrap_or(GLOBAL_PREFIX);
                    self.extensions.register(scope, extension);
                }
            }
        }

        Ok(self)
    }

    /// Register a global extension.
    pub fn extend(&mut self, extension: impl Extension) -> &mut Self {
        self.extensions.register(GLOBAL_PREFIX, Arc::new(extension));
        self
    }

    /// Dispatch one request.
    pub async fn fetch(&self, request: http::Request<Body>, env: Env) -> Response {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        self.dispatch(request, env).instrument(span).await
    }

    async fn dispatch(&self, request: http::Request<Body>, env: Env) -> Response {
        let start = Instant::now();
        let request = Arc::new(Request::new(request));
        let method = request.method().clone();
        let path = request.path().to_string();

        let cache = self.response_cache(&method);
        if let Some(cache) = &cache {
            if let Some(hit) = cache.lookup(&CacheKey::for_request(&request)).await {
                tracing::debug!("Served from cache");
                metrics::record_cache_hit();
                return self.emit(&method, &path, start, hit.into_response());
            }
        }

        let response = match self.handle(&request, &path, &env, cache).await {
            Ok(response) => response,
            Err(err) => self.render_error(err, request.clone()).await,
        };

        let response = if method == Method::HEAD {
            strip_body(response)
        } else {
            response
        };

        self.emit(&method, &path, start, response)
    }

    async fn handle(
        &self,
        request: &Arc<Request>,
        path: &str,
        env: &Env,
        cache: Option<Arc<dyn ResponseCache>>,
    ) -> Result<Response, Error> {
        if let Some(response) = self.extensions.run_pre_dispatch(request, path).await? {
            return Ok(response);
        }

        let Some(matched) = self
            .router
            .match_route(request.method(), path, self.settings.preflight)
        else {
            tracing::debug!("No route matched");
            return match &self.not_found {
                Some(not_found) => Ok(not_found(request.clone()).await),
                None => Err(Error::NotFound),
            };
        };

        let options = matched.chain.route_options().cloned();
        let cors = options
            .as_ref()
            .and_then(|o| o.cors.clone())
            .or_else(|| self.settings.cors.clone());

        if is_preflight(request) {
            tracing::debug!("Answering preflight");
            return Ok(preflight(request, cors.as_deref()));
        }

        let headers = route_defaults(
            request.method(),
            cors.as_deref(),
            self.cache.as_ref().map(|c| c.max_age),
            options.as_ref().and_then(|o| o.cache),
        );

        let ctx = Context::new(ContextParts {
            request: request.clone(),
            params: matched.params,
            options,
            limits: self.limits,
            ip: self.runtime.ip.resolve(request, env),
            runtime: self.runtime.runtime,
            env: env.clone(),
            response: ResponseContext::with_headers(headers),
        });

        matched.chain.run(&ctx).await?;

        let normalized_type = ctx.res().with(|acc| {
            normalize(acc);
            acc.headers.get(http::header::CONTENT_TYPE).cloned()
        });
        let revision = ctx.res().body_revision();

        self.extensions.run_post_dispatch(&ctx, path).await;

        if ctx.res().body_revision() != revision {
            ctx.res().with(|acc| {
                tracing::debug!(
                    kind = acc.body.as_ref().map_or("none", Payload::kind),
                    "Body replaced after dispatch"
                );
                renormalize(acc, normalized_type.as_ref());
            });
        }

        let (response, copy) = finalize(ctx.res().take(), cache.is_some());

        if let (Some(cache), Some(copy)) = (cache, copy) {
            if copy.status.is_success() {
                let key = CacheKey::for_request(request);
                env.defer(async move {
                    cache.store(key, copy).await;
                });
            }
        }

        Ok(response)
    }

    async fn render_error(&self, err: Error, request: Arc<Request>) -> Response {
        if let Some(status) = err.status_code() {
            tracing::debug!(status = status.as_u16(), error = %err, "Request rejected");
            return err.into_response();
        }

        tracing::error!(error = %err, "Unhandled error");
        metrics::record_unhandled_error();

        match &self.on_error {
            Some(on_error) => match on_error(err, request).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(error = %err, "Error handler failed");
                    generic_failure()
                }
            },
            None => generic_failure(),
        }
    }

    fn response_cache(&self, method: &Method) -> Option<Arc<dyn ResponseCache>> {
        if self.cache.is_none() || *method != Method::GET || self.runtime.runtime != Runtime::Edge {
            return None;
        }
        self.runtime.cache.clone()
    }

    fn emit(&self, method: &Method, path: &str, start: Instant, response: Response) -> Response {
        let status = response.status();

        if self.settings.debug {
            if status.is_success() || status.is_redirection() {
                tracing::info!(status = status.as_u16(), method = %method, path = %path, "fetch");
            } else {
                tracing::warn!(status = status.as_u16(), method = %method, path = %path, "error");
            }
        }

        metrics::record_request(method.as_str(), status.as_u16(), start);
        response
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Outcome;

    fn ok() -> Chain {
        Chain::new(|_ctx: Context| async { Ok::<_, Error>(Outcome::respond("ok")) })
    }

    #[test]
    fn test_collection_requires_prefix() {
        let mut app = App::default();
        let result = app.attach([Attachment::collection(Collection::new().get("/", ok()))]);
        assert!(matches!(result, Err(RouteError::CollectionWithoutPrefix)));
    }

    #[test]
    fn test_collection_paths_join_prefix() {
        let mut app = App::default();
        app.attach([
            Attachment::prefix("/animals"),
            Attachment::collection(Collection::new().get("/", ok()).get("/:name", ok())),
        ])
        .unwrap();

        assert_eq!(app.route_count(), 2);
        assert!(app.router.match_route(&Method::GET, "/animals", false).is_some());
        assert!(app.router.match_route(&Method::GET, "/animals/cat", false).is_some());
    }

    #[test]
    fn test_base_is_prepended() {
        let mut app = App::new(AppSettings {
            base: "/api".to_string(),
            ..AppSettings::default()
        });
        app.get("/users", ok()).unwrap();

        assert!(app.router.match_route(&Method::GET, "/api/users", false).is_some());
        assert!(app.router.match_route(&Method::GET, "/users", false).is_none());
    }

    #[test]
    fn test_cache_only_on_edge_get() {
        let mut config = Config::default();
        config.cache = Some(CacheSettings::default());

        let server = App::from_config(&config);
        assert!(server.response_cache(&Method::GET).is_none());

        config.runtime.kind = Runtime::Edge;
        let edge = App::from_config(&config);
        assert!(edge.response_cache(&Method::GET).is_some());
        assert!(edge.response_cache(&Method::POST).is_none());
    }
}
