//! HTTP server host.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to [`App::fetch`]
//! - Wire up middleware (tracing, request timeout)
//! - Provide the per-request environment (peer address, deferred-work queue)
//! - Bind to a listener and stop on the shutdown signal
//!
//! # Design Decisions
//! - A single fallback handler; routing belongs to the app
//! - Deferred work is drained on a spawned task after the response is built

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::app::App;
use crate::config::TimeoutConfig;
use crate::http::Response;
use crate::lifecycle::Shutdown;
use crate::runtime::{Env, TaskQueue};

/// HTTP server hosting one [`App`].
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(app: Arc<App>, timeouts: &TimeoutConfig) -> Self {
        Self {
            router: Self::build_router(app, timeouts),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(app: Arc<App>, timeouts: &TimeoutConfig) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(app)
            .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The configured Axum router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Hand one request to the app.
async fn dispatch(State(app): State<Arc<App>>, request: Request<Body>) -> Response {
    let (tasks, pending) = TaskQueue::channel();
    let mut env = Env::new().with_tasks(tasks);
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        env = env.with_remote_addr(*addr);
    }

    let response = app.fetch(request, env).await;

    tokio::spawn(async move {
        let ran = pending.drain().await;
        if ran > 0 {
            tracing::debug!(tasks = ran, "Deferred work finished");
        }
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::handler::{Chain, Outcome};
    use crate::context::Context;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut app = App::default();
        app.get(
            "/ip",
            Chain::new(|ctx: Context| async move {
                Ok::<_, Error>(Outcome::respond(ctx.ip().unwrap_or("none").to_string()))
            }),
        )
        .unwrap();
        HttpServer::new(Arc::new(app), &TimeoutConfig::default())
    }

    #[tokio::test]
    async fn test_router_dispatches_to_app() {
        let response = server()
            .router()
            .oneshot(Request::get("/ip").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"none");
    }

    #[tokio::test]
    async fn test_connect_info_becomes_ip() {
        let addr: SocketAddr = "10.1.2.3:4000".parse().unwrap();
        let mut request = Request::get("/ip").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        let response = server().router().oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"10.1.2.3");
    }

    #[tokio::test]
    async fn test_unmatched_is_404() {
        let response = server()
            .router()
            .oneshot(Request::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
