//! Runtime capability tests: edge cache, client IP, deferred work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};

use velox::config::{CacheSettings, Config};
use velox::runtime::{Env, TaskQueue};
use velox::{App, Chain, Context, Error, Outcome, Runtime};

mod common;
use common::{get, text};

fn counting_app(config: &Config, calls: Arc<AtomicUsize>) -> App {
    let mut app = App::from_config(config);
    app.get(
        "/count",
        Chain::new(move |_ctx: Context| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, Error>(Outcome::respond(n.to_string()))
            }
        }),
    )
    .unwrap();
    app
}

fn edge_config(max_age: u64) -> Config {
    let mut config = Config::default();
    config.runtime.kind = Runtime::Edge;
    config.cache = Some(CacheSettings {
        name: "test".to_string(),
        max_age,
    });
    config
}

/// Dispatch like a host would: hand out a queue, then drain it.
async fn fetch_and_drain(app: &App, request: Request<Body>) -> (velox::Response, usize) {
    let (tasks, pending) = TaskQueue::channel();
    let response = app.fetch(request, Env::new().with_tasks(tasks)).await;
    let ran = pending.drain().await;
    (response, ran)
}

#[tokio::test]
async fn test_edge_cache_serves_repeat_requests() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = counting_app(&edge_config(60), calls.clone());

    let (first, deferred) = fetch_and_drain(&app, get("/count")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CACHE_CONTROL], "max-age=60");
    assert_eq!(text(first).await, "1");
    assert_eq!(deferred, 1);

    let (second, deferred) = fetch_and_drain(&app, get("/count")).await;
    assert_eq!(text(second).await, "1");
    assert_eq!(deferred, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_max_age_is_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = counting_app(&edge_config(0), calls.clone());

    fetch_and_drain(&app, get("/count")).await;
    let (second, _) = fetch_and_drain(&app, get("/count")).await;

    assert_eq!(text(second).await, "2");
}

#[tokio::test]
async fn test_server_runtime_never_caches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut config = edge_config(60);
    config.runtime.kind = Runtime::Server;
    let app = counting_app(&config, calls.clone());

    let (_, deferred) = fetch_and_drain(&app, get("/count")).await;
    assert_eq!(deferred, 0);
    let (second, _) = fetch_and_drain(&app, get("/count")).await;
    assert_eq!(text(second).await, "2");
}

#[tokio::test]
async fn test_failed_responses_are_not_cached() {
    let mut app = App::from_config(&edge_config(60));
    app.get(
        "/broken",
        Chain::new(|_ctx: Context| async { Err::<Outcome, _>(Error::status(StatusCode::BAD_GATEWAY)) }),
    )
    .unwrap();

    let (response, deferred) = fetch_and_drain(&app, get("/broken")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(deferred, 0);
}

fn ip_app(config: &Config) -> App {
    let mut app = App::from_config(config);
    app.get(
        "/ip",
        Chain::new(|ctx: Context| async move {
            Ok::<_, Error>(Outcome::respond(ctx.ip().unwrap_or("unknown").to_string()))
        }),
    )
    .unwrap();
    app
}

#[tokio::test]
async fn test_edge_ip_from_header() {
    let app = ip_app(&edge_config(0));
    let request = Request::get("/ip")
        .header("cf-connecting-ip", "203.0.113.9")
        .body(Body::empty())
        .unwrap();

    let response = app.fetch(request, Env::new()).await;
    assert_eq!(text(response).await, "203.0.113.9");
}

#[tokio::test]
async fn test_server_ip_from_peer() {
    let app = ip_app(&Config::default());
    let env = Env::new().with_remote_addr("192.0.2.7:5123".parse().unwrap());

    let response = app.fetch(get("/ip"), env).await;
    assert_eq!(text(response).await, "192.0.2.7");
}

#[tokio::test]
async fn test_env_bindings_on_edge() {
    let mut app = App::from_config(&edge_config(0));
    app.get(
        "/env",
        Chain::new(|ctx: Context| async move {
            Ok::<_, Error>(Outcome::respond(ctx.env("REGION").unwrap_or_default()))
        }),
    )
    .unwrap();

    let env = Env::new().with_binding("REGION", "eu-west");
    let response = app.fetch(get("/env"), env).await;
    assert_eq!(text(response).await, "eu-west");
}

#[tokio::test]
async fn test_wait_until_runs_after_response() {
    let done = Arc::new(AtomicUsize::new(0));
    let mut app = App::default();
    let flag = done.clone();
    app.get(
        "/later",
        Chain::new(move |ctx: Context| {
            let flag = flag.clone();
            async move {
                ctx.wait_until(async move {
                    flag.fetch_add(1, Ordering::SeqCst);
                });
                Ok::<_, Error>(Outcome::respond("queued"))
            }
        }),
    )
    .unwrap();

    let (tasks, pending) = TaskQueue::channel();
    let response = app.fetch(get("/later"), Env::new().with_tasks(tasks)).await;
    assert_eq!(text(response).await, "queued");
    assert_eq!(done.load(Ordering::SeqCst), 0);

    assert_eq!(pending.drain().await, 1);
    assert_eq!(done.load(Ordering::SeqCst), 1);
}
