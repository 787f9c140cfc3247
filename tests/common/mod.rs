//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use serde_json::Value;
use tokio::net::TcpListener;

use velox::config::TimeoutConfig;
use velox::runtime::Env;
use velox::{App, HttpServer, Response, Shutdown};

pub const BOUNDARY: &str = "velox-test-boundary";

/// Build a bodyless request.
pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost")
        .body(Body::empty())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri)
}

/// Build a POST request with a body and content type.
pub fn post(uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("host", "localhost")
        .header("content-type", content_type)
        .body(body.into())
        .unwrap()
}

/// Encode text fields as a multipart body.
pub fn multipart(fields: &[(&str, &str)]) -> (String, String) {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Dispatch in-process with an empty environment.
pub async fn fetch(app: &App, request: Request<Body>) -> Response {
    app.fetch(request, Env::new()).await
}

pub async fn text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve `app` on an ephemeral port.
pub async fn serve(app: App) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(Arc::new(app), &TimeoutConfig::default());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    (addr, shutdown)
}
