//! Hosting-runtime capabilities.
//!
//! # Responsibilities
//! - Describe which runtime hosts the app (long-lived server or edge sandbox)
//! - Provide the optional shared response cache
//! - Pick the client-IP extraction strategy
//! - Queue deferred work that outlives the response
//!
//! # Design Decisions
//! - Capabilities are resolved once at startup and passed in explicitly
//! - The cache is keyed by request URL and only engaged for GET on the edge
//! - Deferred work falls back to `tokio::spawn` when the host provides no queue

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::http::{Request, Response};

/// The runtime hosting the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Long-lived server process.
    #[default]
    Server,
    /// Stateless edge-compute sandbox.
    Edge,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Server => "server",
            Runtime::Edge => "edge",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client IP is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpStrategy {
    /// Use the peer address reported by the connection.
    RemoteAddr,
    /// Use a forwarded-IP request header.
    Header(String),
}

impl IpStrategy {
    /// Resolve the client IP for a request.
    pub fn resolve(&self, request: &Request, env: &Env) -> Option<String> {
        match self {
            IpStrategy::RemoteAddr => env.remote_addr.map(|addr| addr.ip().to_string()),
            IpStrategy::Header(name) => request.header(name).map(str::to_owned),
        }
    }
}

/// Identity of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &Request) -> Self {
        CacheKey(request.url())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A fully buffered response held by a cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Freshness lifetime declared by `cache-control`.
    ///
    /// `None` when the response must not be stored (`private`, `no-store`,
    /// `no-cache`, or no positive `max-age`).
    pub fn max_age(&self) -> Option<Duration> {
        let value = self.headers.get(header::CACHE_CONTROL)?.to_str().ok()?;
        let mut max_age = None;
        for directive in value.split(',').map(str::trim) {
            match directive.to_ascii_lowercase().as_str() {
                "private" | "no-store" | "no-cache" => return None,
                other => {
                    if let Some(seconds) = other.strip_prefix("max-age=") {
                        max_age = seconds.parse::<u64>().ok();
                    }
                }
            }
        }
        max_age.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

/// A shared response cache.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse>;

    async fn store(&self, key: CacheKey, response: CachedResponse);
}

struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// In-process response cache.
///
/// Honours the `max-age` of each stored response; responses without a
/// positive `max-age` are never stored. Expired entries are swept on every
/// store.
pub struct MemoryCache {
    name: String,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry expired at `now`. Returns how many were removed.
    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.response.clone());
            }
            Some(_) => {}
            None => return None,
        }
        self.entries.remove(key);
        None
    }

    async fn store(&self, key: CacheKey, response: CachedResponse) {
        let Some(max_age) = response.max_age() else {
            tracing::debug!(cache = %self.name, key = %key.as_str(), "Response not cacheable");
            return;
        };
        let now = Instant::now();
        let purged = self.purge_expired(now);
        tracing::debug!(cache = %self.name, key = %key.as_str(), ?max_age, purged, "Caching response");
        self.entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: now + max_age,
            },
        );
    }
}

/// Capabilities of the hosting runtime.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub runtime: Runtime,
    pub cache: Option<Arc<dyn ResponseCache>>,
    pub ip: IpStrategy,
}

impl RuntimeConfig {
    /// Server runtime: peer address IPs, no shared cache.
    pub fn server() -> Self {
        Self {
            runtime: Runtime::Server,
            cache: None,
            ip: IpStrategy::RemoteAddr,
        }
    }

    /// Edge runtime: forwarded-IP header, optional shared cache.
    pub fn edge(ip_header: impl Into<String>, cache: Option<Arc<dyn ResponseCache>>) -> Self {
        Self {
            runtime: Runtime::Edge,
            cache,
            ip: IpStrategy::Header(ip_header.into()),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::server()
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("runtime", &self.runtime)
            .field("cache", &self.cache.is_some())
            .field("ip", &self.ip)
            .finish()
    }
}

/// A unit of deferred work.
pub type Deferred = BoxFuture<'static, ()>;

/// Handle for scheduling work to run after the response is sent.
#[derive(Clone, Debug)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Deferred>,
}

/// Receiving side of a [`TaskQueue`], drained by the host.
#[derive(Debug)]
pub struct PendingWork {
    rx: mpsc::UnboundedReceiver<Deferred>,
}

impl TaskQueue {
    pub fn channel() -> (TaskQueue, PendingWork) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TaskQueue { tx }, PendingWork { rx })
    }

    /// Queue work. Spawns it directly once the queue has been drained.
    pub fn push<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(mpsc::error::SendError(work)) = self.tx.send(Box::pin(work)) {
            tokio::spawn(work);
        }
    }
}

impl PendingWork {
    /// Run every queued unit of work to completion, in queue order.
    ///
    /// The queue is closed first; later pushes are spawned instead.
    pub async fn drain(mut self) -> usize {
        self.rx.close();
        let mut completed = 0;
        while let Some(work) = self.rx.recv().await {
            work.await;
            completed += 1;
        }
        completed
    }
}

/// Per-request host environment.
#[derive(Debug, Clone, Default)]
pub struct Env {
    /// Peer address of the connection (server runtime).
    pub remote_addr: Option<SocketAddr>,
    /// Environment bindings (edge runtime).
    pub bindings: HashMap<String, String>,
    /// Deferred-work queue provided by the host.
    pub tasks: Option<TaskQueue>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn with_tasks(mut self, tasks: TaskQueue) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Schedule deferred work on the host queue, or spawn it.
    pub fn defer<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.tasks {
            Some(queue) => queue.push(work),
            None => {
                tokio::spawn(work);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cached(cache_control: &str) -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, cache_control.parse().unwrap());
        CachedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"hi"),
        }
    }

    #[test]
    fn test_max_age_parsing() {
        assert_eq!(cached("max-age=60").max_age(), Some(Duration::from_secs(60)));
        assert_eq!(cached("max-age=0, private, must-revalidate").max_age(), None);
        assert_eq!(cached("public, max-age=0").max_age(), None);
        assert_eq!(cached("no-store").max_age(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_store_and_lookup() {
        let cache = MemoryCache::new("test");
        let key = CacheKey("http://localhost/a".into());

        cache.store(key.clone(), cached("private")).await;
        assert!(cache.lookup(&key).await.is_none());

        cache.store(key.clone(), cached("max-age=60")).await;
        let hit = cache.lookup(&key).await.unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"hi"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_sweeps_expired_entries() {
        let cache = MemoryCache::new("test");
        for n in 0..3 {
            let key = CacheKey(format!("http://localhost/x?n={n}"));
            cache.entries.insert(
                key,
                CacheEntry {
                    response: cached("max-age=1"),
                    expires_at: Instant::now()
                        .checked_sub(Duration::from_secs(1))
                        .unwrap_or_else(Instant::now),
                },
            );
        }
        assert_eq!(cache.len(), 3);

        let fresh = CacheKey("http://localhost/x?n=fresh".into());
        cache.store(fresh.clone(), cached("max-age=60")).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn test_memory_cache_purge_at_expiry() {
        let cache = MemoryCache::new("test");
        cache.store(CacheKey("http://localhost/a".into()), cached("max-age=60")).await;
        cache.store(CacheKey("http://localhost/b".into()), cached("max-age=120")).await;

        assert_eq!(cache.purge_expired(Instant::now()), 0);
        assert_eq!(cache.purge_expired(Instant::now() + Duration::from_secs(90)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_task_queue_drains_in_order() {
        let (queue, pending) = TaskQueue::channel();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            queue.push(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pending.drain().await, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_ip_strategies() {
        let request = Request::new(
            axum::http::Request::builder()
                .header("cf-connecting-ip", "203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        );
        let env = Env::new().with_remote_addr("10.0.0.1:4000".parse().unwrap());

        assert_eq!(
            IpStrategy::RemoteAddr.resolve(&request, &env).as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(
            IpStrategy::Header("cf-connecting-ip".into())
                .resolve(&request, &env)
                .as_deref(),
            Some("203.0.113.7")
        );
    }
}
