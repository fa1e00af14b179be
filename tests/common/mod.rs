//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;

/// Echo headers set by the backend.
pub const ECHO_PATH: &str = "x-echo-path";
pub const ECHO_QUERY: &str = "x-echo-query";
pub const ECHO_AUTHORIZATION: &str = "x-echo-authorization";

/// Placeholder for an absent value in echo headers.
pub const ABSENT: &str = "-";

/// Counts how many requests reached a backend.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicU32>);

impl Hits {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

async fn echo(State(hits): State<Hits>, request: Request) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);

    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or(ABSENT).to_string();
    let authorization = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(ABSENT)
        .to_string();

    (
        [
            (ECHO_PATH, path),
            (ECHO_QUERY, query),
            (ECHO_AUTHORIZATION, authorization),
        ],
        "ok",
    )
}

/// Router that echoes what it received in response headers.
pub fn echo_router() -> (Router, Hits) {
    let hits = Hits::default();
    let router = Router::new().fallback(echo).with_state(hits.clone());
    (router, hits)
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    addr
}

/// Start an echo backend on an ephemeral port.
pub async fn start_echo_backend() -> (SocketAddr, Hits) {
    let (router, hits) = echo_router();
    (serve(router).await, hits)
}

/// Start a backend that waits `delay` before answering every request.
pub async fn start_slow_backend(delay: Duration) -> SocketAddr {
    let router = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    });
    serve(router).await
}

/// HTTP client that does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Read an echo header from a backend response.
pub fn echoed<'a>(response: &'a reqwest::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| panic!("response has no {name} header"))
}
