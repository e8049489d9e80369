//! Shared utilities for integration tests.

#![allow(dead_code, unused_imports)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::{routing::get, Router};
use gracehttp::{Engine, Server};
use tokio::sync::mpsc;

static PATH_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Router with a fast greeting and a handler that sleeps for `slow`.
///
/// Every call to the slow handler is announced on `started` before it sleeps.
pub fn app(slow: Duration, started: mpsc::UnboundedSender<()>) -> Router {
    Router::new()
        .route("/", get(|| async { "Hello, 世界" }))
        .route(
            "/slow",
            get(move || {
                let started = started.clone();
                async move {
                    let _ = started.send(());
                    tokio::time::sleep(slow).await;
                    "finally"
                }
            }),
        )
}

/// Router without a slow route.
pub fn hello() -> Router {
    let (tx, _) = mpsc::unbounded_channel();
    app(Duration::ZERO, tx)
}

/// HTTP/1.1 client that never pools connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn tcp_addr<E: Engine>(server: &Server<E>) -> SocketAddr {
    server
        .local_addr()
        .and_then(|a| a.as_tcp())
        .expect("server should be listening on tcp")
}

/// A fresh socket path in the temp directory. Nothing exists at it yet.
pub fn temp_socket_path(name: &str) -> PathBuf {
    let n = PATH_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("gracehttp-{}-{}-{}.sock", name, std::process::id(), n));
    let _ = std::fs::remove_file(&path);
    path
}

/// Issue a `GET` over a unix socket and return the raw response.
#[cfg(unix)]
pub async fn unix_get(path: &Path, uri: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::UnixStream::connect(path).await.unwrap();
    let request = format!("GET {uri} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}
