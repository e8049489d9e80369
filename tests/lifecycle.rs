//! Serve and shutdown behaviour over real TCP connections.

use std::sync::Arc;
use std::time::Duration;

use gracehttp::config::Http2Config;
use gracehttp::http::ShutdownError;
use gracehttp::{serve_async, ListenContext, Server, ServerState};
use tokio::sync::mpsc;

mod common;

#[tokio::test]
async fn test_serves_requests_over_tcp() {
    let server = Server::new("127.0.0.1:0", common::hello()).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();

    let addr = common::tcp_addr(&server);
    let res = common::client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "Hello, 世界");

    server.shutdown_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_shutdown_idle_server() {
    let server = Server::new("tcp4://127.0.0.1:0", common::hello()).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();

    assert_eq!(server.shutdown_timeout(Duration::from_secs(1)).await, Ok(()));
}

#[tokio::test]
async fn test_immediate_shutdown_after_async_listen() {
    let server = Server::new("http://127.0.0.1:0", common::hello()).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();

    // No yield between listen and shutdown: the serve task may not have run.
    assert_eq!(server.shutdown_timeout(Duration::from_secs(1)).await, Ok(()));
}

#[tokio::test]
async fn test_new_connections_refused_after_shutdown() {
    let server = Server::new("127.0.0.1:0", common::hello()).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let addr = common::tcp_addr(&server);

    server.shutdown_timeout(Duration::from_secs(1)).await.unwrap();

    let res = common::client().get(format!("http://{addr}/")).send().await;
    assert!(res.is_err(), "listener should be closed after shutdown");
}

#[tokio::test]
async fn test_in_flight_request_finishes_during_drain() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let app = common::app(Duration::from_millis(300), started_tx);
    let server = Server::new("127.0.0.1:0", app).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let addr = common::tcp_addr(&server);

    let request = tokio::spawn(async move {
        common::client().get(format!("http://{addr}/slow")).send().await
    });
    started.recv().await.unwrap();

    assert_eq!(server.shutdown_timeout(Duration::from_secs(5)).await, Ok(()));

    let res = request.await.unwrap().expect("in-flight request should complete");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "finally");
}

#[tokio::test]
async fn test_shutdown_times_out_and_forces_close() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let app = common::app(Duration::from_secs(30), started_tx);
    let server = Server::new("127.0.0.1:0", app).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let addr = common::tcp_addr(&server);

    let request = tokio::spawn(async move {
        common::client().get(format!("http://{addr}/slow")).send().await
    });
    started.recv().await.unwrap();

    let err = server
        .shutdown_timeout(Duration::from_millis(200))
        .await
        .unwrap_err();
    // Only the stalled client connection is left; the listener is closed.
    assert_eq!(err, ShutdownError::Timeout { remaining: 1 });
    assert_eq!(server.state(), ServerState::Stopped);

    let res = tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .expect("forced close should end the request promptly")
        .unwrap();
    assert!(res.is_err(), "connection should have been closed");
}

#[tokio::test]
async fn test_sync_listen_returns_after_shutdown() {
    let server = Arc::new(Server::new("127.0.0.1:0", common::hello()).unwrap());

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve(&ListenContext::new()).await })
    };
    while server.state() != ServerState::Listening {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let addr = common::tcp_addr(&server);
    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    server.shutdown_timeout(Duration::from_secs(5)).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("listen_and_serve should return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_http2_prior_knowledge() {
    let server = Server::new("127.0.0.1:0", common::hello()).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let addr = common::tcp_addr(&server);

    let client = reqwest::Client::builder()
        .http2_prior_knowledge()
        .no_proxy()
        .build()
        .unwrap();
    let res = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.version(), reqwest::Version::HTTP_2);
    assert_eq!(res.text().await.unwrap(), "Hello, 世界");

    server.shutdown_timeout(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_http1_only_without_http2_config() {
    let server = Server::with_http2("127.0.0.1:0", common::hello(), None).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let addr = common::tcp_addr(&server);

    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.version(), reqwest::Version::HTTP_11);

    let h2 = reqwest::Client::builder()
        .http2_prior_knowledge()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    assert!(h2.get(format!("http://{addr}/")).send().await.is_err());

    server.shutdown_timeout(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_handler_limit_queues_excess_requests() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let app = common::app(Duration::from_millis(300), started_tx);
    let limits = Http2Config {
        max_handlers: 1,
        ..Http2Config::default()
    };
    let server = Server::with_http2("127.0.0.1:0", app, Some(&limits)).unwrap();
    server.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let addr = common::tcp_addr(&server);

    let first = tokio::spawn(async move {
        common::client().get(format!("http://{addr}/slow")).send().await
    });
    started.recv().await.unwrap();
    let second = tokio::spawn(async move {
        common::client().get(format!("http://{addr}/slow")).send().await
    });

    // The second handler cannot start while the first holds the only permit.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(started.try_recv().is_err());

    assert_eq!(first.await.unwrap().unwrap().status(), 200);
    started.recv().await.unwrap();
    assert_eq!(second.await.unwrap().unwrap().status(), 200);

    server.shutdown_timeout(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_serve_async_convenience() {
    let server = serve_async("127.0.0.1:0", common::hello()).await.unwrap();
    assert_eq!(server.state(), ServerState::Listening);

    let addr = common::tcp_addr(&server);
    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    server.shutdown_timeout(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_address_in_use_leaves_server_unbound() {
    let first = Server::new("127.0.0.1:0", common::hello()).unwrap();
    first.listen_and_serve_async(&ListenContext::new()).await.unwrap();
    let taken = common::tcp_addr(&first);

    let second = Server::new(taken.to_string(), common::hello()).unwrap();
    let err = second
        .listen_and_serve_async(&ListenContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, gracehttp::net::ListenError::BindFailed { .. }));
    assert_eq!(second.state(), ServerState::Unbound);

    first.shutdown_timeout(Duration::from_secs(1)).await.unwrap();
}
