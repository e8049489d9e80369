//! HTTP engine over hyper.
//!
//! # Responsibilities
//! - Configure HTTP/1.1, or HTTP/1.1 plus HTTP/2 with concurrency limits
//! - Accept connections from any [`Listener`] until draining begins
//! - Dispatch requests to an Axum [`Router`]
//! - Drain connections gracefully, force-close past the deadline

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tower::ServiceExt;

use crate::config::Http2Config;
use crate::http::engine::{Engine, ShutdownError};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{BoundAddr, ConnectionTracker, Listener, Stream};

/// Pause before accepting again after running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A concurrency limit of zero would never serve anything.
    #[error("http2 {field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    /// More handler permits than a semaphore can hold.
    #[error("http2 max_handlers {value} exceeds the maximum of {max}")]
    TooManyHandlers { value: usize, max: usize },
}

/// Check HTTP/2 limits before they are applied.
pub fn check_http2(config: &Http2Config) -> Result<(), ConfigError> {
    if config.max_handlers == 0 {
        return Err(ConfigError::ZeroLimit {
            field: "max_handlers",
        });
    }
    if config.max_concurrent_streams == 0 {
        return Err(ConfigError::ZeroLimit {
            field: "max_concurrent_streams",
        });
    }
    if config.max_handlers > Semaphore::MAX_PERMITS {
        return Err(ConfigError::TooManyHandlers {
            value: config.max_handlers,
            max: Semaphore::MAX_PERMITS,
        });
    }
    Ok(())
}

/// Serves an Axum router over hyper connections.
pub struct HttpEngine {
    router: Router,
    builder: Builder<TokioExecutor>,
    /// Bounds concurrent handler invocations across all connections.
    handler_limit: Option<Arc<Semaphore>>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    /// Held by the accept loop so shutdown waits for the listener to close.
    acceptor: ConnectionTracker,
}

impl HttpEngine {
    /// Create an engine for `router`.
    ///
    /// With `http2` set, connections may speak HTTP/1.1 or HTTP/2 and the
    /// given limits apply. Without it, only HTTP/1.1 is served.
    pub fn new(router: Router, http2: Option<&Http2Config>) -> Result<Self, ConfigError> {
        let mut builder = Builder::new(TokioExecutor::new());

        let handler_limit = match http2 {
            Some(h2) => {
                check_http2(h2)?;
                builder
                    .http2()
                    .max_concurrent_streams(h2.max_concurrent_streams);
                Some(Arc::new(Semaphore::new(h2.max_handlers)))
            }
            None => {
                builder = builder.http1_only();
                None
            }
        };

        Ok(Self {
            router,
            builder,
            handler_limit,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
            acceptor: ConnectionTracker::new(),
        })
    }

    /// Whether HTTP/2 is enabled.
    pub fn is_http2(&self) -> bool {
        self.handler_limit.is_some()
    }

    /// Open client connections.
    pub fn active_connections(&self) -> usize {
        self.tracker.active_count()
    }

    fn spawn_connection(&self, stream: Stream, peer: BoundAddr) {
        let guard = self.tracker.track();
        let builder = self.builder.clone();
        let router = self.router.clone();
        let handler_limit = self.handler_limit.clone();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let connection_id = guard.id();
            tracing::debug!(connection_id = %connection_id, peer_addr = %peer, "Connection accepted");

            let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                let router = router.clone();
                let handler_limit = handler_limit.clone();
                async move {
                    let _permit = match handler_limit {
                        Some(limit) => limit.acquire_owned().await.ok(),
                        None => None,
                    };
                    router.oneshot(request).await
                }
            });

            let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => Some(res),
                _ = shutdown.draining() => {
                    conn.as_mut().graceful_shutdown();
                    tokio::select! {
                        res = conn.as_mut() => Some(res),
                        _ = shutdown.forced() => None,
                    }
                }
            };

            match result {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Connection error");
                }
                None => {
                    tracing::warn!(connection_id = %connection_id, "Closing connection past shutdown deadline");
                }
            }
            drop(guard);
        });
    }
}

impl Engine for HttpEngine {
    fn serve(
        self: Arc<Self>,
        listener: Listener,
    ) -> impl std::future::Future<Output = io::Result<()>> + Send + 'static {
        // Registered now so a shutdown racing the first poll still waits for
        // the listener to close.
        let accept_guard = self.acceptor.track();
        let mut shutdown = self.shutdown.subscribe();

        async move {
            let _accept_guard = accept_guard;
            let address = listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            tracing::info!(address = %address, http2 = self.is_http2(), "HTTP server starting");

            loop {
                let (stream, peer) = tokio::select! {
                    biased;
                    _ = shutdown.draining() => break,
                    res = listener.accept() => match res {
                        Ok(accepted) => accepted,
                        Err(e) if is_connection_error(&e) => {
                            tracing::debug!(error = %e, "Accepted connection failed");
                            continue;
                        }
                        Err(e) if is_resource_error(&e) => {
                            tracing::warn!(error = %e, "Accept failed, retrying");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                        Err(e) => {
                            tracing::error!(address = %address, error = %e, "Accept failed");
                            return Err(e);
                        }
                    },
                };

                self.spawn_connection(stream, peer);
            }

            drop(listener);
            tracing::info!(address = %address, "HTTP server stopped accepting");
            Ok(())
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), ShutdownError> {
        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Draining connections"
        );
        self.shutdown.drain();

        let idle = async {
            self.acceptor.wait_idle().await;
            self.tracker.wait_idle().await;
        };
        if tokio::time::timeout_at(deadline, idle).await.is_ok()
        {
            tracing::info!("All connections drained");
            return Ok(());
        }

        let remaining = self.tracker.active_count();
        tracing::warn!(remaining, "Shutdown deadline reached, closing remaining connections");
        self.shutdown.force();
        Err(ShutdownError::Timeout { remaining })
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

fn is_resource_error(e: &io::Error) -> bool {
    // ENFILE, EMFILE
    cfg!(unix) && matches!(e.raw_os_error(), Some(23 | 24))
}
