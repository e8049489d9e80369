//! The request-serving engine contract.
//!
//! The lifecycle layer only needs something that serves a bound listener and
//! can be stopped gracefully. [`HttpEngine`](crate::http::HttpEngine) is the
//! production implementation; tests substitute lighter ones.

use std::future::Future;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use crate::net::Listener;

/// Error type for graceful shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The deadline passed with connections still open. They have been
    /// closed regardless.
    #[error("shutdown timed out with {remaining} connection(s) still open")]
    Timeout { remaining: usize },
}

/// A request-serving engine.
pub trait Engine: Send + Sync + 'static {
    /// Serve connections from `listener` until shutdown begins or accepting
    /// fails.
    ///
    /// Work that must be visible to [`Engine::shutdown`] is registered before
    /// the future is returned, so shutdown waits for it even if the future
    /// has not been polled yet.
    fn serve(
        self: Arc<Self>,
        listener: Listener,
    ) -> impl Future<Output = io::Result<()>> + Send + 'static;

    /// Stop accepting, let in-flight work finish until `deadline`, then close
    /// whatever remains.
    fn shutdown(&self, deadline: Instant) -> impl Future<Output = Result<(), ShutdownError>> + Send;
}
