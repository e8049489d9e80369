//! Server lifecycle: bind, serve, shut down.
//!
//! A [`Server`] is single-use and moves through
//! `Unbound → Binding → Listening → Stopped`. A failed bind returns it to
//! `Unbound`; nothing leaves `Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use tokio::time::Instant;

use crate::config::{Http2Config, ServerConfig};
use crate::http::{ConfigError, Engine, HttpEngine, ShutdownError};
use crate::net::{listen_addr, BoundAddr, ListenContext, ListenError, Listener};

/// Where a [`Server`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    /// Configured but not bound.
    Unbound = 0,
    /// A listen call is resolving or binding.
    Binding = 1,
    /// Bound and handed to the engine.
    Listening = 2,
    /// Serving has ended.
    Stopped = 3,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::Unbound,
            1 => ServerState::Binding,
            2 => ServerState::Listening,
            _ => ServerState::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Unbound => f.write_str("unbound"),
            ServerState::Binding => f.write_str("binding"),
            ServerState::Listening => f.write_str("listening"),
            ServerState::Stopped => f.write_str("stopped"),
        }
    }
}

/// One server instance bound to one address.
///
/// Operations take `&self` so a server shared through an `Arc` can be shut
/// down from another task while [`Server::listen_and_serve`] blocks, but only
/// one owner should drive the lifecycle.
pub struct Server<E: Engine = HttpEngine> {
    addr: String,
    engine: Arc<E>,
    state: AtomicU8,
    local_addr: OnceLock<BoundAddr>,
}

impl Server<HttpEngine> {
    /// Create a server for `addr` with the default HTTP/2 limits.
    pub fn new(addr: impl Into<String>, router: Router) -> Result<Self, ConfigError> {
        Self::with_http2(addr, router, Some(&Http2Config::default()))
    }

    /// Create a server with explicit HTTP/2 limits, or HTTP/1.1 only when
    /// `http2` is `None`.
    pub fn with_http2(
        addr: impl Into<String>,
        router: Router,
        http2: Option<&Http2Config>,
    ) -> Result<Self, ConfigError> {
        let engine = HttpEngine::new(router, http2)?;
        Ok(Self::with_engine(addr, engine))
    }

    pub fn from_config(config: &ServerConfig, router: Router) -> Result<Self, ConfigError> {
        Self::with_http2(config.address.clone(), router, config.http2_config())
    }
}

impl<E: Engine> Server<E> {
    /// Wrap an already configured engine.
    pub fn with_engine(addr: impl Into<String>, engine: E) -> Self {
        Self {
            addr: addr.into(),
            engine: Arc::new(engine),
            state: AtomicU8::new(ServerState::Unbound as u8),
            local_addr: OnceLock::new(),
        }
    }

    /// The configured address string.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The address actually bound, once listening.
    pub fn local_addr(&self) -> Option<&BoundAddr> {
        self.local_addr.get()
    }

    /// Bind and serve until the engine stops.
    ///
    /// `ctx` only bounds the bind. Returns `Ok` once serving ends through
    /// [`Server::shutdown_timeout`].
    pub async fn listen_and_serve(&self, ctx: &ListenContext) -> Result<(), ListenError> {
        let listener = self.bind(ctx).await?;
        let result = Arc::clone(&self.engine).serve(listener).await;
        self.set_state(ServerState::Stopped);

        result.map_err(ListenError::Serve)
    }

    /// Bind, then serve on a background task and return immediately.
    ///
    /// Only address and bind failures are reported. Errors after that are
    /// logged and otherwise unobserved; stop the server with
    /// [`Server::shutdown_timeout`].
    pub async fn listen_and_serve_async(&self, ctx: &ListenContext) -> Result<(), ListenError> {
        let listener = self.bind(ctx).await?;
        let serving = Arc::clone(&self.engine).serve(listener);
        let addr = self.addr.clone();

        tokio::spawn(async move {
            if let Err(e) = serving.await {
                tracing::error!(address = %addr, error = %e, "Server stopped with error");
            }
        });

        Ok(())
    }

    /// Shut down gracefully, closing remaining connections after `timeout`.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> Result<(), ShutdownError> {
        tracing::info!(address = %self.addr, timeout = ?timeout, "Shutting down server");

        let result = self.engine.shutdown(Instant::now() + timeout).await;
        self.set_state(ServerState::Stopped);
        result
    }

    async fn bind(&self, ctx: &ListenContext) -> Result<Listener, ListenError> {
        if let Err(current) = self.state.compare_exchange(
            ServerState::Unbound as u8,
            ServerState::Binding as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(ListenError::AlreadyStarted {
                state: ServerState::from_u8(current),
            });
        }

        match listen_addr(&self.addr, ctx).await {
            Ok(listener) => {
                if let Ok(local) = listener.local_addr() {
                    let _ = self.local_addr.set(local);
                }
                self.set_state(ServerState::Listening);
                Ok(listener)
            }
            Err(e) => {
                tracing::warn!(address = %self.addr, error = %e, "Listen failed");
                self.set_state(ServerState::Unbound);
                Err(e)
            }
        }
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl<E: Engine> fmt::Debug for Server<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr.get())
            .finish()
    }
}

/// Create a server with default settings and start serving it in the
/// background.
pub async fn serve_async(addr: impl Into<String>, router: Router) -> Result<Server, crate::Error> {
    let server = Server::new(addr, router)?;
    server.listen_and_serve_async(&ListenContext::new()).await?;
    Ok(server)
}
