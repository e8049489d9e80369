//! Listener binding for every supported transport.
//!
//! # Responsibilities
//! - Remove stale unix socket files before binding
//! - Resolve TCP endpoints and bind with the requested address family
//! - Race the bind against a [`ListenContext`]
//! - Accept connections as transport-agnostic [`Stream`]s

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::lifecycle::ServerState;
use crate::net::addr::{parse_addr, AddressSpec, ParseError, Transport};
use crate::net::context::ListenContext;
use crate::net::stream::{BoundAddr, Stream};

const LISTEN_BACKLOG: i32 = 1024;

/// Error type for listen operations.
#[derive(Debug, Error)]
pub enum ListenError {
    /// The address string could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A leftover socket file could not be removed.
    #[error("failed to clean up old socket {}: {source}", .path.display())]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Binding failed, was cancelled, or hit its deadline.
    #[error("failed to listen on {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The server handle has already been used to listen.
    #[error("server cannot listen while {state}")]
    AlreadyStarted { state: ServerState },

    /// Serving stopped because the engine failed.
    #[error("server stopped with error: {0}")]
    Serve(#[source] io::Error),
}

impl ListenError {
    /// The underlying I/O cause, if any.
    pub fn io_source(&self) -> Option<&io::Error> {
        match self {
            ListenError::CleanupFailed { source, .. } | ListenError::BindFailed { source, .. } => {
                Some(source)
            }
            ListenError::Serve(source) => Some(source),
            ListenError::Parse(_) | ListenError::AlreadyStarted { .. } => None,
        }
    }
}

/// A bound listener of any supported transport.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    /// Both `unix` and `unixpacket` sockets.
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    /// Accept the next connection.
    pub async fn accept(&self) -> io::Result<(Stream, BoundAddr)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                Ok((Stream::Tcp(stream), BoundAddr::Tcp(peer)))
            }
            #[cfg(unix)]
            Listener::Unix(l) => {
                let (stream, peer) = l.accept().await?;
                Ok((Stream::Unix(stream), peer.into()))
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<BoundAddr> {
        match self {
            Listener::Tcp(l) => l.local_addr().map(BoundAddr::Tcp),
            #[cfg(unix)]
            Listener::Unix(l) => l.local_addr().map(BoundAddr::from),
        }
    }
}

/// Parse `addr` and bind a listener for it.
pub async fn listen_addr(addr: &str, ctx: &ListenContext) -> Result<Listener, ListenError> {
    let spec = parse_addr(addr)?;
    listen(&spec, ctx).await
}

/// Bind a listener for a parsed address.
///
/// Unix socket files are removed before binding, never after, so a crashed
/// process leaves its socket behind for the next bind to clean up.
pub async fn listen(spec: &AddressSpec, ctx: &ListenContext) -> Result<Listener, ListenError> {
    if spec.transport().is_unix() {
        remove_stale_socket(Path::new(spec.endpoint()))?;
    }

    let bind_failed = |source| ListenError::BindFailed {
        address: spec.to_string(),
        source,
    };

    let listener = tokio::select! {
        biased;
        cause = ctx.done() => return Err(bind_failed(cause)),
        res = bind(spec) => res.map_err(bind_failed)?,
    };

    match listener.local_addr() {
        Ok(local) => tracing::info!(address = %spec, local_addr = %local, "Listener bound"),
        Err(_) => tracing::info!(address = %spec, "Listener bound"),
    }

    Ok(listener)
}

/// Remove whatever sits at `path`: a file, a socket or an empty directory.
fn remove_stale_socket(path: &Path) -> Result<(), ListenError> {
    let removed = match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound && is_dir(path) => std::fs::remove_dir(path),
        res => res,
    };

    match removed {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ListenError::CleanupFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn is_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.is_dir())
}

async fn bind(spec: &AddressSpec) -> io::Result<Listener> {
    match spec.transport() {
        Transport::Tcp | Transport::Tcp4 | Transport::Tcp6 => {
            bind_tcp_endpoint(spec.transport(), spec.endpoint()).await.map(Listener::Tcp)
        }
        Transport::Unix => bind_unix(spec.endpoint()),
        Transport::UnixPacket => bind_unix_packet(spec.endpoint()),
    }
}

async fn bind_tcp_endpoint(transport: Transport, endpoint: &str) -> io::Result<TcpListener> {
    if let Some(port) = endpoint.strip_prefix(':') {
        let port = port.parse::<u16>().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid port in {endpoint}: {e}"))
        })?;
        return bind_unspecified(transport, port);
    }

    let addr = resolve_tcp(transport, endpoint).await?;
    let only_v6 = (transport == Transport::Tcp6).then_some(true);
    bind_tcp(addr, only_v6)
}

/// Bind every interface of the transport's family.
///
/// Plain tcp takes a dual-stack `[::]` socket and drops to `0.0.0.0` on
/// hosts without IPv6.
fn bind_unspecified(transport: Transport, port: u16) -> io::Result<TcpListener> {
    let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));

    match transport {
        Transport::Tcp4 => bind_tcp(v4, None),
        Transport::Tcp6 => bind_tcp(v6, Some(true)),
        _ => match bind_tcp(v6, Some(false)) {
            Ok(listener) => Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, port, "Dual-stack bind failed, using IPv4");
                bind_tcp(v4, None)
            }
        },
    }
}

/// Resolve a TCP endpoint to a single socket address of the right family.
async fn resolve_tcp(transport: Transport, endpoint: &str) -> io::Result<SocketAddr> {
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host(endpoint).await?.collect();

    let chosen = match transport {
        Transport::Tcp4 => candidates.iter().find(|a| a.is_ipv4()),
        Transport::Tcp6 => candidates.iter().find(|a| a.is_ipv6()),
        _ => candidates
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| candidates.first()),
    };

    chosen.copied().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {transport} address found for {endpoint}"),
        )
    })
}

/// `only_v6` is applied to IPv6 sockets only; `None` keeps the OS default.
fn bind_tcp(addr: SocketAddr, only_v6: Option<bool>) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if let (Some(only_v6), true) = (only_v6, addr.is_ipv6()) {
        socket.set_only_v6(only_v6)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

#[cfg(unix)]
fn bind_unix(path: &str) -> io::Result<Listener> {
    UnixListener::bind(path).map(Listener::Unix)
}

/// SOCK_SEQPACKET has no tokio type; the socket is adopted as a unix listener,
/// which only needs accept/read/write on the descriptor.
#[cfg(unix)]
fn bind_unix_packet(path: &str) -> io::Result<Listener> {
    let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
    socket.bind(&socket2::SockAddr::unix(path)?)?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;

    let std_listener: std::os::unix::net::UnixListener = socket.into();
    UnixListener::from_std(std_listener).map(Listener::Unix)
}

#[cfg(not(unix))]
fn bind_unix(_path: &str) -> io::Result<Listener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not supported on this platform",
    ))
}

#[cfg(not(unix))]
fn bind_unix_packet(path: &str) -> io::Result<Listener> {
    bind_unix(path)
}
