//! Graceful lifecycle management for an HTTP server.
//!
//! Parses a flexible listen address, binds it with a cancellable context,
//! serves an Axum router over hyper, and shuts down within a grace period.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use error::Error;
pub use http::{Engine, HttpEngine};
pub use lifecycle::{serve_async, wait_for_interrupt, Server, ServerState};
pub use net::{listen_addr, parse_addr, AddressSpec, ListenContext, Transport};
