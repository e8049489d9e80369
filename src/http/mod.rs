//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Bound listener
//!     → engine.rs (serve / shutdown contract)
//!     → server.rs (hyper accept loop, HTTP/1.1 + optional HTTP/2)
//!     → Axum router
//!     → Response to client
//! ```

pub mod engine;
pub mod server;

pub use engine::{Engine, ShutdownError};
pub use server::{check_http2, ConfigError, HttpEngine};
