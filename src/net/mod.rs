//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Address string
//!     → addr.rs (scheme + endpoint)
//!     → listener.rs (stale socket cleanup, bind raced against context.rs)
//!     → stream.rs (accepted connections, any transport)
//!     → connection.rs (lifecycle tracking for graceful shutdown)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Addresses are parsed without resolution; bind time owns host lookup
//! - Unix socket files are removed before bind, never after
//! - Only the bind step is cancellable

pub mod addr;
pub mod connection;
pub mod context;
pub mod listener;
pub mod stream;

pub use addr::{parse_addr, AddressSpec, ParseError, Transport};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use context::ListenContext;
pub use listener::{listen, listen_addr, ListenError, Listener};
pub use stream::{BoundAddr, Stream};
