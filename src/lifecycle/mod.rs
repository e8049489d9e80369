//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (server.rs):
//!     Address string → Parse → Clean stale socket → Bind → Hand to engine
//!
//! Shutdown (shutdown.rs):
//!     Drain requested → Stop accepting → Drain connections → Force past deadline
//!
//! Signals (signals.rs):
//!     SIGINT → Broadcast to every waiting task
//! ```
//!
//! # Design Decisions
//! - A server handle is single-use: no re-listen after stop
//! - Shutdown has timeout: forced close after deadline
//! - Only the bind is cancellable

pub mod server;
pub mod shutdown;
pub mod signals;

pub use server::{serve_async, Server, ServerState};
pub use shutdown::{Shutdown, ShutdownPhase, ShutdownReceiver};
pub use signals::{interrupts, wait_for_interrupt, Interrupt, InterruptReceiver, Interrupts};
