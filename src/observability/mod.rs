//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net, http, lifecycle
//!     → tracing events with structured fields
//!     → logging.rs (subscriber: filter + pretty/JSON formatter)
//!     → stdout
//! ```

pub mod logging;

pub use logging::init_logging;
