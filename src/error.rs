//! Crate-level error type for callers that do not care which step failed.

use thiserror::Error;

use crate::config::LoadError;
use crate::http::{ConfigError, ShutdownError};
use crate::net::{ListenError, ParseError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to configure server: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listen(#[from] ListenError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    #[error("failed to load configuration: {0}")]
    Load(#[from] LoadError),
}
