//! Listen address parsing.
//!
//! Turns a user-supplied address string into a transport and an endpoint.
//! Accepted forms:
//!
//! ```text
//! unixpacket://relative/path/to.socket
//! unix:///absolute/path/to.socket
//! /absolute/path/to.socket
//!
//! http://host[:port]
//! tcp4://host:port
//! tcp6://host:port     (tcp6://[::1]:port)
//! tcp://host:port
//! host:port            (defaults to tcp)
//! ```
//!
//! The endpoint is never interpreted here. Host resolution, IPv6 brackets and
//! port validation happen at bind time.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEME_SEPARATOR: &str = "://";

/// Errors produced while parsing a listen address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The scheme token is not one of the supported transports.
    #[error("unknown scheme {0:?}")]
    UnknownScheme(String),
}

/// Connection family a listener is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// TCP over IPv4 or IPv6.
    Tcp,
    /// TCP restricted to IPv4.
    Tcp4,
    /// TCP restricted to IPv6.
    Tcp6,
    /// Unix-domain stream socket.
    Unix,
    /// Unix-domain sequenced-packet socket.
    UnixPacket,
}

impl Transport {
    /// Canonical scheme name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Tcp4 => "tcp4",
            Transport::Tcp6 => "tcp6",
            Transport::Unix => "unix",
            Transport::UnixPacket => "unixpacket",
        }
    }

    /// Whether the endpoint is a filesystem path.
    pub fn is_unix(&self) -> bool {
        matches!(self, Transport::Unix | Transport::UnixPacket)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "http" => Ok(Transport::Tcp),
            "tcp4" => Ok(Transport::Tcp4),
            "tcp6" => Ok(Transport::Tcp6),
            "unix" => Ok(Transport::Unix),
            "unixpacket" => Ok(Transport::UnixPacket),
            other => Err(ParseError::UnknownScheme(other.to_string())),
        }
    }
}

/// A parsed listen address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressSpec {
    transport: Transport,
    endpoint: String,
}

impl AddressSpec {
    pub fn new(transport: Transport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// `host:port` for TCP transports, a filesystem path for unix ones.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.transport, SCHEME_SEPARATOR, self.endpoint)
    }
}

impl FromStr for AddressSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_addr(s)
    }
}

/// Parse an address string into its transport and endpoint.
///
/// Only the first `://` splits scheme from endpoint, so `unix:///run/x.sock`
/// keeps its leading slash. Without a scheme, a leading `/` selects a unix
/// socket and anything else is TCP.
pub fn parse_addr(addr: &str) -> Result<AddressSpec, ParseError> {
    match addr.split_once(SCHEME_SEPARATOR) {
        Some((scheme, endpoint)) => Ok(AddressSpec::new(scheme.parse()?, endpoint)),
        None if addr.starts_with('/') => Ok(AddressSpec::new(Transport::Unix, addr)),
        None => Ok(AddressSpec::new(Transport::Tcp, addr)),
    }
}
