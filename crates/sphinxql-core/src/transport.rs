//! Transport seam between the batching layer and the wire protocol.
//!
//! A [`Connector`] opens one [`Transport`] per batch. The transport follows
//! the classic multi-statement client cycle:
//!
//! 1. [`send_query`](Transport::send_query) writes the whole batch without
//!    waiting for the server;
//! 2. [`read_query_result`](Transport::read_query_result) blocks until the
//!    first result is available;
//! 3. [`store_result`](Transport::store_result) materializes the current
//!    result;
//! 4. while [`more_results`](Transport::more_results) holds,
//!    [`next_result`](Transport::next_result) advances to the next result.

use std::fmt;
use std::path::PathBuf;

use crate::error::{ConfigError, Error, Result};
use crate::result::ResultSet;

/// Address of a SphinxQL listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP `host:port`
    Tcp { host: String, port: u16 },
    /// Local (unix domain) socket path
    Socket(PathBuf),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn socket(path: impl Into<PathBuf>) -> Self {
        Endpoint::Socket(path.into())
    }

    /// Treat `host` as a socket path when `port` is zero.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        if port == 0 {
            Endpoint::socket(host)
        } else {
            Endpoint::tcp(host, port)
        }
    }

    /// Parse `host:port`, `[v6]:port` or a socket path (anything containing
    /// a `/`).
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.contains('/') {
            return Ok(Endpoint::socket(input));
        }
        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| endpoint_error(input, "unterminated IPv6 address"))?;
            let port = after
                .strip_prefix(':')
                .ok_or_else(|| endpoint_error(input, "missing port"))?;
            (host, port)
        } else {
            input
                .rsplit_once(':')
                .ok_or_else(|| endpoint_error(input, "missing port"))?
        };
        let port: u16 = port
            .parse()
            .map_err(|_| endpoint_error(input, "invalid port"))?;
        if host.is_empty() || port == 0 {
            return Err(endpoint_error(input, "empty host or zero port"));
        }
        Ok(Endpoint::tcp(host, port))
    }

    pub fn is_socket(&self) -> bool {
        matches!(self, Endpoint::Socket(_))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Socket(path) => write!(f, "{}", path.display()),
        }
    }
}

fn endpoint_error(input: &str, reason: &str) -> Error {
    Error::Config(ConfigError {
        message: format!("Invalid endpoint '{}': {}", input, reason),
        source: None,
    })
}

/// One connection able to run multi-statement requests.
pub trait Transport: Send {
    /// Write the request without waiting for the response.
    fn send_query(&mut self, sql: &str) -> Result<()>;

    /// Block until the server has answered the first statement.
    fn read_query_result(&mut self) -> Result<()>;

    /// Take the current result with all of its rows.
    fn store_result(&mut self) -> Result<ResultSet>;

    /// Check whether the server announced another result.
    fn more_results(&self) -> bool;

    /// Read the next result of the current request.
    fn next_result(&mut self) -> Result<()>;
}

/// Opens transports. Cloned into every pool worker.
pub trait Connector: Clone + Send {
    type Transport: Transport;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Transport>;
}
