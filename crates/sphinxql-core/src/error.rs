//! Error types for SphinxQL operations.

use std::fmt;

/// The primary error type for all SphinxQL operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, handshake, server gone/lost)
    Connection(ConnectionError),
    /// Statement rejected by the server
    Query(QueryError),
    /// Protocol errors (wire-level)
    Protocol(ProtocolError),
    /// Operation invoked in a state that does not allow it
    State(StateError),
    /// Column lookup or positional access failure
    Column(ColumnError),
    /// `SHOW META` value requested from a result without meta
    MetaNotAttached,
    /// Configuration errors
    Config(ConfigError),
}

/// Flat discriminant over [`Error`], one tag per error category callers
/// branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or transport failure
    Connection,
    /// Server gone or lost mid-operation; retryable on a fresh connection
    Timeout,
    /// Name-based column lookup failed
    FieldNotFound,
    /// Positional access beyond the row width
    IndexOutOfRange,
    /// Call made in an invalid batch/row/library state
    ProtocolState,
    /// `getMeta` on a result without an attached meta result
    MetaNotAttached,
    /// Server-reported statement error
    Query,
    /// Malformed wire data
    Protocol,
    /// Invalid configuration
    Config,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection refused
    Refused,
    /// Authentication failed
    Authentication,
    /// Connection is closed or was never usable
    Disconnected,
    /// Server went away while sending a request
    ServerGone,
    /// Connection lost while reading a response
    ServerLost,
    /// Socket timeout expired
    Timeout,
}

impl ConnectionErrorKind {
    /// Kinds after which the connection must not be reused but a retry on a
    /// fresh connection may succeed.
    pub const fn is_timeout(self) -> bool {
        matches!(
            self,
            ConnectionErrorKind::ServerGone
                | ConnectionErrorKind::ServerLost
                | ConnectionErrorKind::Timeout
        )
    }
}

#[derive(Debug)]
pub struct QueryError {
    pub code: u16,
    pub sqlstate: Option<String>,
    pub message: String,
    pub sql: Option<String>,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    /// Offending wire bytes, when a single value was rejected
    pub raw_data: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct StateError {
    pub kind: StateErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    /// Batch has no established connection
    NotConnected,
    /// Batch is already connected
    AlreadyConnected,
    /// Demultiplexer asked for a result the server did not send
    NoResult,
    /// Row accessed before it was bound to a record
    RowUnbound,
    /// Column index requested but the result carries no field descriptors
    IndexUnavailable,
    /// Response awaited without a preceding send
    NotSent,
    /// Library teardown requested while connections are alive
    LibraryBusy,
}

#[derive(Debug)]
pub struct ColumnError {
    pub kind: ColumnErrorKind,
    /// Column name for name lookups
    pub field: Option<String>,
    /// Requested position for positional access
    pub index: Option<usize>,
    /// Number of columns available
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnErrorKind {
    /// No column with the requested name
    NotFound,
    /// Position past the last column
    OutOfRange,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(c) if c.kind.is_timeout() => ErrorKind::Timeout,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Query(_) => ErrorKind::Query,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::State(_) => ErrorKind::ProtocolState,
            Error::Column(c) => match c.kind {
                ColumnErrorKind::NotFound => ErrorKind::FieldNotFound,
                ColumnErrorKind::OutOfRange => ErrorKind::IndexOutOfRange,
            },
            Error::MetaNotAttached => ErrorKind::MetaNotAttached,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Is this a server gone/lost condition?
    ///
    /// Timeouts are connection errors too: the affected connection must be
    /// dropped.
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Is this a connection error that requires a new connection?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }

    /// May the caller retry the same statements on a fresh connection?
    ///
    /// Nothing in this library retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }

    /// Shorthand for a state error.
    pub fn state(kind: StateErrorKind, message: impl Into<String>) -> Self {
        Error::State(StateError {
            kind,
            message: message.into(),
        })
    }

    /// Column name lookup failure.
    pub fn field_not_found(field: impl Into<String>, width: usize) -> Self {
        Error::Column(ColumnError {
            kind: ColumnErrorKind::NotFound,
            field: Some(field.into()),
            index: None,
            width,
        })
    }

    /// Positional access past the row width.
    pub fn out_of_range(index: usize, width: usize) -> Self {
        Error::Column(ColumnError {
            kind: ColumnErrorKind::OutOfRange,
            field: None,
            index: Some(index),
            width,
        })
    }

    /// State error kind, if this is a state error.
    pub fn state_kind(&self) -> Option<StateErrorKind> {
        match self {
            Error::State(s) => Some(s.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::State(e) => write!(f, "Invalid state: {}", e.message),
            Error::Column(e) => write!(f, "{}", e),
            Error::MetaNotAttached => write!(f, "No SHOW META result"),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(state) => write!(f, "{} ({}, SQLSTATE {})", self.message, self.code, state),
            None => write!(f, "{} ({})", self.message, self.code),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.field, self.index) {
            (ColumnErrorKind::NotFound, Some(field), _) => {
                write!(f, "No such field in result set: {}", field)
            }
            (ColumnErrorKind::OutOfRange, _, Some(index)) => write!(
                f,
                "Row column out of range: {} (row has {} columns)",
                index, self.width
            ),
            (kind, _, _) => write!(f, "Column error: {:?}", kind),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Error::State(err)
    }
}

impl From<ColumnError> for Error {
    fn from(err: ColumnError) -> Self {
        Error::Column(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for SphinxQL operations.
pub type Result<T> = std::result::Result<T, Error>;
