//! Statement batches over one connection.
//!
//! A [`QueryBatch`] queues statements and sends them as one multi-statement
//! request. Results come back as a flat sequence in which every statement
//! that asked for meta is followed by its `SHOW META` result;
//! [`Response::fill`] folds those pairs back together.

use std::fmt;
use std::path::Path;

use sphinxql_core::{Connector, Endpoint, Error, Result, ResultSet, StateErrorKind, Transport};
use sphinxql_mysql::{MySqlConnector, SphinxConfig};

use crate::response::Response;

/// Companion statement appended after every statement that wants meta.
pub const META_STATEMENT: &str = "SHOW META; ";

/// One queued statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    wants_meta: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>, wants_meta: bool) -> Self {
        Self {
            sql: sql.into(),
            wants_meta,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn wants_meta(&self) -> bool {
        self.wants_meta
    }
}

/// Where the batch is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nothing in flight
    Idle,
    /// Request written, response not awaited yet
    Sent,
    /// Server answered; results can be pulled
    Answered,
}

/// An ordered batch of statements bound to one connection.
///
/// The connection is opened once and reused for every execute; `clear`
/// only empties the statement queue.
///
/// ```rust,ignore
/// use sphinxql_query::QueryBatch;
///
/// let mut batch = QueryBatch::new();
/// batch.connect("127.0.0.1", 9306)?;
/// batch.add_query("SELECT id FROM products WHERE MATCH('phone');", true);
/// batch.add_query("SELECT id FROM articles LIMIT 5;", false);
/// let mut response = batch.execute()?;
/// let products = response.next().unwrap();
/// let total: u64 = products.meta_value("total_found")?;
/// ```
pub struct QueryBatch<C: Connector = MySqlConnector> {
    connector: C,
    session: Option<Session<C::Transport>>,
    statements: Vec<Statement>,
    phase: Phase,
    /// The first result of a request is pulled with `store_result` alone.
    first_to_retrieve: bool,
}

/// The open connection and where it points.
struct Session<T> {
    endpoint: Endpoint,
    transport: T,
}

impl QueryBatch<MySqlConnector> {
    /// Batch using the MySQL transport with default timeouts.
    pub fn new() -> Self {
        Self::with_connector(MySqlConnector::default())
    }

    /// Batch using the MySQL transport with `config`.
    pub fn with_config(config: SphinxConfig) -> Self {
        Self::with_connector(MySqlConnector::new(config))
    }
}

impl Default for QueryBatch<MySqlConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> QueryBatch<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            session: None,
            statements: Vec::new(),
            phase: Phase::Idle,
            first_to_retrieve: false,
        }
    }

    /// Connect over TCP, or to the local socket `host` when `port` is 0.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.connect_endpoint(Endpoint::from_host_port(host, port))
    }

    /// Connect to a local socket.
    pub fn connect_socket(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.connect_endpoint(Endpoint::socket(path.as_ref()))
    }

    pub fn connect_endpoint(&mut self, endpoint: Endpoint) -> Result<()> {
        if let Some(session) = &self.session {
            return Err(Error::state(
                StateErrorKind::AlreadyConnected,
                format!("Already connected to {}", session.endpoint),
            ));
        }
        let transport = self.connector.connect(&endpoint)?;
        tracing::debug!(endpoint = %endpoint, "Batch connected");
        self.session = Some(Session {
            endpoint,
            transport,
        });
        self.phase = Phase::Idle;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Endpoint of the open connection.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.session.as_ref().map(|s| &s.endpoint)
    }

    /// Queue a statement. It must end with a semicolon; with `meta` set its
    /// `SHOW META` result is merged into its own result.
    pub fn add_query(&mut self, sql: impl Into<String>, meta: bool) -> &mut Self {
        self.statements.push(Statement::new(sql, meta));
        self
    }

    /// Drop every queued statement and any unread result. The connection
    /// stays open.
    pub fn clear(&mut self) {
        self.statements.clear();
        self.phase = Phase::Idle;
        self.first_to_retrieve = false;
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Text of the request that `send_request` would write.
    pub fn request_sql(&self) -> String {
        let mut sql = String::new();
        for statement in &self.statements {
            sql.push_str(&statement.sql);
            if statement.wants_meta {
                sql.push_str(META_STATEMENT);
            }
        }
        sql
    }

    /// Run the queued statements and collect their results.
    ///
    /// The queue is cleared afterwards whether or not the request
    /// succeeded, so the connection can take a new batch right away.
    #[tracing::instrument(level = "debug", skip(self), fields(statements = self.statements.len()))]
    pub fn execute(&mut self) -> Result<Response> {
        if !self.is_connected() {
            return Err(not_connected());
        }
        let outcome = self.run();
        self.clear();
        if let Err(e) = &outcome {
            tracing::debug!(error = %e, "Batch failed");
        }
        outcome
    }

    fn run(&mut self) -> Result<Response> {
        self.send_request()?;
        self.await_response()?;
        let mut response = Response::new();
        response.fill(self)?;
        Ok(response)
    }

    /// Write the request without waiting for the server.
    ///
    /// An empty batch sends nothing.
    pub fn send_request(&mut self) -> Result<()> {
        let sql = self.request_sql();
        self.phase = Phase::Idle;
        let session = self.session.as_mut().ok_or_else(not_connected)?;
        if !sql.is_empty() {
            let sent = session.transport.send_query(&sql);
            if let Err(e) = sent {
                return Err(self.fail(e));
            }
            tracing::trace!(statements = self.statements.len(), "Request sent");
        }
        self.phase = Phase::Sent;
        Ok(())
    }

    /// Block until the server has answered the request written by
    /// `send_request`.
    pub fn await_response(&mut self) -> Result<()> {
        if self.phase != Phase::Sent {
            return Err(Error::state(
                StateErrorKind::NotSent,
                "No request is waiting for a response",
            ));
        }
        self.phase = Phase::Idle;
        let session = self.session.as_mut().ok_or_else(not_connected)?;
        if !self.statements.is_empty() {
            if let Err(e) = session.transport.read_query_result() {
                return Err(self.fail(e));
            }
        }
        self.phase = Phase::Answered;
        self.first_to_retrieve = true;
        Ok(())
    }

    /// Pull the next raw result of the answered request.
    ///
    /// Meta results are returned as separate entries here; use
    /// [`Response::fill`] to get one result per statement.
    pub fn next_result(&mut self) -> Result<ResultSet> {
        if self.phase != Phase::Answered {
            return Err(no_result());
        }
        let session = self.session.as_mut().ok_or_else(not_connected)?;
        let transport = &mut session.transport;
        let pulled = if self.first_to_retrieve {
            self.first_to_retrieve = false;
            transport.store_result()
        } else if transport.more_results() {
            transport
                .next_result()
                .and_then(|()| transport.store_result())
        } else {
            Err(no_result())
        };
        pulled.map_err(|e| self.fail(e))
    }

    /// A connection-level failure leaves the transport unusable, so it is
    /// dropped and the batch has to be connected again.
    fn fail(&mut self, err: Error) -> Error {
        if err.is_connection_error() {
            if let Some(session) = self.session.take() {
                tracing::warn!(endpoint = %session.endpoint, error = %err, "Dropping broken connection");
            }
            self.phase = Phase::Idle;
        }
        err
    }
}

impl<C: Connector> fmt::Debug for QueryBatch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBatch")
            .field("endpoint", &self.endpoint())
            .field("statements", &self.statements)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

fn not_connected() -> Error {
    Error::state(StateErrorKind::NotConnected, "No connection established!")
}

fn no_result() -> Error {
    Error::state(StateErrorKind::NoResult, "No result returned")
}
