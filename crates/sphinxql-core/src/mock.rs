//! Scripted in-memory transport.
//!
//! [`MockServer`] answers statements from a table of canned results, so the
//! batching and pool layers can be exercised without a search daemon:
//!
//! ```
//! use sphinxql_core::mock::MockServer;
//!
//! let server = MockServer::new()
//!     .with_table("SELECT a FROM t;", &["a"], &[&[Some("1")]])
//!     .with_meta(&[("time", "0.001"), ("total", "1")]);
//! let connector = server.connector();
//! # let _ = connector;
//! ```
//!
//! Every statement of a request is answered in order. `SHOW META` returns
//! the configured meta pairs; an unknown statement produces a query error
//! and ends the request, the way a server stops a multi-statement batch at
//! the first failing statement.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ConnectionError, ConnectionErrorKind, Error, QueryError, Result, StateErrorKind};
use crate::result::ResultSet;
use crate::transport::{Connector, Endpoint, Transport};

#[derive(Debug, Clone)]
struct Table {
    fields: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    fn to_result(&self) -> ResultSet {
        ResultSet::new(self.fields.clone(), self.rows.clone())
    }
}

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<String, Table>,
    meta: Vec<(String, String)>,
    fail_connect: bool,
    fail_send_on: Option<String>,
    fail_read_on: Option<String>,
    connects: usize,
    open: usize,
    sent: Vec<String>,
}

/// Shared script and counters behind every [`MockConnector`] it hands out.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

fn normalize(statement: &str) -> String {
    statement.trim().trim_end_matches(';').trim().to_string()
}

fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `statement` with the given columns and rows.
    pub fn with_table(self, statement: &str, fields: &[&str], rows: &[&[Option<&str>]]) -> Self {
        let table = Table {
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.map(str::to_string)).collect())
                .collect(),
        };
        self.lock().tables.insert(normalize(statement), table);
        self
    }

    /// Pairs returned for every `SHOW META`.
    pub fn with_meta(self, pairs: &[(&str, &str)]) -> Self {
        self.lock().meta = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self
    }

    /// Make new connections fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Fail the send of any request containing `needle`.
    pub fn set_fail_send_on(&self, needle: Option<&str>) {
        self.lock().fail_send_on = needle.map(str::to_string);
    }

    /// Fail the first read of any request containing `needle`.
    pub fn set_fail_read_on(&self, needle: Option<&str>) {
        self.lock().fail_read_on = needle.map(str::to_string);
    }

    /// Connections opened so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Connections currently alive.
    pub fn open_count(&self) -> usize {
        self.lock().open
    }

    /// Requests sent so far.
    pub fn send_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Request texts in send order.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            server: self.clone(),
        }
    }

    fn answer(&self, sql: &str) -> VecDeque<Result<ResultSet>> {
        let state = self.lock();
        let mut answers = VecDeque::new();
        for statement in split_statements(sql) {
            let key = normalize(statement);
            if key.eq_ignore_ascii_case("SHOW META") {
                let rows = state
                    .meta
                    .iter()
                    .map(|(k, v)| vec![Some(k.clone()), Some(v.clone())])
                    .collect();
                answers.push_back(Ok(ResultSet::new(
                    vec!["Variable_name".to_string(), "Value".to_string()],
                    rows,
                )));
            } else if let Some(table) = state.tables.get(&key) {
                answers.push_back(Ok(table.to_result()));
            } else {
                answers.push_back(Err(Error::Query(QueryError {
                    code: 1064,
                    sqlstate: Some("42000".to_string()),
                    message: format!("unknown statement: {}", key),
                    sql: Some(statement.to_string()),
                })));
                break;
            }
        }
        answers
    }
}

/// [`Connector`] over a [`MockServer`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    server: MockServer,
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&self, endpoint: &Endpoint) -> Result<MockTransport> {
        let mut state = self.server.lock();
        if state.fail_connect {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Refused,
                message: format!("Connection refused: {}", endpoint),
                source: None,
            }));
        }
        state.connects += 1;
        state.open += 1;
        Ok(MockTransport {
            server: self.server.clone(),
            request: None,
            pending: VecDeque::new(),
            current: None,
        })
    }
}

/// One scripted connection.
#[derive(Debug)]
pub struct MockTransport {
    server: MockServer,
    request: Option<String>,
    pending: VecDeque<Result<ResultSet>>,
    current: Option<ResultSet>,
}

impl MockTransport {
    fn advance(&mut self) -> Result<()> {
        match self.pending.pop_front() {
            Some(Ok(result)) => {
                self.current = Some(result);
                Ok(())
            }
            Some(Err(e)) => {
                self.pending.clear();
                Err(e)
            }
            None => Err(Error::state(StateErrorKind::NoResult, "No result returned")),
        }
    }
}

impl Transport for MockTransport {
    fn send_query(&mut self, sql: &str) -> Result<()> {
        self.pending.clear();
        self.current = None;
        let failing = {
            let mut state = self.server.lock();
            state.sent.push(sql.to_string());
            state
                .fail_send_on
                .as_deref()
                .is_some_and(|needle| sql.contains(needle))
        };
        if failing {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::ServerGone,
                message: "Server has gone away".to_string(),
                source: None,
            }));
        }
        self.pending = self.server.answer(sql);
        self.request = Some(sql.to_string());
        Ok(())
    }

    fn read_query_result(&mut self) -> Result<()> {
        let Some(request) = self.request.take() else {
            return Err(Error::state(StateErrorKind::NotSent, "No request sent"));
        };
        let failing = self
            .server
            .lock()
            .fail_read_on
            .as_deref()
            .is_some_and(|needle| request.contains(needle));
        if failing {
            self.pending.clear();
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::ServerLost,
                message: "Lost connection to server during query".to_string(),
                source: None,
            }));
        }
        self.advance()
    }

    fn store_result(&mut self) -> Result<ResultSet> {
        self.current
            .take()
            .ok_or_else(|| Error::state(StateErrorKind::NoResult, "No result returned"))
    }

    fn more_results(&self) -> bool {
        !self.pending.is_empty()
    }

    fn next_result(&mut self) -> Result<()> {
        self.advance()
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut state = self.server.lock();
        state.open = state.open.saturating_sub(1);
    }
}
