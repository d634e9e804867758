//! Pipelined fan-out of SphinxQL batches over independent connections.
//!
//! Statements that cannot share one multi-statement request run on
//! separate connections. A [`ConnectionPool`] gives every statement (or
//! every caller-built batch) its own worker, writes all requests before
//! waiting for any answer, then collects the results in the order the
//! workers were added.
//!
//! Workers that finished a successful launch are kept connected and hand
//! their connection to the next `add`. When anything goes wrong during a
//! launch every worker involved is dropped, never recycled.
//!
//! ```rust,ignore
//! use sphinxql_pool::ConnectionPool;
//!
//! let mut pool = ConnectionPool::new("127.0.0.1", 9306);
//! pool.add("SELECT * FROM products WHERE MATCH('phone');", true)?;
//! pool.add("CALL SUGGEST('phne', 'products');", false)?;
//! let mut response = pool.launch()?;
//! ```

use std::collections::VecDeque;
use std::fmt;

use sphinxql_core::{Connector, Endpoint, Result};
use sphinxql_mysql::{MySqlConnector, SphinxConfig};
use sphinxql_query::{QueryBatch, Response};

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connected workers waiting for a statement
    pub idle_workers: usize,
    /// Workers scheduled for the next launch
    pub active_workers: usize,
    /// Connections opened over the pool's lifetime
    pub connections_opened: usize,
    /// Launches that returned a response
    pub launches: usize,
    /// Launches that failed and discarded their workers
    pub failed_launches: usize,
}

/// Runs batches on separate connections and merges their results.
pub struct ConnectionPool<C: Connector = MySqlConnector> {
    endpoint: Endpoint,
    connector: C,
    /// Connected workers with an empty queue
    idle: VecDeque<QueryBatch<C>>,
    /// Workers with statements, in the order they were added
    active: Vec<QueryBatch<C>>,
    stats: PoolStats,
}

/// The pool under its classic name.
pub type AsyncQuery = ConnectionPool;

impl ConnectionPool<MySqlConnector> {
    /// Pool for `host:port`, or for the local socket `host` when `port` is 0.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_config(host, port, SphinxConfig::default())
    }

    /// Like [`new`](Self::new), opening connections with `config`.
    pub fn with_config(host: &str, port: u16, config: SphinxConfig) -> Self {
        Self::with_connector(
            Endpoint::from_host_port(host, port),
            MySqlConnector::new(config),
        )
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn with_connector(endpoint: Endpoint, connector: C) -> Self {
        Self {
            endpoint,
            connector,
            idle: VecDeque::new(),
            active: Vec::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Schedule `sql` on its own worker.
    ///
    /// An idle worker is reused when there is one; otherwise a new
    /// connection is opened.
    pub fn add(&mut self, sql: impl Into<String>, meta: bool) -> Result<()> {
        let mut worker = match self.idle.pop_front() {
            Some(worker) => worker,
            None => self.open_worker()?,
        };
        worker.add_query(sql, meta);
        self.active.push(worker);
        Ok(())
    }

    /// Schedule a caller-built batch as one worker.
    ///
    /// An unconnected batch is connected to the pool's endpoint first. A
    /// batch without statements goes straight to the idle queue.
    pub fn add_batch(&mut self, mut batch: QueryBatch<C>) -> Result<()> {
        if !batch.is_connected() {
            batch.connect_endpoint(self.endpoint.clone())?;
            self.stats.connections_opened += 1;
        }
        if batch.is_empty() {
            self.idle.push_back(batch);
        } else {
            self.active.push(batch);
        }
        Ok(())
    }

    /// Send every scheduled request, wait for all of them, and return the
    /// results in the order the workers were added.
    ///
    /// Idle workers are dropped before sending. On any failure all
    /// scheduled workers are dropped as well and the error is returned;
    /// no partial response is produced.
    #[tracing::instrument(level = "debug", skip(self), fields(workers = self.active.len()))]
    pub fn launch(&mut self) -> Result<Response> {
        let discarded = self.idle.len();
        self.idle.clear();
        if discarded > 0 {
            tracing::trace!(discarded, "Dropped idle workers");
        }

        let mut workers = std::mem::take(&mut self.active);
        match Self::run(&mut workers) {
            Ok(response) => {
                for mut worker in workers {
                    worker.clear();
                    self.idle.push_back(worker);
                }
                self.stats.launches += 1;
                tracing::debug!(results = response.len(), "Launch finished");
                Ok(response)
            }
            Err(e) => {
                self.stats.failed_launches += 1;
                tracing::warn!(error = %e, workers = workers.len(), "Launch failed, discarding workers");
                Err(e)
            }
        }
    }

    fn run(workers: &mut [QueryBatch<C>]) -> Result<Response> {
        for worker in workers.iter_mut() {
            worker.send_request()?;
        }
        for worker in workers.iter_mut() {
            worker.await_response()?;
        }
        let mut response = Response::new();
        for worker in workers.iter_mut() {
            response.fill(worker)?;
        }
        Ok(response)
    }

    /// Unschedule everything. Workers keep their connections and become
    /// idle.
    pub fn clear(&mut self) {
        for mut worker in self.active.drain(..) {
            worker.clear();
            self.idle.push_back(worker);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle_workers: self.idle.len(),
            active_workers: self.active.len(),
            ..self.stats.clone()
        }
    }

    fn open_worker(&mut self) -> Result<QueryBatch<C>> {
        let mut worker = QueryBatch::with_connector(self.connector.clone());
        worker.connect_endpoint(self.endpoint.clone())?;
        self.stats.connections_opened += 1;
        Ok(worker)
    }
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.endpoint)
            .field("idle", &self.idle.len())
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}
