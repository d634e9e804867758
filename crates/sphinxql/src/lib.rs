//! SphinxQL client for Sphinx and Manticore search.
//!
//! Statements are queued on a [`Query`] and sent as one multi-statement
//! request; the [`Response`] yields one [`ResultSet`] per statement, in
//! submission order, with `SHOW META` values merged into the statement that
//! asked for them. Statements that cannot share a request run side by side
//! on separate connections through an [`AsyncQuery`] pool.
//!
//! # Quick Start
//!
//! ```ignore
//! use sphinxql::prelude::*;
//!
//! fn main() -> Result<()> {
//!     sphinxql::init()?;
//!
//!     let mut query = Query::new();
//!     query.connect("127.0.0.1", 9306)?;
//!     query.add_query("SELECT id, title FROM docs WHERE MATCH('rust') LIMIT 10;", true);
//!     query.add_query("SELECT COUNT(*) AS n FROM docs;", false);
//!
//!     let mut response = query.execute()?;
//!     let docs = response.next().unwrap();
//!     println!("found {}", docs.get_meta("total_found")?);
//!
//!     let mut row = Row::new();
//!     while docs.next_row(&mut row) {
//!         let id: u64 = row.get("id")?;
//!         let title: String = row.get("title")?;
//!         println!("{id}: {title}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Layers
//!
//! - `sphinxql-core`: errors, typed cell decoding, results and rows
//! - `sphinxql-mysql`: the MySQL-protocol transport and its configuration
//! - `sphinxql-query`: statement batches and response demultiplexing
//! - `sphinxql-pool`: pipelined execution over several connections

pub use sphinxql_core::{
    ColumnError, ColumnErrorKind, ColumnIndex, ConfigError, ConnectionError, ConnectionErrorKind,
    Connector, Endpoint, Error, ErrorKind, FromCell, MetaMap, ProtocolError, QueryError, Result,
    ResultSet, Row, StateError, StateErrorKind, Transport, decode,
};

pub use sphinxql_mysql::library::{init, is_initialized, live_connections, unload};
pub use sphinxql_mysql::{
    ConnectionState, MySqlConnection, MySqlConnector, ServerInfo, SphinxConfig, TransportProtocol,
};

pub use sphinxql_query::{META_STATEMENT, Query, QueryBatch, Response, Statement};

pub use sphinxql_pool::{AsyncQuery, ConnectionPool, PoolStats};

/// Scripted in-memory transport for tests.
#[cfg(feature = "mock")]
pub use sphinxql_core::mock;

/// Everything needed for the common query cycle.
pub mod prelude {
    pub use crate::{
        AsyncQuery, ConnectionPool, Endpoint, Error, ErrorKind, FromCell, Query, QueryBatch,
        Response, Result, ResultSet, Row, SphinxConfig, TransportProtocol,
    };
}
