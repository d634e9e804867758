//! MySQL-protocol transport for the SphinxQL client.
//!
//! Sphinx and Manticore expose their SphinxQL listener over the MySQL
//! client/server protocol. This crate implements the part of it the client
//! needs, on blocking std sockets:
//!
//! - Packet framing with sequence numbers
//! - Handshake v10 with `mysql_native_password` / `caching_sha2_password`
//! - Multi-statement text queries with multiple result sets
//! - TCP and unix socket endpoints with connect/read/write timeouts
//!
//! # Example
//!
//! ```rust,ignore
//! use sphinxql_core::{Endpoint, Transport};
//! use sphinxql_mysql::{MySqlConnection, SphinxConfig};
//!
//! sphinxql_mysql::library::init()?;
//! let mut conn = MySqlConnection::connect(&Endpoint::tcp("127.0.0.1", 9306), SphinxConfig::new())?;
//! conn.send_query("SELECT * FROM idx LIMIT 1;")?;
//! conn.read_query_result()?;
//! let result = conn.store_result()?;
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod library;
pub mod protocol;
mod stream;
pub mod types;

pub use config::{SphinxConfig, TransportProtocol};
pub use connection::{ConnectionState, MySqlConnection, MySqlConnector, ServerInfo};
