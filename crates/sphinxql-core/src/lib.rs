//! Core types and traits for the SphinxQL client.
//!
//! This crate provides the pieces every other layer builds on:
//!
//! - `Error` taxonomy with a flat `ErrorKind` discriminant
//! - `FromCell` typed decoding of text cells with default fallback
//! - `ResultSet`, `Row` and `MetaMap`, the materialized result model
//! - `Connector` and `Transport`, the seam to the wire protocol
//! - a scripted in-memory transport behind the `mock` feature

pub mod decode;
pub mod error;
pub mod result;
pub mod row;
pub mod transport;

#[cfg(feature = "mock")]
pub mod mock;

pub use decode::{FromCell, decode};
pub use error::{
    ColumnError, ColumnErrorKind, ConfigError, ConnectionError, ConnectionErrorKind, Error,
    ErrorKind, ProtocolError, QueryError, Result, StateError, StateErrorKind,
};
pub use result::{ColumnIndex, MetaMap, ResultSet};
pub use row::Row;
pub use transport::{Connector, Endpoint, Transport};
