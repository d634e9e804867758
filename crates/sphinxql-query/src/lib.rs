//! Statement batching for the SphinxQL client.
//!
//! - [`QueryBatch`] (alias [`Query`]) queues statements on one connection
//!   and runs them as a single multi-statement request.
//! - [`Response`] hands the results back one per statement, in the order
//!   the statements were queued, with `SHOW META` values merged in.
//!
//! Batches are generic over the [`Connector`](sphinxql_core::Connector)
//! that opens their connection; the default is the MySQL-protocol
//! transport from `sphinxql-mysql`.

pub mod batch;
pub mod response;

pub use batch::{META_STATEMENT, QueryBatch, Statement};
pub use response::Response;

/// Short name for a batch over the default transport.
pub type Query = QueryBatch;
