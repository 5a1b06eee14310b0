//! The database-session boundary.
//!
//! Driver concerns (connection pooling, prepared statements, paging) stay
//! behind [`LogSession`]; the reader only needs to execute one shape of
//! bounded range query and walk its result rows in order.

use crate::change::{ChangeRow, StreamId, StreamKey};
use crate::error::Result;
use crate::timeuuid::Timeuuid;
use async_trait::async_trait;

/// One bounded range query over the CDC log, restricted to a fixed set of
/// streams and the half-open time interval `(lower_exclusive,
/// upper_inclusive]`.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    /// CQL text of the query; bind markers cover the stream set and both
    /// time bounds.
    pub statement: String,
    /// Streams the query is restricted to.
    pub stream_ids: Vec<StreamId>,
    /// Exclusive lower time bound.
    pub lower_exclusive: Timeuuid,
    /// Inclusive upper time bound.
    pub upper_inclusive: Timeuuid,
}

/// Result rows of one range query, delivered in
/// `(stream_id, time, batch_seq_no)` order.
#[async_trait]
pub trait RawRowStream: Send {
    /// The next decoded row, or `None` once the result set is exhausted.
    ///
    /// Errors (network, paging, decode) may surface here or be deferred
    /// until [`RawRowStream::close`].
    async fn next_row(&mut self) -> Result<Option<(StreamKey, ChangeRow)>>;

    /// Release the query's resources, surfacing any deferred error.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A shared database session able to execute CDC log range queries.
///
/// Implementations are expected to be cheap to share across shard readers;
/// the session itself must be thread-safe.
#[async_trait]
pub trait LogSession: Send + Sync {
    /// Execute `query` and return its row stream.
    async fn query(&self, query: &RangeQuery) -> Result<Box<dyn RawRowStream>>;
}
