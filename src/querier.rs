//! Range queries over the CDC log and the row iterator they return.

use crate::change::{ChangeRow, StreamId, StreamKey};
use crate::error::{CdcError, Result};
use crate::session::{LogSession, RangeQuery, RawRowStream};
use crate::timeuuid::Timeuuid;
use std::sync::Arc;
use tracing::trace;

/// Suffix the database appends to a table's name to form its CDC log
/// table.
pub const CDC_LOG_SUFFIX: &str = "_scylla_cdc_log";

/// Fully qualified, quoted name of the CDC log table backing
/// `keyspace.table`.
pub fn cdc_log_table_name(keyspace: &str, table: &str) -> String {
    format!("\"{keyspace}\".\"{table}{CDC_LOG_SUFFIX}\"")
}

/// Issues bounded range queries over one table's CDC log for a fixed set
/// of streams.
pub struct ChangeRowQuerier {
    session: Arc<dyn LogSession>,
    stream_ids: Vec<StreamId>,
    statement: String,
}

impl ChangeRowQuerier {
    /// Create a querier for `keyspace.table` restricted to `stream_ids`.
    pub fn new(
        session: Arc<dyn LogSession>,
        stream_ids: Vec<StreamId>,
        keyspace: &str,
        table: &str,
    ) -> Self {
        let statement = format!(
            "SELECT * FROM {} WHERE \"cdc$stream_id\" IN ? \
             AND \"cdc$time\" > ? AND \"cdc$time\" <= ? BYPASS CACHE",
            cdc_log_table_name(keyspace, table),
        );
        Self {
            session,
            stream_ids,
            statement,
        }
    }

    /// Query rows in `(lower_exclusive, upper_inclusive]`.
    pub async fn query_range(
        &self,
        lower_exclusive: Timeuuid,
        upper_inclusive: Timeuuid,
    ) -> Result<ChangeRowIterator> {
        trace!(
            lower = %lower_exclusive,
            upper = %upper_inclusive,
            streams = self.stream_ids.len(),
            "issuing cdc log range query"
        );
        let query = RangeQuery {
            statement: self.statement.clone(),
            stream_ids: self.stream_ids.clone(),
            lower_exclusive,
            upper_inclusive,
        };
        let stream = self.session.query(&query).await?;
        Ok(ChangeRowIterator::new(stream))
    }
}

/// Lazy sequence over the rows of one range query.
///
/// Iteration errors are deferred: [`ChangeRowIterator::next`] ends the
/// sequence and [`ChangeRowIterator::close`] surfaces the stored error.
/// `close` is idempotent; later calls return `Ok(())`.
pub struct ChangeRowIterator {
    stream: Option<Box<dyn RawRowStream>>,
    deferred: Option<CdcError>,
}

impl ChangeRowIterator {
    fn new(stream: Box<dyn RawRowStream>) -> Self {
        Self {
            stream: Some(stream),
            deferred: None,
        }
    }

    /// The next row in `(stream_id, time, batch_seq_no)` order, or `None`
    /// once the result set is exhausted or an error occurred.
    pub async fn next(&mut self) -> Option<(StreamKey, ChangeRow)> {
        let stream = self.stream.as_mut()?;
        match stream.next_row().await {
            Ok(row) => row,
            Err(e) => {
                self.deferred = Some(e);
                if let Some(stream) = self.stream.take() {
                    // release resources now; the original error wins
                    let _ = stream.close().await;
                }
                None
            }
        }
    }

    /// Release the query's resources and surface any deferred iteration
    /// error.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        match self.stream.take() {
            Some(stream) => stream.close().await,
            None => Ok(()),
        }
    }
}
