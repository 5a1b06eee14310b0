//! Consumer contract: where assembled changes are handed off.
//!
//! A factory produces one consumer per shard reader; the reader delivers
//! changes in strictly increasing time order per stream and calls
//! [`ChangeConsumer::end`] exactly once on every exit path. Delivery is
//! at-least-once: a consumer that crashed after `consume` but before its
//! caller persisted the cursor will see the same change again on resume,
//! so consumers must be idempotent on `(stream_id, time)` or tolerate
//! duplicates.

use crate::change::{Change, StreamId};
use crate::error::Result;
use async_trait::async_trait;

/// Input handed to [`ConsumerFactory::create_consumer`].
#[derive(Debug, Clone)]
pub struct CreateConsumerInput {
    /// Base table the log belongs to, as `keyspace.table`.
    pub table_name: String,
    /// Streams the new consumer will receive changes for.
    pub stream_ids: Vec<StreamId>,
}

/// Receives the logical changes of one shard reader.
#[async_trait]
pub trait ChangeConsumer: Send {
    /// Process one change.
    ///
    /// An error is fatal to the owning shard reader: the reader stops
    /// without advancing its cursor past this change.
    async fn consume(&mut self, change: Change) -> Result<()>;

    /// Scoped release, invoked exactly once when the owning reader's
    /// `run` returns by any path.
    async fn end(&mut self) {}
}

/// Creates one [`ChangeConsumer`] per shard reader.
#[async_trait]
pub trait ConsumerFactory: Send + Sync {
    /// Create a consumer for the given table and stream set.
    async fn create_consumer(&self, input: CreateConsumerInput) -> Result<Box<dyn ChangeConsumer>>;
}
