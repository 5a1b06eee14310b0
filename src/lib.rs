//! # tidestream-cdc - CDC stream reading for wide-column databases
//!
//! Async reader loop for a wide-column database's change-data-capture log:
//! polls one shard's slice of the log, reassembles logical changes from
//! their physical rows, hands them to a consumer, and maintains a
//! resumable time cursor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   close / stop_now   ┌──────────────────┐
//! │     ReaderHandle     │─────────────────────▶│ StreamBatchReader│
//! └──────────────────────┘                      │   (run loop)     │
//!                                               └────────┬─────────┘
//!                                                        │ query_range
//!                                                        ▼
//! ┌──────────────────────┐    RangeQuery        ┌──────────────────┐
//! │ LogSession (driver)  │◀─────────────────────│ ChangeRowQuerier │
//! └──────────┬───────────┘                      └──────────────────┘
//!            │ rows (stream_id, time, batch_seq_no)
//!            ▼
//! ┌──────────────────────┐    Change            ┌──────────────────┐
//! │  ChangeRowIterator   │─────────────────────▶│  ChangeConsumer  │
//! └──────────────────────┘   (batch assembly)   └──────────────────┘
//! ```
//!
//! Each tick of the loop reads at most one `query_window`-sized slice of
//! the log, stays `confidence_window` behind `now` so replicas have
//! converged, and backs off adaptively depending on whether the tick
//! consumed rows, consumed nothing, or failed. The cursor only moves past
//! a logical change once the consumer accepted it, so resuming from a
//! persisted cursor never replays a partial change (delivery is
//! at-least-once).
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidestream_cdc::{ReaderConfig, StreamBatchReader, Timeuuid};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ReaderConfig::new(session, consumer_factory);
//! let start = Timeuuid::min_at(chrono::Utc::now() - chrono::Duration::seconds(60));
//! let (reader, handle) = StreamBatchReader::new(config, streams, "ks", "events", start);
//!
//! let task = tokio::spawn(reader.run(CancellationToken::new()));
//! // ... later: drain up to a generation boundary
//! handle.close(Timeuuid::min_at(generation_end));
//! let summary = task.await?;
//! progress_store.save(&key, Progress::new("ks.events", summary.last_timestamp)).await?;
//! ```

pub mod change;
pub mod checkpoint;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod querier;
pub mod reader;
pub mod session;
pub mod timeuuid;

pub use change::{Change, ChangeRow, OperationType, RowClass, StreamId, StreamKey};
pub use checkpoint::{shard_key, FileProgressStore, Progress, ProgressStore};
pub use config::{AdvancedReaderConfig, AdvancedReaderConfigBuilder, ReaderConfig};
pub use consumer::{ChangeConsumer, ConsumerFactory, CreateConsumerInput};
pub use error::{CdcError, Result};
pub use metrics::ReaderMetricsSnapshot;
pub use querier::{cdc_log_table_name, ChangeRowIterator, ChangeRowQuerier, CDC_LOG_SUFFIX};
pub use reader::{ReaderHandle, RunSummary, StreamBatchReader, Termination};
pub use session::{LogSession, RangeQuery, RawRowStream};
pub use timeuuid::Timeuuid;
