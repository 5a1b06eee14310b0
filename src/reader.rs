//! The per-shard polling loop.
//!
//! A [`StreamBatchReader`] repeatedly queries one table's CDC log for a
//! fixed set of streams, assembles contiguous rows into logical
//! [`Change`]s, dispatches them to the consumer, and advances a monotone
//! time cursor. Each tick polls at most one `query_window`-sized slice of
//! the log, never closer to `now` than the confidence window allows, and
//! backs off according to whether the tick consumed rows, consumed
//! nothing, or failed.
//!
//! Shutdown is two-tier: the outer [`CancellationToken`] aborts promptly
//! at the next sleep, while [`ReaderHandle::close`] sets an end timestamp
//! the reader drains up to before exiting. [`ReaderHandle::stop_now`] is
//! the degenerate close that stops at the next wakeup.

use crate::change::{Change, ChangeRow, RowClass, StreamId};
use crate::config::ReaderConfig;
use crate::consumer::{ChangeConsumer, CreateConsumerInput};
use crate::error::CdcError;
use crate::metrics::{ReaderMetrics, ReaderMetricsSnapshot};
use crate::querier::ChangeRowQuerier;
use crate::timeuuid::Timeuuid;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// One-shot end signal, written at most once by the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndCondition {
    /// Drain windows up to and including this timestamp, then stop.
    StopAt(Timeuuid),
    /// Stop at the next wakeup without draining further.
    StopNow,
}

/// Why `run` returned.
#[derive(Debug)]
pub enum Termination {
    /// The end timestamp set by `close`/`stop_now` was reached.
    EndOfGeneration,
    /// The outer cancellation scope fired.
    Cancelled,
    /// The consumer could not be created or rejected a change.
    ConsumerError(CdcError),
}

impl Termination {
    /// True when the reader drained to its end timestamp.
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::EndOfGeneration)
    }
}

/// Final state of one `run`.
///
/// `last_timestamp` is always safe to persist and resume from: it never
/// moves past a logical change that was not fully consumed.
#[derive(Debug)]
pub struct RunSummary {
    /// The reader's final cursor.
    pub last_timestamp: Timeuuid,
    /// Why the loop exited.
    pub termination: Termination,
}

/// Outcome of one tick, selecting the adaptive delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    /// The confidence window had not moved; no query was issued.
    Skipped,
    /// The query succeeded and consumed at least one row.
    NonEmpty,
    /// The query succeeded but returned nothing.
    Empty,
    /// The query or its close failed; the window will be retried.
    Failed,
}

/// State shared between the loop and its handle.
#[derive(Debug, Default)]
struct Shared {
    end: OnceLock<EndCondition>,
    interrupt: Notify,
    metrics: ReaderMetrics,
}

/// External control over a running [`StreamBatchReader`].
///
/// `close` and `stop_now` are mutually exclusive and effective at most
/// once per reader; later invocations are ignored.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    shared: Arc<Shared>,
}

impl ReaderHandle {
    /// Request a graceful stop: the reader keeps polling until its cursor
    /// reaches `process_until`, then exits successfully.
    pub fn close(&self, process_until: Timeuuid) {
        let _ = self.shared.end.set(EndCondition::StopAt(process_until));
        self.shared.interrupt.notify_one();
    }

    /// Request an immediate stop at the next wakeup, without draining
    /// further windows.
    pub fn stop_now(&self) {
        let _ = self.shared.end.set(EndCondition::StopNow);
        self.shared.interrupt.notify_one();
    }

    /// Current metrics of the reader.
    pub fn metrics(&self) -> ReaderMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

/// Single-use polling loop over one shard's slice of the CDC log.
pub struct StreamBatchReader {
    config: ReaderConfig,
    stream_ids: Vec<StreamId>,
    keyspace: String,
    table: String,
    last_timestamp: Timeuuid,
    shared: Arc<Shared>,
}

impl StreamBatchReader {
    /// Create a reader resuming from `start_from` (exclusive), together
    /// with the handle that controls it.
    pub fn new(
        config: ReaderConfig,
        stream_ids: Vec<StreamId>,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        start_from: Timeuuid,
    ) -> (Self, ReaderHandle) {
        let shared = Arc::new(Shared::default());
        let reader = Self {
            config,
            stream_ids,
            keyspace: keyspace.into(),
            table: table.into(),
            last_timestamp: start_from,
            shared: shared.clone(),
        };
        (reader, ReaderHandle { shared })
    }

    /// Drive the polling loop until end-of-generation, cancellation, or a
    /// consumer failure.
    ///
    /// The returned cursor is safe to persist regardless of the
    /// termination kind.
    pub async fn run(mut self, shutdown: CancellationToken) -> RunSummary {
        let table_name = format!("{}.{}", self.keyspace, self.table);

        let input = CreateConsumerInput {
            table_name: table_name.clone(),
            stream_ids: self.stream_ids.clone(),
        };
        let mut consumer = match self.config.consumer_factory.create_consumer(input).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(table = %table_name, error = %e, "creating change consumer failed, reader will not start");
                return RunSummary {
                    last_timestamp: self.last_timestamp,
                    termination: Termination::ConsumerError(e),
                };
            }
        };

        let querier = ChangeRowQuerier::new(
            self.config.session.clone(),
            self.stream_ids.clone(),
            &self.keyspace,
            &self.table,
        );

        debug!(
            table = %table_name,
            streams = self.stream_ids.len(),
            start_from = %self.last_timestamp,
            "starting stream batch reader"
        );

        let termination = 'outer: loop {
            let (read_up_to, outcome) =
                match self.poll_window(&querier, consumer.as_mut()).await {
                    Ok(tick) => tick,
                    Err(fatal) => break Termination::ConsumerError(fatal),
                };
            self.last_timestamp = read_up_to;

            if self.reached_end(read_up_to) {
                break Termination::EndOfGeneration;
            }

            let advanced = &self.config.advanced;
            let delay = match outcome {
                TickOutcome::Failed => advanced.post_failed_query_delay,
                TickOutcome::NonEmpty => advanced.post_non_empty_query_delay,
                TickOutcome::Empty | TickOutcome::Skipped => advanced.post_empty_query_delay,
            };

            let deadline = Instant::now() + delay;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break 'outer Termination::Cancelled,
                    _ = self.shared.interrupt.notified() => {
                        if self.reached_end(read_up_to) {
                            break 'outer Termination::EndOfGeneration;
                        }
                        // end not reached yet; keep sleeping out the delay
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
        };

        consumer.end().await;
        debug!(
            table = %table_name,
            last_timestamp = %self.last_timestamp,
            termination = ?termination,
            "stream batch reader finished"
        );
        RunSummary {
            last_timestamp: self.last_timestamp,
            termination,
        }
    }

    /// One tick: compute the window, poll it, and assemble batches.
    ///
    /// Returns the effective read high-water mark plus the tick outcome;
    /// `Err` carries a fatal consumer failure. On a failed query or close
    /// the high-water mark only advances to the highest fully-consumed
    /// change time, so the unread tail of the window is retried and
    /// end-of-generation cannot be reached through a window that was
    /// never actually read.
    async fn poll_window(
        &mut self,
        querier: &ChangeRowQuerier,
        consumer: &mut dyn ChangeConsumer,
    ) -> Result<(Timeuuid, TickOutcome), CdcError> {
        let advanced = &self.config.advanced;
        let window_end = checked_add(self.last_timestamp.instant(), advanced.query_window);
        let confidence_end = chrono::Duration::from_std(advanced.confidence_window)
            .ok()
            .and_then(|lag| Utc::now().checked_sub_signed(lag))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let poll_end = Timeuuid::min_at(window_end.min(confidence_end));

        if self.last_timestamp >= poll_end {
            trace!("confidence window has not moved, skipping poll");
            return Ok((self.last_timestamp, TickOutcome::Skipped));
        }

        let started = Instant::now();
        let mut iter = match querier.query_range(self.last_timestamp, poll_end).await {
            Ok(iter) => iter,
            Err(e) => {
                warn!(error = %e, "range query failed, window will be retried");
                self.shared
                    .metrics
                    .record_failed_poll(started.elapsed(), 0);
                return Ok((self.last_timestamp, TickOutcome::Failed));
            }
        };

        let mut rows = 0usize;
        let mut preimage: Vec<ChangeRow> = Vec::new();
        let mut delta: Vec<ChangeRow> = Vec::new();
        let mut postimage: Vec<ChangeRow> = Vec::new();

        while let Some((key, row)) = iter.next().await {
            rows += 1;
            let end_of_batch = row.end_of_batch;
            match row.operation.classify() {
                RowClass::Preimage => preimage.push(row),
                RowClass::Postimage => postimage.push(row),
                RowClass::Delta => delta.push(row),
            }

            if end_of_batch {
                let change = Change {
                    stream_id: key.stream_id,
                    time: key.time,
                    preimage: std::mem::take(&mut preimage),
                    delta: std::mem::take(&mut delta),
                    postimage: std::mem::take(&mut postimage),
                };
                let time = change.time;
                if let Err(e) = consumer.consume(change).await {
                    error!(error = %e, "consumer rejected change, stopping reader");
                    let _ = iter.close().await;
                    return Err(e);
                }
                self.shared.metrics.record_change();
                // the cursor moves only at complete batch boundaries
                if self.last_timestamp < time {
                    self.last_timestamp = time;
                }
            }
        }

        match iter.close().await {
            Ok(()) => {
                self.shared
                    .metrics
                    .record_poll(started.elapsed(), rows);
                let outcome = if rows > 0 {
                    TickOutcome::NonEmpty
                } else {
                    TickOutcome::Empty
                };
                Ok((poll_end, outcome))
            }
            Err(e) => {
                warn!(error = %e, "iteration failed mid-window, unread tail will be retried");
                self.shared
                    .metrics
                    .record_failed_poll(started.elapsed(), rows);
                Ok((self.last_timestamp, TickOutcome::Failed))
            }
        }
    }

    fn reached_end(&self, window_end: Timeuuid) -> bool {
        match self.shared.end.get() {
            None => false,
            Some(EndCondition::StopNow) => true,
            Some(EndCondition::StopAt(end)) => *end <= window_end,
        }
    }
}

fn checked_add(instant: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
