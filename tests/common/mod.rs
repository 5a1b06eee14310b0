//! Shared fixtures: an in-memory CDC log session and a recording consumer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tidestream_cdc::{
    CdcError, Change, ChangeConsumer, ChangeRow, ConsumerFactory, CreateConsumerInput, LogSession,
    OperationType, RangeQuery, RawRowStream, ReaderConfig, Result, StreamId, StreamKey, Timeuuid,
};
use tokio::time::Instant;

pub fn stream(byte: u8) -> StreamId {
    StreamId::new(vec![byte])
}

pub fn row(operation: OperationType, seq: i32, end_of_batch: bool) -> ChangeRow {
    let mut columns = Map::new();
    columns.insert("v".to_string(), json!(seq));
    ChangeRow {
        operation,
        batch_seq_no: seq,
        end_of_batch,
        columns,
    }
}

pub fn delta_row(seq: i32, end_of_batch: bool) -> ChangeRow {
    row(OperationType::RowUpdate, seq, end_of_batch)
}

pub fn at(base: DateTime<Utc>, offset_secs: i64) -> Timeuuid {
    Timeuuid::min_at(base + chrono::Duration::seconds(offset_secs))
}

/// How one issued query behaves.
#[derive(Debug, Clone, Copy)]
pub enum QueryBehavior {
    /// Serve the matching rows.
    Serve,
    /// Fail the query itself.
    FailQuery,
    /// Serve the first `n` matching rows, then fail iteration.
    FailAfter(usize),
}

/// Bounds and wall-clock instant of one issued query.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub lower: Timeuuid,
    pub upper: Timeuuid,
    pub at: Instant,
}

#[derive(Default)]
struct LogState {
    rows: Vec<(StreamKey, ChangeRow)>,
    queries: Vec<QueryRecord>,
    script: VecDeque<QueryBehavior>,
}

/// In-memory CDC log shared with a [`MemoryLogSession`].
#[derive(Clone, Default)]
pub struct MemoryLog {
    state: Arc<Mutex<LogState>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the rows of one logical change at `time`.
    pub fn push_change(&self, stream_id: StreamId, time: Timeuuid, rows: Vec<ChangeRow>) {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.rows.push((
                StreamKey {
                    stream_id: stream_id.clone(),
                    time,
                },
                row,
            ));
        }
    }

    /// Queue per-query behaviors; queries beyond the script serve rows.
    pub fn script(&self, behaviors: impl IntoIterator<Item = QueryBehavior>) {
        self.state.lock().unwrap().script.extend(behaviors);
    }

    /// Bounds and instants of every query issued so far.
    pub fn queries(&self) -> Vec<QueryRecord> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn session(&self) -> Arc<MemoryLogSession> {
        Arc::new(MemoryLogSession { log: self.clone() })
    }
}

/// [`LogSession`] over a [`MemoryLog`].
pub struct MemoryLogSession {
    log: MemoryLog,
}

#[async_trait]
impl LogSession for MemoryLogSession {
    async fn query(&self, query: &RangeQuery) -> Result<Box<dyn RawRowStream>> {
        let mut state = self.log.state.lock().unwrap();
        state.queries.push(QueryRecord {
            lower: query.lower_exclusive,
            upper: query.upper_inclusive,
            at: Instant::now(),
        });
        let behavior = state.script.pop_front().unwrap_or(QueryBehavior::Serve);

        if matches!(behavior, QueryBehavior::FailQuery) {
            return Err(CdcError::query("injected query failure"));
        }

        let mut rows: Vec<(StreamKey, ChangeRow)> = state
            .rows
            .iter()
            .filter(|(key, _)| {
                query.stream_ids.contains(&key.stream_id)
                    && key.time > query.lower_exclusive
                    && key.time <= query.upper_inclusive
            })
            .cloned()
            .collect();
        rows.sort_by(|(ka, ra), (kb, rb)| {
            (&ka.stream_id, ka.time, ra.batch_seq_no).cmp(&(&kb.stream_id, kb.time, rb.batch_seq_no))
        });

        let fail_after = match behavior {
            QueryBehavior::FailAfter(n) => Some(n),
            _ => None,
        };
        Ok(Box::new(MemoryRowStream {
            rows: rows.into(),
            fail_after,
        }))
    }
}

struct MemoryRowStream {
    rows: VecDeque<(StreamKey, ChangeRow)>,
    fail_after: Option<usize>,
}

#[async_trait]
impl RawRowStream for MemoryRowStream {
    async fn next_row(&mut self) -> Result<Option<(StreamKey, ChangeRow)>> {
        if let Some(remaining) = self.fail_after {
            if remaining == 0 {
                return Err(CdcError::query("injected iteration failure"));
            }
            self.fail_after = Some(remaining - 1);
        }
        Ok(self.rows.pop_front())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Observable state shared by a [`RecordingFactory`] and its consumers.
#[derive(Default)]
pub struct ConsumerProbe {
    changes: Mutex<Vec<Change>>,
    consumed: AtomicUsize,
    ended: AtomicUsize,
}

impl ConsumerProbe {
    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().unwrap().clone()
    }

    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

/// Factory producing consumers that record everything they see.
pub struct RecordingFactory {
    pub probe: Arc<ConsumerProbe>,
    /// Fail `create_consumer` itself.
    pub fail_factory: bool,
    /// Fail the consume call with this zero-based index.
    pub fail_consume_at: Option<usize>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(ConsumerProbe::default()),
            fail_factory: false,
            fail_consume_at: None,
        }
    }

    pub fn failing_factory() -> Self {
        Self {
            fail_factory: true,
            ..Self::new()
        }
    }

    pub fn failing_consume_at(index: usize) -> Self {
        Self {
            fail_consume_at: Some(index),
            ..Self::new()
        }
    }
}

impl Default for RecordingFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsumerFactory for RecordingFactory {
    async fn create_consumer(&self, _input: CreateConsumerInput) -> Result<Box<dyn ChangeConsumer>> {
        if self.fail_factory {
            return Err(CdcError::consumer("injected factory failure"));
        }
        Ok(Box::new(RecordingConsumer {
            probe: self.probe.clone(),
            fail_consume_at: self.fail_consume_at,
        }))
    }
}

struct RecordingConsumer {
    probe: Arc<ConsumerProbe>,
    fail_consume_at: Option<usize>,
}

#[async_trait]
impl ChangeConsumer for RecordingConsumer {
    async fn consume(&mut self, change: Change) -> Result<()> {
        let index = self.probe.consumed.fetch_add(1, Ordering::SeqCst);
        if self.fail_consume_at == Some(index) {
            return Err(CdcError::consumer("injected consume failure"));
        }
        self.probe.changes.lock().unwrap().push(change);
        Ok(())
    }

    async fn end(&mut self) {
        self.probe.ended.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn reader_config(
    log: &MemoryLog,
    factory: RecordingFactory,
    advanced: tidestream_cdc::AdvancedReaderConfig,
) -> (ReaderConfig, Arc<ConsumerProbe>) {
    let probe = factory.probe.clone();
    let config = ReaderConfig::new(log.session(), Arc::new(factory)).with_advanced(advanced);
    (config, probe)
}
