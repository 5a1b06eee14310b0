//! Data model for CDC log rows and the logical changes assembled from them.
//!
//! One logical change spans one or more physical log rows sharing
//! `(stream_id, time)`: optional pre-image rows, at least one delta row,
//! optional post-image rows, with the last row flagged end-of-batch.

use crate::error::{CdcError, Result};
use crate::timeuuid::Timeuuid;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::fmt;

/// Opaque identifier of one CDC stream shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(Bytes);

impl StreamId {
    /// Create a stream id from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes of the stream id.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Operation recorded in the log's `cdc$operation` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    PreImage,
    RowUpdate,
    RowInsert,
    RowDelete,
    PartitionDelete,
    RangeDeleteStartInclusive,
    RangeDeleteStartExclusive,
    RangeDeleteEndInclusive,
    RangeDeleteEndExclusive,
    PostImage,
}

/// Coarse classification used when assembling a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    Preimage,
    Delta,
    Postimage,
}

impl OperationType {
    /// Decode the log's tinyint operation code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::PreImage),
            1 => Ok(Self::RowUpdate),
            2 => Ok(Self::RowInsert),
            3 => Ok(Self::RowDelete),
            4 => Ok(Self::PartitionDelete),
            5 => Ok(Self::RangeDeleteStartInclusive),
            6 => Ok(Self::RangeDeleteStartExclusive),
            7 => Ok(Self::RangeDeleteEndInclusive),
            8 => Ok(Self::RangeDeleteEndExclusive),
            9 => Ok(Self::PostImage),
            other => Err(CdcError::decode(format!(
                "unknown cdc$operation code: {other}"
            ))),
        }
    }

    /// The log's tinyint operation code.
    pub fn code(&self) -> u8 {
        match self {
            Self::PreImage => 0,
            Self::RowUpdate => 1,
            Self::RowInsert => 2,
            Self::RowDelete => 3,
            Self::PartitionDelete => 4,
            Self::RangeDeleteStartInclusive => 5,
            Self::RangeDeleteStartExclusive => 6,
            Self::RangeDeleteEndInclusive => 7,
            Self::RangeDeleteEndExclusive => 8,
            Self::PostImage => 9,
        }
    }

    /// Classify this operation for batch assembly; everything that is not
    /// a pre- or post-image row is part of the delta.
    pub fn classify(&self) -> RowClass {
        match self {
            Self::PreImage => RowClass::Preimage,
            Self::PostImage => RowClass::Postimage,
            _ => RowClass::Delta,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreImage => "PREIMAGE",
            Self::RowUpdate => "ROW UPDATE",
            Self::RowInsert => "ROW INSERT",
            Self::RowDelete => "ROW DELETE",
            Self::PartitionDelete => "PARTITION DELETE",
            Self::RangeDeleteStartInclusive => "RANGE DELETE START (INCLUSIVE)",
            Self::RangeDeleteStartExclusive => "RANGE DELETE START (EXCLUSIVE)",
            Self::RangeDeleteEndInclusive => "RANGE DELETE END (INCLUSIVE)",
            Self::RangeDeleteEndExclusive => "RANGE DELETE END (EXCLUSIVE)",
            Self::PostImage => "POSTIMAGE",
        };
        write!(f, "{name}")
    }
}

/// The stream columns shared by every row of one logical change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKey {
    /// Stream the row belongs to (`cdc$stream_id`).
    pub stream_id: StreamId,
    /// Timeuuid of the change (`cdc$time`).
    pub time: Timeuuid,
}

/// One physical row of the CDC log.
///
/// Payload columns are forwarded verbatim; the reader never interprets
/// them beyond the `cdc$`-prefixed metadata split out here.
#[derive(Debug, Clone)]
pub struct ChangeRow {
    /// Operation recorded for this row.
    pub operation: OperationType,
    /// Position of this row within its logical change (`cdc$batch_seq_no`).
    pub batch_seq_no: i32,
    /// True on the last row of the logical change (`cdc$end_of_batch`).
    pub end_of_batch: bool,
    /// Remaining columns of the log row.
    pub columns: Map<String, Value>,
}

impl ChangeRow {
    /// Look up a payload column by name.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }
}

/// A logical change assembled from consecutive log rows.
#[derive(Debug, Clone)]
pub struct Change {
    /// Stream the change belongs to.
    pub stream_id: StreamId,
    /// Timeuuid shared by all rows of the change.
    pub time: Timeuuid,
    /// Pre-image rows, possibly empty.
    pub preimage: Vec<ChangeRow>,
    /// Delta rows, at least one in a complete change.
    pub delta: Vec<ChangeRow>,
    /// Post-image rows, possibly empty.
    pub postimage: Vec<ChangeRow>,
}

impl Change {
    /// Total number of physical rows absorbed into this change.
    pub fn row_count(&self) -> usize {
        self.preimage.len() + self.delta.len() + self.postimage.len()
    }
}
