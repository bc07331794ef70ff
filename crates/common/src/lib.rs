
pub mod pretty;

use serde::{Deserialize, Serialize};
use std::{
    io,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use types::{FieldType, Value};

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Logical page number within a table's backing file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Fully-qualified page identity: the cache key and the unit of file
/// addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub table: TableId,
    pub page: PageId,
}

impl PageKey {
    pub fn new(table: TableId, page: PageId) -> Self {
        Self { table, page }
    }
}

/// Non-owning descriptor of where a row is stored: page identity plus slot
/// index. A row carrying a `RecordId` stays valid after its page is evicted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page: PageKey,
    pub slot: u16,
}

/// Opaque transaction token threaded through cache and operator calls.
///
/// This layer only records it on dirtied pages; locking and recovery belong
/// to a future layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TransactionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Requested access level for a page fetch. Recorded for the future lock
/// layer; enforces no exclusion in this core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A named, typed column within a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub field_type: FieldType,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered list of columns. Immutable once constructed; names need not be
/// unique and are ignored for binary compatibility.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn field_type(&self, idx: usize) -> Option<FieldType> {
        self.columns.get(idx).map(|c| c.field_type)
    }

    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(|c| c.name.as_str())
    }

    /// Total serialized width of one row, computable without reading data.
    pub fn row_bytes(&self) -> usize {
        self.columns.iter().map(|c| c.field_type.wire_len()).sum()
    }

    /// Binary compatibility: identical type sequence, names ignored.
    pub fn type_compatible(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

/// Positional row backed by `types::Value`, optionally tagged with the
/// location it was materialized from. Synthesized rows (aggregation results,
/// delete summaries) carry no location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    #[serde(skip)]
    #[serde(default)]
    rid: Option<RecordId>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Checks that the row's value variants match `schema`'s type sequence.
    pub fn matches_schema(&self, schema: &Schema) -> bool {
        self.values.len() == schema.len()
            && self
                .values
                .iter()
                .zip(schema.columns())
                .all(|(v, c)| v.field_type() == c.field_type)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Canonical error type shared across the storage and execution layers.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("corrupt page: {0}")]
    CorruptPage(String),
    #[error("page full")]
    PageFull,
    #[error("slot {0} is empty")]
    EmptySlot(u16),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("cache full: {0}")]
    CacheFull(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("unsupported aggregation operator: {0}")]
    UnsupportedOperator(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("exec: {0}")]
    Executor(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_pages(64)
///     .build();
/// assert_eq!(config.buffer_pool_pages, 64);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table files and catalog metadata live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Number of pages the buffer pool keeps resident.
    #[builder(default = 64)]
    pub buffer_pool_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            buffer_pool_pages: 64,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        AccessMode, Column, Config, DbError, DbResult, PageId, PageKey, RecordId, Row, Schema,
        TableId, TransactionId,
    };
    pub use types::{CmpOp, FieldType, Value};
}
