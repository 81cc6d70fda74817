//! Remote data store seam
//!
//! The coordinator and the upload pipeline talk to the remote store only
//! through [`RemoteStore`]: filtered, ranged, sorted list queries with an
//! exact total count, and single-row insert/update/delete by id. Rows are
//! untyped JSON objects; `crate::models` converts them to typed records.

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// One stored row
pub type Row = Map<String, Value>;

/// Remote store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Store returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// column = value
    Eq { column: String, value: Value },
    /// Case-insensitive LIKE; `%` matches any run, `_` one character
    ILike { column: String, pattern: String },
    /// column >= value
    Gte { column: String, value: Value },
    /// column <= value
    Lte { column: String, value: Value },
    /// column is one of values
    In { column: String, values: Vec<Value> },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::Eq { column, .. }
            | Predicate::ILike { column, .. }
            | Predicate::Gte { column, .. }
            | Predicate::Lte { column, .. }
            | Predicate::In { column, .. } => column,
        }
    }
}

/// Row window: `limit` rows starting at `offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub offset: u64,
    pub limit: u64,
}

/// Sort order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub ascending: bool,
}

/// List query: all predicates must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub range: Option<RowRange>,
    pub sort: Option<Sort>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::Eq {
            column: column.into(),
            value: value.into(),
        })
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some(RowRange { offset, limit });
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.sort = Some(Sort {
            column: column.into(),
            ascending,
        });
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub rows: Vec<Row>,
    /// Rows matching the predicates, ignoring the range
    pub total_count: u64,
}

/// Remote data store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List rows matching `query`
    async fn query(&self, table: &str, query: &Query) -> StoreResult<QueryPage>;

    /// Insert a row, returning it as stored (with generated columns)
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Merge `patch` into the row with this id, returning the updated row
    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResult<Row>;

    /// Delete the row with this id
    async fn delete(&self, table: &str, id: &str) -> StoreResult<()>;
}
