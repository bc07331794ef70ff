//! Query execution over heap tables using a Volcano-style iterator model.
//!
//! Each operator pulls rows from its child on demand: resources are acquired
//! in `open()`, rows are produced one at a time by `next()`, and `close()`
//! releases them. `rewind()` restarts a stream without rebuilding the
//! operator tree, which is what a nested replay (or a retried plan) needs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use buffer::BufferPool;
//! use catalog::Catalog;
//! use executor::{execute_query, ExecutionContext, SeqScanExec};
//! use storage::PageStore;
//!
//! let catalog = Arc::new(Catalog::open("/tmp/db").unwrap());
//! let pool = Arc::new(BufferPool::new(
//!     Arc::clone(&catalog) as Arc<dyn PageStore>,
//!     64,
//! ));
//! let mut ctx = ExecutionContext::new(catalog, pool);
//!
//! let mut scan = SeqScanExec::for_table(&ctx, "users").unwrap();
//! let rows = execute_query(&mut scan, &mut ctx).unwrap();
//! ```

mod aggregate;
mod dml;
mod filter;
mod scan;

pub use aggregate::{AggregateExec, AggregateOp, Aggregator, IntAggregator, StringAggregator};
pub use dml::DeleteExec;
pub use filter::{FilterExec, Predicate};
pub use scan::SeqScanExec;

use std::sync::Arc;

use buffer::BufferPool;
use catalog::Catalog;
use common::{DbError, DbResult, Row, Schema, TransactionId};
use types::Value;

/// Volcano-style iterator interface shared by all operators.
///
/// An operator must be opened before `next()` or `rewind()` is called and
/// rejects both with `DbError::IllegalState` once closed.
pub trait Executor {
    /// Acquire resources and position the stream before the first row.
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Produce the next row, or `None` when the stream is exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>>;

    /// Restart the stream from the beginning without reopening.
    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Release resources. The operator cannot produce rows afterwards.
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Schema of the rows this operator produces.
    fn schema(&self) -> &Schema;
}

/// Shared state threaded through every operator call: the catalog for
/// metadata, the buffer pool for page access, and the transaction the work
/// is charged to.
pub struct ExecutionContext {
    pub catalog: Arc<Catalog>,
    pub pool: Arc<BufferPool>,
    pub tid: TransactionId,
}

impl ExecutionContext {
    /// Create a context running under a freshly allocated transaction.
    pub fn new(catalog: Arc<Catalog>, pool: Arc<BufferPool>) -> Self {
        Self::for_transaction(catalog, pool, TransactionId::new())
    }

    pub fn for_transaction(
        catalog: Arc<Catalog>,
        pool: Arc<BufferPool>,
        tid: TransactionId,
    ) -> Self {
        Self { catalog, pool, tid }
    }
}

/// Drive an operator tree to exhaustion and collect its rows.
pub fn execute_query(
    executor: &mut dyn Executor,
    ctx: &mut ExecutionContext,
) -> DbResult<Vec<Row>> {
    executor.open(ctx)?;

    let mut results = Vec::new();
    while let Some(row) = executor.next(ctx)? {
        results.push(row);
    }

    executor.close(ctx)?;
    Ok(results)
}

/// Run a mutation operator and return its affected-row count.
///
/// Mutation operators report their work as a single row holding one integer.
pub fn execute_dml(executor: &mut dyn Executor, ctx: &mut ExecutionContext) -> DbResult<u64> {
    executor.open(ctx)?;

    let result = executor
        .next(ctx)?
        .ok_or_else(|| DbError::Executor("mutation produced no result row".into()))?;

    executor.close(ctx)?;

    match result.values.first() {
        Some(Value::Int(count)) => Ok(*count as u64),
        Some(other) => Err(DbError::Executor(format!(
            "affected-row count must be an integer, got {other:?}"
        ))),
        None => Err(DbError::Executor("mutation result has no columns".into())),
    }
}
