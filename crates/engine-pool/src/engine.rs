//! Seam between the pool and the embedded engine.
//!
//! The pool owns connections produced by an [`Engine`] and drives them only
//! through these traits, so any engine binding (or the in-memory test engine)
//! can sit underneath.

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::EngineError;

/// Asynchronous cursor over result batches.
pub type BatchStream = BoxStream<'static, Result<RecordBatch, EngineError>>;

/// Statement type produced by an engine's connections.
pub type StatementOf<E> = <<E as Engine>::Connection as EngineConnection>::Statement;

/// Factory for physical engine connections.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    type Connection: EngineConnection;

    async fn connect(&self) -> Result<Self::Connection, EngineError>;
}

/// One physical connection. Operations on a single connection are serialized
/// by its owner; distinct connections may run concurrently.
#[async_trait]
pub trait EngineConnection: Send + Sync + 'static {
    type Statement: EngineStatement;

    /// Run `sql` to completion.
    async fn query(&self, sql: &str) -> Result<QueryResult, EngineError>;

    /// Start `sql` and return a cursor over its batches.
    async fn send(&self, sql: &str) -> Result<BatchStream, EngineError>;

    async fn prepare(&self, sql: &str) -> Result<Self::Statement, EngineError>;

    /// Names of the tables `sql` reads.
    async fn table_names(&self, sql: &str) -> Result<Vec<String>, EngineError>;

    /// Ask the engine to stop the statement most recently sent on this
    /// connection. Completion of the returned future is the acknowledgement;
    /// the result reports whether anything was running.
    async fn cancel_sent(&self) -> Result<bool, EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}

/// A compiled statement bound to one connection.
#[async_trait]
pub trait EngineStatement: Send + Sync + 'static {
    async fn query(&self, params: &[Value]) -> Result<QueryResult, EngineError>;

    async fn send(&self, params: &[Value]) -> Result<BatchStream, EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}

/// Fully materialized query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    batches: Vec<RecordBatch>,
}

impl QueryResult {
    #[must_use]
    pub const fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    #[must_use]
    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    /// Total rows across all batches.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Schema of the first batch, if any.
    #[must_use]
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}

impl From<Vec<RecordBatch>> for QueryResult {
    fn from(batches: Vec<RecordBatch>) -> Self {
        Self::new(batches)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn batch(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap()
    }

    #[test]
    fn test_query_result_row_count() {
        let result = QueryResult::new(vec![batch(&[1, 2]), batch(&[3])]);
        assert_eq!(result.num_rows(), 3);
        assert!(!result.is_empty());
        assert_eq!(result.schema().unwrap().field(0).name(), "v");
        assert_eq!(result.batches().len(), 2);
    }

    #[test]
    fn test_empty_result() {
        let result = QueryResult::default();
        assert!(result.is_empty());
        assert!(result.schema().is_none());
        assert!(result.into_batches().is_empty());
    }
}
