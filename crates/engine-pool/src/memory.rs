//! Scriptable in-memory engine for tests.
//!
//! Responses are keyed by exact SQL text. Unknown statements return a single
//! one-row batch. Every connection shares the same script and counters, so a
//! test can inspect what the pool did after the fact.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use arrow_array::{Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{BatchStream, Engine, EngineConnection, EngineStatement, QueryResult};
use crate::error::EngineError;

/// Single-column `Int64` batch.
#[must_use]
pub fn int64_batch(column: &str, values: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))])
        .unwrap_or_else(|_| RecordBatch::new_empty(Arc::new(Schema::empty())))
}

#[derive(Debug, Clone)]
enum Response {
    Batches(Vec<RecordBatch>),
    Error(String),
}

#[derive(Debug, Default)]
struct MemoryShared {
    responses: Mutex<HashMap<String, Response>>,
    tables: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    batch_delay: Mutex<Duration>,
    send_delay: Mutex<Duration>,
    fail_connect: AtomicBool,
    connections_opened: AtomicUsize,
    connections_closed: AtomicUsize,
    statements_closed: AtomicUsize,
    cancel_requests: AtomicUsize,
}

impl MemoryShared {
    fn record(&self, sql: &str) {
        self.executed.lock().push(sql.to_string());
    }

    fn response(&self, sql: &str) -> Response {
        self.responses
            .lock()
            .get(sql)
            .cloned()
            .unwrap_or_else(|| Response::Batches(vec![int64_batch("value", &[1])]))
    }

    fn delay(&self) -> Duration {
        *self.batch_delay.lock()
    }

    async fn run(&self, sql: &str) -> Result<QueryResult, EngineError> {
        match self.response(sql) {
            Response::Batches(batches) => {
                let delay = self.delay();
                if !delay.is_zero() {
                    for _ in &batches {
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(QueryResult::new(batches))
            }
            Response::Error(message) => Err(EngineError::new(message)),
        }
    }

    async fn start(&self) {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn stream(&self, sql: &str) -> BatchStream {
        let delay = self.delay();
        let items: Vec<Result<RecordBatch, EngineError>> = match self.response(sql) {
            Response::Batches(batches) => batches.into_iter().map(Ok).collect(),
            Response::Error(message) => vec![Err(EngineError::new(message))],
        };
        stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed()
    }
}

/// In-memory [`Engine`] with canned responses and call counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<MemoryShared>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `batches`.
    pub fn respond(&self, sql: impl Into<String>, batches: Vec<RecordBatch>) {
        self.shared
            .responses
            .lock()
            .insert(sql.into(), Response::Batches(batches));
    }

    /// Fail `sql` with an engine error carrying `message`. Streaming calls
    /// yield the error as their first item.
    pub fn fail(&self, sql: impl Into<String>, message: impl Into<String>) {
        self.shared
            .responses
            .lock()
            .insert(sql.into(), Response::Error(message.into()));
    }

    /// Delay before each produced batch.
    pub fn set_batch_delay(&self, delay: Duration) {
        *self.shared.batch_delay.lock() = delay;
    }

    /// Delay before `send` hands back its stream and before `prepare`
    /// returns.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.shared.send_delay.lock() = delay;
    }

    pub fn set_tables(&self, tables: &[&str]) {
        *self.shared.tables.lock() = tables.iter().map(ToString::to_string).collect();
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// SQL text of every executed call, in order. Prepared executions are
    /// recorded as `EXECUTE <sql>` followed by the JSON parameter array, if
    /// any.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.shared.executed.lock().clone()
    }

    #[must_use]
    pub fn connections_opened(&self) -> usize {
        self.shared.connections_opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connections_closed(&self) -> usize {
        self.shared.connections_closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn statements_closed(&self) -> usize {
        self.shared.statements_closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cancel_requests(&self) -> usize {
        self.shared.cancel_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, EngineError> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(EngineError::new("connection refused"));
        }
        let id = self.shared.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    id: usize,
    shared: Arc<MemoryShared>,
}

impl MemoryConnection {
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl EngineConnection for MemoryConnection {
    type Statement = MemoryStatement;

    async fn query(&self, sql: &str) -> Result<QueryResult, EngineError> {
        self.shared.record(sql);
        self.shared.run(sql).await
    }

    async fn send(&self, sql: &str) -> Result<BatchStream, EngineError> {
        self.shared.record(sql);
        self.shared.start().await;
        Ok(self.shared.stream(sql))
    }

    async fn prepare(&self, sql: &str) -> Result<MemoryStatement, EngineError> {
        self.shared.start().await;
        if let Response::Error(message) = self.shared.response(sql) {
            return Err(EngineError::new(message));
        }
        Ok(MemoryStatement {
            sql: sql.to_string(),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn table_names(&self, sql: &str) -> Result<Vec<String>, EngineError> {
        self.shared.record(sql);
        Ok(self.shared.tables.lock().clone())
    }

    async fn cancel_sent(&self) -> Result<bool, EngineError> {
        self.shared.cancel_requests.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.shared.connections_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn execute_label(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        format!("EXECUTE {sql}")
    } else {
        format!("EXECUTE {sql} {}", Value::from(params.to_vec()))
    }
}

#[derive(Debug)]
pub struct MemoryStatement {
    sql: String,
    shared: Arc<MemoryShared>,
}

#[async_trait]
impl EngineStatement for MemoryStatement {
    async fn query(&self, params: &[Value]) -> Result<QueryResult, EngineError> {
        self.shared.record(&execute_label(&self.sql, params));
        self.shared.run(&self.sql).await
    }

    async fn send(&self, params: &[Value]) -> Result<BatchStream, EngineError> {
        self.shared.record(&execute_label(&self.sql, params));
        self.shared.start().await;
        Ok(self.shared.stream(&self.sql))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.shared.statements_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
