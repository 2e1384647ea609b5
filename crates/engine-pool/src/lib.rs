//! Bounded connection pool and script-execution safety layer for an embedded
//! analytical engine.
//!
//! - [`ConnectionPool`] multiplexes callers onto at most `max_size` engine
//!   connections, with one-off `query`/`send`/`get_table_names`, cancellable
//!   variants, and [`PooledConnection`] sessions.
//! - [`PooledStreamReader`] and [`PooledPreparedStatement`] enforce one active
//!   operation per connection and release their slot exactly once.
//! - [`ConnectionPool::run_script`] validates a multi-statement script with
//!   [`sql_script`] and runs it on one connection, inside a transaction when
//!   needed.
//!
//! The engine itself is abstracted by the [`Engine`], [`EngineConnection`]
//! and [`EngineStatement`] traits.

pub mod config;
mod connection;
pub mod engine;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(feature = "metrics")]
pub mod metrics;
mod pool;
mod reader;
pub mod script;
mod statement;

pub use config::PoolConfig;
pub use connection::PooledConnection;
pub use engine::{BatchStream, Engine, EngineConnection, EngineStatement, QueryResult};
pub use error::{Aborted, EngineError, Error, Result};
pub use pool::{ConnectionPool, PoolStatus, SlotHandle};
pub use reader::{PooledStreamReader, ReaderState};
pub use script::{ScriptExecutor, ScriptOutcome, ScriptReport};
pub use statement::PooledPreparedStatement;
pub use tokio_util::sync::CancellationToken;
