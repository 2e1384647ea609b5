use std::time::Duration;

use thiserror::Error;

/// Opaque failure surfaced by the embedded engine.
///
/// The pool never inspects or retries engine errors; they are passed through
/// unchanged inside [`Error::Engine`].
#[derive(Error, Debug)]
#[error("Engine error: {message}")]
pub struct EngineError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl EngineError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("No connection slot available within {0:?}")]
    PoolTimeout(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("A streaming reader is still active on this connection")]
    ReaderActive,

    #[error("A prepared statement is still active on this connection")]
    StatementActive,

    #[error("A query is still running on this connection")]
    QueryActive,

    #[error("Prepared statement is closed")]
    StatementClosed,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Script statement {index} (line {line}) failed: {source}")]
    ScriptStatement {
        index: usize,
        line: usize,
        #[source]
        source: EngineError,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::PoolTimeout(_))
    }

    #[must_use]
    pub const fn is_pool_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    /// Caller broke the one-active-operation discipline or used a closed
    /// handle.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::ReaderActive
                | Self::StatementActive
                | Self::QueryActive
                | Self::StatementClosed
        )
    }

    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_) | Self::ScriptStatement { .. })
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Outcome of an operation the caller cancelled.
///
/// Returned as the `Err` side of an inner `Result`; it is not a failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation aborted")]
pub struct Aborted;

pub type Result<T> = std::result::Result<T, Error>;
