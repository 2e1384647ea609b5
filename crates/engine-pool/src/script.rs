//! Validated script execution on one pooled connection.
//!
//! A script is split, classified and validated first; an invalid script never
//! touches the engine. Valid scripts run statement by statement on a single
//! connection, wrapped in a transaction when any statement needs one. A
//! failure or cancellation rolls the transaction back.

use std::collections::HashSet;

use sql_script::{ClassifiedStatement, analyze, needs_transaction};
use tokio_util::sync::CancellationToken;

use crate::connection::PooledConnection;
use crate::engine::{Engine, QueryResult};
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;

pub const BEGIN_TRANSACTION: &str = "BEGIN TRANSACTION";
pub const COMMIT: &str = "COMMIT";
pub const ROLLBACK: &str = "ROLLBACK";

/// Result of a completed script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptReport {
    /// Statements executed, excluding transaction control.
    pub statements: usize,
    /// Whether the script ran inside `BEGIN TRANSACTION` / `COMMIT`.
    pub transactional: bool,
    /// One result per statement, in script order.
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    /// Validation failed; nothing was executed.
    Invalid(Vec<String>),
    Completed(ScriptReport),
    /// The caller cancelled; any transaction was rolled back.
    Aborted,
}

impl ScriptOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Runs classified statements on one connection.
#[derive(Debug)]
pub struct ScriptExecutor<'a, E: Engine> {
    connection: &'a PooledConnection<E>,
    token: &'a CancellationToken,
}

impl<'a, E: Engine> ScriptExecutor<'a, E> {
    pub const fn new(connection: &'a PooledConnection<E>, token: &'a CancellationToken) -> Self {
        Self { connection, token }
    }

    /// Execute `statements` in order, wrapping them in a transaction when any
    /// of them needs one. Statements are assumed to be validated.
    pub async fn execute(&self, statements: &[ClassifiedStatement]) -> Result<ScriptOutcome> {
        let transactional = needs_transaction(statements);
        if transactional {
            self.connection.query(BEGIN_TRANSACTION).await?;
        }

        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            let result = tokio::select! {
                biased;
                () = self.token.cancelled() => None,
                result = self.connection.query(statement.code()) => Some(result),
            };

            match result {
                None => {
                    if let Err(e) = self.connection.cancel_sent().await {
                        tracing::warn!(error = %e, "cancel request failed during script abort");
                    }
                    if transactional {
                        self.rollback().await;
                    }
                    tracing::info!(statement = index + 1, "script aborted");
                    return Ok(ScriptOutcome::Aborted);
                }
                Some(Ok(result)) => results.push(result),
                Some(Err(e)) => {
                    if transactional {
                        self.rollback().await;
                    }
                    return Err(match e {
                        Error::Engine(source) => Error::ScriptStatement {
                            index: index + 1,
                            line: statement.line_number(),
                            source,
                        },
                        other => other,
                    });
                }
            }
        }

        if transactional && let Err(e) = self.connection.query(COMMIT).await {
            self.rollback().await;
            return Err(e);
        }

        tracing::debug!(statements = results.len(), transactional, "script completed");
        Ok(ScriptOutcome::Completed(ScriptReport {
            statements: results.len(),
            transactional,
            results,
        }))
    }

    async fn rollback(&self) {
        if let Err(e) = self.connection.query(ROLLBACK).await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

impl<E: Engine> ConnectionPool<E> {
    /// Validate `script` against `protected` and, if valid, run it on one
    /// pooled connection.
    pub async fn run_script(
        &self,
        script: &str,
        protected: &HashSet<String>,
        token: &CancellationToken,
    ) -> Result<ScriptOutcome> {
        let analysis = analyze(script, protected);
        if !analysis.is_valid() {
            tracing::debug!(errors = analysis.errors.len(), "script rejected");
            return Ok(ScriptOutcome::Invalid(analysis.errors));
        }

        let connection = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(ScriptOutcome::Aborted),
            connection = self.get_pooled_connection() => connection?,
        };
        let outcome = ScriptExecutor::new(&connection, token)
            .execute(&analysis.statements)
            .await;
        connection.close().await;
        outcome
    }
}
