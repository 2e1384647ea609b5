use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::connection::{Pending, SessionInner};
use crate::engine::{Engine, EngineStatement, QueryResult, StatementOf};
use crate::error::{Error, Result};
use crate::pool::cancel_in_flight;
use crate::reader::{PooledStreamReader, ReaderCore, ReaderState, ReleaseCallback};

#[derive(Default)]
struct StatementState {
    closed: bool,
    /// `query` or `send` is waiting on the engine.
    running: Option<Pending>,
    reader: Option<Arc<ReaderCore>>,
}

pub(crate) struct StatementInner<E: Engine> {
    session: Weak<SessionInner<E>>,
    statement: StatementOf<E>,
    state: Mutex<StatementState>,
    settled: Notify,
}

impl<E: Engine> StatementInner<E> {
    pub(crate) fn new(session: Weak<SessionInner<E>>, statement: StatementOf<E>) -> Self {
        Self {
            session,
            statement,
            state: Mutex::new(StatementState::default()),
            settled: Notify::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Fails unless both the statement and its session are open and the
    /// statement has nothing running.
    fn check(&self, state: &StatementState) -> Result<()> {
        if state.closed {
            return Err(Error::StatementClosed);
        }
        match self.session.upgrade() {
            Some(session) if !session.is_closed() => {}
            _ => return Err(Error::ConnectionClosed),
        }
        match state.running {
            Some(Pending::Query) => Err(Error::QueryActive),
            Some(_) => Err(Error::ReaderActive),
            None if state.reader.is_some() => Err(Error::ReaderActive),
            None => Ok(()),
        }
    }

    fn begin(&self, pending: Pending) -> Result<RunningGuard<'_, E>> {
        let mut state = self.state.lock();
        self.check(&state)?;
        state.running = Some(pending);
        Ok(RunningGuard {
            statement: self,
            armed: true,
        })
    }

    /// Close the active reader, if any. Returns whether one was open.
    pub(crate) async fn cancel_reader(&self) -> bool {
        let reader = self.state.lock().reader.clone();
        match reader {
            Some(reader) => {
                reader.close().await;
                true
            }
            None => false,
        }
    }

    fn clear_reader(&self) {
        self.state.lock().reader = None;
    }

    /// Wait for a running `query` or `send`, cancel the active reader, close
    /// the engine statement and return the session to idle. Idempotent.
    pub(crate) async fn close(&self) -> Result<()> {
        let mut marked = false;
        let reader = loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if !marked {
                    if state.closed {
                        return Ok(());
                    }
                    state.closed = true;
                    marked = true;
                }
                if state.running.is_none() {
                    break state.reader.take();
                }
            }

            notified.await;
        };

        if let Some(reader) = reader {
            reader.close().await;
        }
        let result = self.statement.close().await;
        if let Some(session) = self.session.upgrade() {
            session.clear_statement(self);
        }
        tracing::debug!("prepared statement closed");
        Ok(result?)
    }
}

/// Clears a statement's reader when it closes.
struct StatementRelease<E: Engine> {
    statement: Weak<StatementInner<E>>,
}

#[async_trait]
impl<E: Engine> ReleaseCallback for StatementRelease<E> {
    async fn on_close(&self, outcome: ReaderState) {
        let Some(statement) = self.statement.upgrade() else {
            return;
        };
        if outcome == ReaderState::Cancelled
            && let Some(session) = statement.session.upgrade()
            && !session.slot().is_released()
        {
            cancel_in_flight(session.slot().connection()).await;
        }
        statement.clear_reader();
    }

    fn on_detach(&self) {
        if let Some(statement) = self.statement.upgrade() {
            statement.clear_reader();
        }
    }
}

/// Clears `running` and wakes a pending `close` unless a reader was
/// installed.
struct RunningGuard<'a, E: Engine> {
    statement: &'a StatementInner<E>,
    armed: bool,
}

impl<E: Engine> RunningGuard<'_, E> {
    /// Install `reader` unless the statement was closed meanwhile.
    fn commit(&mut self, reader: Arc<ReaderCore>) -> bool {
        let mut state = self.statement.state.lock();
        if state.closed {
            return false;
        }
        state.running = None;
        state.reader = Some(reader);
        self.armed = false;
        true
    }
}

impl<E: Engine> Drop for RunningGuard<'_, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.statement.state.lock().running = None;
        self.statement.settled.notify_waiters();
    }
}

/// Compiled statement bound to a [`PooledConnection`](crate::PooledConnection).
///
/// While open, its connection refuses other readers and statements. The
/// statement itself runs one operation at a time: `query` or `send` fail with
/// [`Error::QueryActive`] while a query runs and with [`Error::ReaderActive`]
/// while a reader it produced is still open.
pub struct PooledPreparedStatement<E: Engine> {
    inner: Arc<StatementInner<E>>,
}

impl<E: Engine> fmt::Debug for PooledPreparedStatement<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledPreparedStatement")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E: Engine> PooledPreparedStatement<E> {
    pub(crate) const fn new(inner: Arc<StatementInner<E>>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Execute with `params` and collect the result.
    pub async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        let _running = self.inner.begin(Pending::Query)?;
        Ok(self.inner.statement.query(params).await?)
    }

    /// Execute with `params` and stream the result.
    pub async fn send(&self, params: &[Value]) -> Result<PooledStreamReader> {
        let mut running = self.inner.begin(Pending::Reader)?;
        let stream = self.inner.statement.send(params).await?;
        let reader = PooledStreamReader::new(
            stream,
            Arc::new(StatementRelease {
                statement: Arc::downgrade(&self.inner),
            }),
        );

        if !running.commit(reader.core()) {
            reader.close().await;
            return Err(Error::StatementClosed);
        }
        Ok(reader)
    }

    /// Cancel the active reader and release the statement. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

impl<E: Engine> Drop for PooledPreparedStatement<E> {
    fn drop(&mut self) {
        if self.inner.is_closed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    if let Err(e) = inner.close().await {
                        tracing::warn!(error = %e, "failed to close dropped prepared statement");
                    }
                });
            }
            Err(_) => {
                self.inner.state.lock().closed = true;
                if let Some(session) = self.inner.session.upgrade() {
                    session.clear_statement(&self.inner);
                }
            }
        }
    }
}
