//! Session-scoped connection borrowed from the pool.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::engine::{Engine, EngineConnection, QueryResult};
use crate::error::{Error, Result};
use crate::pool::{SlotHandle, cancel_in_flight};
use crate::reader::{PooledStreamReader, ReaderCore, ReaderState, ReleaseCallback};
use crate::statement::{PooledPreparedStatement, StatementInner};

/// The single operation a session may have open.
pub(crate) enum Activity<E: Engine> {
    Idle,
    /// `query`, `send` or `prepare` is waiting on the engine.
    Starting(Pending),
    Reader(Arc<ReaderCore>),
    Statement(Arc<StatementInner<E>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    Reader,
    Statement,
    Query,
}

struct SessionState<E: Engine> {
    closed: bool,
    activity: Activity<E>,
}

impl<E: Engine> SessionState<E> {
    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        match self.activity {
            Activity::Idle => Ok(()),
            Activity::Reader(_) | Activity::Starting(Pending::Reader) => Err(Error::ReaderActive),
            Activity::Statement(_) | Activity::Starting(Pending::Statement) => {
                Err(Error::StatementActive)
            }
            Activity::Starting(Pending::Query) => Err(Error::QueryActive),
        }
    }
}

pub(crate) struct SessionInner<E: Engine> {
    slot: SlotHandle<E>,
    state: Mutex<SessionState<E>>,
    /// Signalled when a `Starting` activity settles.
    settled: Notify,
}

impl<E: Engine> SessionInner<E> {
    pub(crate) const fn slot(&self) -> &SlotHandle<E> {
        &self.slot
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn reserve(&self, pending: Pending) -> Result<Reservation<'_, E>> {
        let mut state = self.state.lock();
        state.check()?;
        state.activity = Activity::Starting(pending);
        Ok(Reservation {
            session: self,
            armed: true,
        })
    }

    fn clear_reader(&self) {
        let mut state = self.state.lock();
        if matches!(state.activity, Activity::Reader(_)) {
            state.activity = Activity::Idle;
        }
    }

    /// Return to idle if `statement` is the session's open statement.
    pub(crate) fn clear_statement(&self, statement: &StatementInner<E>) {
        let mut state = self.state.lock();
        if let Activity::Statement(open) = &state.activity
            && std::ptr::eq(Arc::as_ptr(open), statement)
        {
            state.activity = Activity::Idle;
        }
    }

    /// Marks the session closed at once, then waits for an in-flight
    /// `query`, `send` or `prepare` to return before tearing down. A late
    /// `send` or `prepare` disposes of its own result first.
    async fn close(&self) {
        let mut marked = false;
        let activity = loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if !marked {
                    if state.closed {
                        return;
                    }
                    state.closed = true;
                    marked = true;
                }
                if !matches!(state.activity, Activity::Starting(_)) {
                    break std::mem::replace(&mut state.activity, Activity::Idle);
                }
            }

            tracing::debug!(index = self.slot.index(), "close waiting for in-flight operation");
            notified.await;
        };

        match activity {
            Activity::Reader(reader) => reader.close().await,
            Activity::Statement(statement) => {
                if let Err(e) = statement.close().await {
                    tracing::warn!(error = %e, "failed to close prepared statement");
                }
            }
            Activity::Idle | Activity::Starting(_) => {}
        }

        self.slot.release();
        tracing::debug!(index = self.slot.index(), "pooled connection closed");
    }
}

/// Marks the session as starting an operation; resets it to idle and wakes a
/// pending `close` unless committed.
struct Reservation<'a, E: Engine> {
    session: &'a SessionInner<E>,
    armed: bool,
}

impl<E: Engine> Reservation<'_, E> {
    /// Install the started operation. Returns `false` if the session was
    /// closed meanwhile; the caller must clean `activity` up before dropping
    /// the reservation.
    fn commit(&mut self, activity: Activity<E>) -> bool {
        let mut state = self.session.state.lock();
        if state.closed {
            return false;
        }
        state.activity = activity;
        self.armed = false;
        true
    }
}

impl<E: Engine> Drop for Reservation<'_, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.session.state.lock();
            if matches!(state.activity, Activity::Starting(_)) {
                state.activity = Activity::Idle;
            }
        }
        self.session.settled.notify_waiters();
    }
}

/// Returns a session to idle when its reader closes.
struct SessionRelease<E: Engine> {
    session: Weak<SessionInner<E>>,
}

#[async_trait]
impl<E: Engine> ReleaseCallback for SessionRelease<E> {
    async fn on_close(&self, outcome: ReaderState) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if outcome == ReaderState::Cancelled && !session.slot.is_released() {
            cancel_in_flight(session.slot.connection()).await;
        }
        session.clear_reader();
    }

    fn on_detach(&self) {
        if let Some(session) = self.session.upgrade() {
            session.clear_reader();
        }
    }
}

enum CancelTarget<E: Engine> {
    Reader(Arc<ReaderCore>),
    Statement(Arc<StatementInner<E>>),
    Engine,
}

/// Connection borrowed from the pool for a multi-statement session.
///
/// At most one operation may be in progress at a time: a running `query`, an
/// open streaming reader or an open prepared statement. A call that would
/// start a second one fails with [`Error::QueryActive`],
/// [`Error::ReaderActive`] or [`Error::StatementActive`] instead of queueing.
/// Use separate connections for parallel work.
///
/// [`close`](Self::close) waits for an in-flight engine call, cancels the open
/// reader or statement, then returns the slot to the pool. Dropping an
/// unclosed connection closes it in the background.
pub struct PooledConnection<E: Engine> {
    inner: Arc<SessionInner<E>>,
}

impl<E: Engine> fmt::Debug for PooledConnection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("slot", &self.inner.slot.index())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E: Engine> PooledConnection<E> {
    pub(crate) fn new(slot: SlotHandle<E>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                slot,
                state: Mutex::new(SessionState {
                    closed: false,
                    activity: Activity::Idle,
                }),
                settled: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.inner.slot.index()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Run `sql` to completion.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let _reservation = self.inner.reserve(Pending::Query)?;
        Ok(self.inner.slot.connection().query(sql).await?)
    }

    pub async fn get_table_names(&self, sql: &str) -> Result<Vec<String>> {
        let _reservation = self.inner.reserve(Pending::Query)?;
        Ok(self.inner.slot.connection().table_names(sql).await?)
    }

    /// Start `sql` and return its reader. The connection is busy until the
    /// reader is exhausted or closed.
    pub async fn send(&self, sql: &str) -> Result<PooledStreamReader> {
        let mut reservation = self.inner.reserve(Pending::Reader)?;
        let stream = self.inner.slot.connection().send(sql).await?;
        let reader = PooledStreamReader::new(
            stream,
            Arc::new(SessionRelease {
                session: Arc::downgrade(&self.inner),
            }),
        );

        if !reservation.commit(Activity::Reader(reader.core())) {
            reader.close().await;
            return Err(Error::ConnectionClosed);
        }
        Ok(reader)
    }

    /// Compile `sql`. The connection is busy until the statement is closed.
    pub async fn prepare(&self, sql: &str) -> Result<PooledPreparedStatement<E>> {
        let mut reservation = self.inner.reserve(Pending::Statement)?;
        let statement = self.inner.slot.connection().prepare(sql).await?;
        let statement = Arc::new(StatementInner::new(Arc::downgrade(&self.inner), statement));

        if !reservation.commit(Activity::Statement(Arc::clone(&statement))) {
            if let Err(e) = statement.close().await {
                tracing::warn!(error = %e, "failed to close statement prepared during shutdown");
            }
            return Err(Error::ConnectionClosed);
        }
        Ok(PooledPreparedStatement::new(statement))
    }

    /// Cancel the open reader (the connection's or its statement's) if any;
    /// otherwise forward the cancel request to the engine. Returns whether
    /// something was cancelled.
    pub async fn cancel_sent(&self) -> Result<bool> {
        let target = {
            let state = self.inner.state.lock();
            if state.closed {
                return Err(Error::ConnectionClosed);
            }
            match &state.activity {
                Activity::Reader(reader) => CancelTarget::Reader(Arc::clone(reader)),
                Activity::Statement(statement) => CancelTarget::Statement(Arc::clone(statement)),
                Activity::Idle | Activity::Starting(_) => CancelTarget::Engine,
            }
        };

        match target {
            CancelTarget::Reader(reader) => {
                reader.close().await;
                Ok(true)
            }
            CancelTarget::Statement(statement) => {
                if statement.cancel_reader().await {
                    Ok(true)
                } else {
                    Ok(self.inner.slot.connection().cancel_sent().await?)
                }
            }
            CancelTarget::Engine => Ok(self.inner.slot.connection().cancel_sent().await?),
        }
    }

    /// Close the open reader or statement, then release the slot. Idempotent;
    /// a second concurrent call returns without waiting.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

impl<E: Engine> Drop for PooledConnection<E> {
    fn drop(&mut self) {
        if self.inner.is_closed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move { inner.close().await });
            }
            Err(_) => {
                {
                    let mut state = self.inner.state.lock();
                    state.closed = true;
                    state.activity = Activity::Idle;
                }
                self.inner.slot.release();
            }
        }
    }
}
