//! Bounded connection pool.
//!
//! The pool owns every engine connection. Slots are opened lazily up to
//! `max_size`; callers borrow one through a [`SlotHandle`] and give it back
//! exactly once. The slot table is the only state shared across callers and
//! lives behind a single mutex.
//!
//! # Waiting for a slot
//!
//! A saturated pool parks the caller on a [`Notify`] that is registered before
//! the slot table is re-checked, so a release between the check and the wait
//! is never lost. Each wait is additionally bounded by the poll interval, and
//! the whole acquisition by the timeout, after which [`Error::PoolTimeout`] is
//! returned. Waiters are not served in FIFO order.

mod slot;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) use self::slot::ConnectionSlot;
pub use self::slot::SlotHandle;
use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::engine::{BatchStream, Engine, EngineConnection, QueryResult};
use crate::error::{Aborted, Error, Result};
use crate::reader::{PooledStreamReader, ReaderState, ReleaseCallback};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections currently open.
    pub size: usize,
    /// Slots claimed by callers.
    pub in_use: usize,
    /// Open slots that are free.
    pub available: usize,
    pub max_size: usize,
    pub closed: bool,
}

struct PoolState<C> {
    slots: Vec<ConnectionSlot<C>>,
    /// Connections being opened; they count against `max_size`.
    pending: usize,
    closed: bool,
}

impl<C> PoolState<C> {
    fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.in_use).count()
    }
}

enum Claim<C> {
    Ready(usize, Arc<C>),
    Open,
    Full,
}

pub(crate) struct PoolInner<E: Engine> {
    engine: E,
    config: PoolConfig,
    state: Mutex<PoolState<E::Connection>>,
    released: Notify,
}

impl<E: Engine> PoolInner<E> {
    fn try_claim(&self) -> Result<Claim<E::Connection>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::PoolClosed);
        }

        if let Some(slot) = state.slots.iter_mut().find(|slot| !slot.in_use) {
            slot.in_use = true;
            let claim = Claim::Ready(slot.index, Arc::clone(&slot.connection));
            #[cfg(feature = "metrics")]
            crate::metrics::set_in_use(state.in_use());
            return Ok(claim);
        }

        if state.slots.len() + state.pending < self.config.max_size.get() {
            state.pending += 1;
            return Ok(Claim::Open);
        }

        Ok(Claim::Full)
    }

    /// Open a new connection for a slot reserved by `try_claim`.
    async fn open_slot(self: &Arc<Self>) -> Result<SlotHandle<E>> {
        let mut pending = PendingSlot {
            pool: self,
            armed: true,
        };

        let connection = match self.engine.connect().await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                tracing::warn!(error = %e, "failed to open engine connection");
                return Err(e.into());
            }
        };

        let index = {
            let mut state = self.state.lock();
            state.pending -= 1;
            pending.armed = false;
            if state.closed {
                None
            } else {
                let index = state.slots.len();
                state
                    .slots
                    .push(ConnectionSlot::claimed(index, Arc::clone(&connection)));
                #[cfg(feature = "metrics")]
                crate::metrics::set_in_use(state.in_use());
                Some(index)
            }
        };

        let Some(index) = index else {
            if let Err(e) = connection.close().await {
                tracing::warn!(error = %e, "failed to close connection opened during shutdown");
            }
            return Err(Error::PoolClosed);
        };

        tracing::debug!(index, "opened connection slot");
        #[cfg(feature = "metrics")]
        crate::metrics::record_slot_opened();
        Ok(SlotHandle::new(Arc::clone(self), index, connection))
    }

    /// Clear the in-use flag of `index`. Releasing a free or unknown slot is a
    /// no-op.
    pub(crate) fn release(&self, index: usize) {
        let released = {
            let mut state = self.state.lock();
            match state.slots.get_mut(index) {
                Some(slot) if slot.in_use => {
                    slot.in_use = false;
                    #[cfg(feature = "metrics")]
                    crate::metrics::set_in_use(state.in_use());
                    true
                }
                _ => false,
            }
        };

        if released {
            tracing::debug!(index, "released connection slot");
            self.released.notify_waiters();
        }
    }
}

/// Gives back a `pending` reservation if opening a connection fails or is
/// abandoned.
struct PendingSlot<'a, E: Engine> {
    pool: &'a PoolInner<E>,
    armed: bool,
}

impl<E: Engine> Drop for PendingSlot<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().pending -= 1;
            self.pool.released.notify_waiters();
        }
    }
}

/// Releases a pool-level reader's slot, cancelling the engine statement
/// first when the reader was closed early.
struct SlotRelease<E: Engine> {
    slot: SlotHandle<E>,
}

#[async_trait]
impl<E: Engine> ReleaseCallback for SlotRelease<E> {
    async fn on_close(&self, outcome: ReaderState) {
        if outcome == ReaderState::Cancelled {
            cancel_in_flight(self.slot.connection()).await;
        }
        self.slot.release();
    }

    fn on_detach(&self) {
        self.slot.release();
    }
}

/// Ask the engine to stop the statement running on `connection` and wait for
/// the acknowledgement.
pub(crate) async fn cancel_in_flight<C: EngineConnection>(connection: &C) {
    match connection.cancel_sent().await {
        Ok(true) => tracing::debug!("cancelled in-flight statement"),
        Ok(false) => tracing::trace!("no statement in flight to cancel"),
        Err(e) => tracing::warn!(error = %e, "engine cancel request failed"),
    }
}

/// Bounded pool of engine connections.
///
/// Cloning is cheap and yields another handle to the same pool.
pub struct ConnectionPool<E: Engine> {
    inner: Arc<PoolInner<E>>,
}

impl<E: Engine> Clone for ConnectionPool<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> fmt::Debug for ConnectionPool<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<E: Engine> ConnectionPool<E> {
    /// Create an empty pool. No connection is opened until first use.
    pub fn new(engine: E, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                engine,
                config,
                state: Mutex::new(PoolState {
                    slots: Vec::with_capacity(config.max_size.get()),
                    pending: 0,
                    closed: false,
                }),
                released: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let in_use = state.in_use();
        PoolStatus {
            size: state.slots.len(),
            in_use,
            available: state.slots.len() - in_use,
            max_size: self.inner.config.max_size.get(),
            closed: state.closed,
        }
    }

    /// Claim a slot, waiting up to the configured acquire timeout.
    pub async fn acquire_slot(&self) -> Result<SlotHandle<E>> {
        self.acquire_slot_with_timeout(self.inner.config.acquire_timeout)
            .await
    }

    /// Claim a slot, waiting up to `timeout`. A zero timeout fails
    /// immediately when the pool is saturated.
    pub async fn acquire_slot_with_timeout(&self, timeout: Duration) -> Result<SlotHandle<E>> {
        let inner = &self.inner;
        let started = Instant::now();
        let deadline = started.checked_add(timeout);

        loop {
            let notified = inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match inner.try_claim()? {
                Claim::Ready(index, connection) => {
                    tracing::debug!(index, "claimed connection slot");
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_acquire_wait(started.elapsed());
                    return Ok(SlotHandle::new(Arc::clone(inner), index, connection));
                }
                Claim::Open => {
                    let slot = inner.open_slot().await?;
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_acquire_wait(started.elapsed());
                    return Ok(slot);
                }
                Claim::Full => {}
            }

            let now = Instant::now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => {
                    tracing::warn!(?timeout, "timed out waiting for a connection slot");
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_acquire_timeout();
                    return Err(Error::PoolTimeout(timeout));
                }
                Some(deadline) => inner.config.poll_interval.min(deadline - now),
                None => inner.config.poll_interval,
            };
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    /// Release slot `index`. Idempotent.
    pub fn release_slot(&self, index: usize) {
        self.inner.release(index);
    }

    /// Run `sql` to completion on a borrowed slot.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let slot = self.acquire_slot().await?;
        let result = slot.connection().query(sql).await;
        slot.release();
        Ok(result?)
    }

    /// Names of the tables `sql` reads.
    pub async fn get_table_names(&self, sql: &str) -> Result<Vec<String>> {
        let slot = self.acquire_slot().await?;
        let result = slot.connection().table_names(sql).await;
        slot.release();
        Ok(result?)
    }

    /// Start `sql` and return a reader that owns the slot until it closes.
    pub async fn send(&self, sql: &str) -> Result<PooledStreamReader> {
        let slot = self.acquire_slot().await?;
        let stream = match slot.connection().send(sql).await {
            Ok(stream) => stream,
            Err(e) => {
                slot.release();
                return Err(e.into());
            }
        };
        Ok(PooledStreamReader::new(
            stream,
            Arc::new(SlotRelease { slot }),
        ))
    }

    /// Like [`send`](Self::send), but returns `Aborted` if `token` fires
    /// before the first batch arrives. The engine is asked to stop and the
    /// slot is released once it acknowledges.
    pub async fn send_abortable(
        &self,
        sql: &str,
        token: &CancellationToken,
    ) -> Result<std::result::Result<PooledStreamReader, Aborted>> {
        let slot = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(Err(Aborted)),
            slot = self.acquire_slot() => slot?,
        };

        let mut stream = tokio::select! {
            biased;
            () = token.cancelled() => {
                abort_slot(slot).await;
                return Ok(Err(Aborted));
            }
            stream = slot.connection().send(sql) => match stream {
                Ok(stream) => stream,
                Err(e) => {
                    slot.release();
                    return Err(e.into());
                }
            },
        };

        let first = tokio::select! {
            biased;
            () = token.cancelled() => None,
            first = stream.next() => Some(first),
        };
        let Some(first) = first else {
            drop(stream);
            abort_slot(slot).await;
            return Ok(Err(Aborted));
        };

        let stream: BatchStream = match first {
            Some(batch) => stream::iter([batch]).chain(stream).boxed(),
            None => stream::empty().boxed(),
        };
        Ok(Ok(PooledStreamReader::new(
            stream,
            Arc::new(SlotRelease { slot }),
        )))
    }

    /// Run `sql` through the streaming path, collecting batches until done or
    /// until `token` fires. On cancellation the buffered batches are dropped
    /// and the slot is released after the engine acknowledges the cancel.
    pub async fn query_abortable(
        &self,
        sql: &str,
        token: &CancellationToken,
    ) -> Result<std::result::Result<QueryResult, Aborted>> {
        let reader = match self.send_abortable(sql, token).await? {
            Ok(reader) => reader,
            Err(Aborted) => return Ok(Err(Aborted)),
        };

        let mut batches = Vec::new();
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    drop(batches);
                    reader.cancel().await;
                    tracing::debug!("abortable query cancelled");
                    return Ok(Err(Aborted));
                }
                next = reader.next() => match next? {
                    Some(batch) => batches.push(batch),
                    None => break,
                },
            }
        }
        Ok(Ok(QueryResult::new(batches)))
    }

    /// Claim a slot for a caller-managed session.
    pub async fn get_pooled_connection(&self) -> Result<PooledConnection<E>> {
        Ok(PooledConnection::new(self.acquire_slot().await?))
    }

    /// Close every connection and empty the slot list. Later acquisitions
    /// fail with [`Error::PoolClosed`]. In-flight operations must be drained
    /// first.
    pub async fn close(&self) {
        let connections: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.slots.drain(..).map(|slot| slot.connection).collect()
        };
        self.inner.released.notify_waiters();

        let count = connections.len();
        for connection in connections {
            if let Err(e) = connection.close().await {
                tracing::warn!(error = %e, "failed to close engine connection");
            }
        }
        tracing::info!(connections = count, "connection pool closed");
    }
}

async fn abort_slot<E: Engine>(slot: SlotHandle<E>) {
    cancel_in_flight(slot.connection()).await;
    slot.release();
    tracing::debug!(index = slot.index(), "aborted before first batch");
}
