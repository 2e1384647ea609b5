//! Streaming reader over pooled connections.
//!
//! A reader is `Open` until its stream is exhausted, fails, or is cancelled.
//! Whichever happens first wins; the owner's release callback runs exactly
//! once and every later `next()` returns `Ok(None)`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow_array::RecordBatch;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;

use crate::engine::BatchStream;
use crate::error::Result;

/// Lifecycle state of a [`PooledStreamReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Open,
    /// The stream ended normally.
    Exhausted,
    /// Closed by `cancel`/`close` (or by dropping the reader) before the end.
    Cancelled,
    /// The stream yielded an engine error.
    Failed,
}

impl ReaderState {
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Notified once when a reader reaches a terminal state.
#[async_trait]
pub(crate) trait ReleaseCallback: Send + Sync {
    /// Runs inside the async close path. For `Cancelled` the owner asks the
    /// engine to stop before giving the connection back.
    async fn on_close(&self, outcome: ReaderState);

    /// Synchronous release used when a reader is dropped outside a runtime.
    fn on_detach(&self);
}

pub(crate) struct ReaderCore {
    stream: TokioMutex<Option<BatchStream>>,
    cancel: CancellationToken,
    closed: AtomicBool,
    state: Mutex<ReaderState>,
    release: Mutex<Option<Arc<dyn ReleaseCallback>>>,
}

impl fmt::Debug for ReaderCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderCore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl ReaderCore {
    fn new(stream: BatchStream, release: Arc<dyn ReleaseCallback>) -> Self {
        Self {
            stream: TokioMutex::new(Some(stream)),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            state: Mutex::new(ReaderState::Open),
            release: Mutex::new(Some(release)),
        }
    }

    pub(crate) fn state(&self) -> ReaderState {
        *self.state.lock()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) async fn next(&self) -> Result<Option<RecordBatch>> {
        if self.is_closed() || self.cancel.is_cancelled() {
            return Ok(None);
        }

        let mut stream = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(None),
            guard = self.stream.lock() => guard,
        };
        let Some(batches) = stream.as_mut() else {
            return Ok(None);
        };

        let item = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(None),
            item = batches.next() => item,
        };

        match item {
            Some(Ok(batch)) => Ok(Some(batch)),
            None => {
                stream.take();
                drop(stream);
                self.finish(ReaderState::Exhausted).await;
                Ok(None)
            }
            Some(Err(e)) => {
                stream.take();
                drop(stream);
                self.finish(ReaderState::Failed).await;
                Err(e.into())
            }
        }
    }

    pub(crate) async fn close(&self) {
        self.finish(ReaderState::Cancelled).await;
    }

    async fn finish(&self, outcome: ReaderState) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.state.lock() = outcome;
        // Wakes any `next()` parked on the stream so the lock below is free.
        self.cancel.cancel();
        self.stream.lock().await.take();

        let release = self.release.lock().take();
        if let Some(release) = release {
            release.on_close(outcome).await;
        }
        tracing::debug!(?outcome, "stream reader closed");
    }

    /// Close without awaiting anything.
    fn detach(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.state.lock() = ReaderState::Cancelled;
        self.cancel.cancel();
        if let Ok(mut stream) = self.stream.try_lock() {
            stream.take();
        }
        let release = self.release.lock().take();
        if let Some(release) = release {
            release.on_detach();
        }
    }
}

/// Live batch cursor bound to a pooled connection.
///
/// All methods take `&self`, so one task can drain the reader while another
/// holds an `Arc` to it and cancels. Dropping an open reader closes it in the
/// background.
pub struct PooledStreamReader {
    core: Arc<ReaderCore>,
}

impl fmt::Debug for PooledStreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledStreamReader")
            .field("state", &self.state())
            .finish()
    }
}

impl PooledStreamReader {
    pub(crate) fn new(stream: BatchStream, release: Arc<dyn ReleaseCallback>) -> Self {
        Self {
            core: Arc::new(ReaderCore::new(stream, release)),
        }
    }

    pub(crate) fn core(&self) -> Arc<ReaderCore> {
        Arc::clone(&self.core)
    }

    /// Next batch, or `Ok(None)` once the reader is closed for any reason.
    ///
    /// A stream error closes the reader and is returned once.
    pub async fn next(&self) -> Result<Option<RecordBatch>> {
        self.core.next().await
    }

    /// Stop reading and release the underlying connection. Safe to call any
    /// number of times, including after exhaustion.
    pub async fn cancel(&self) {
        self.core.close().await;
    }

    /// Alias for [`cancel`](Self::cancel).
    pub async fn close(&self) {
        self.core.close().await;
    }

    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.core.state()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Drain the remaining batches.
    pub async fn collect(&self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next().await? {
            batches.push(batch);
        }
        Ok(batches)
    }
}

impl Drop for PooledStreamReader {
    fn drop(&mut self) {
        if self.core.is_closed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let core = Arc::clone(&self.core);
                handle.spawn(async move { core.close().await });
            }
            Err(_) => self.core.detach(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::stream;
    use tokio_test::assert_ok;

    use super::*;
    use crate::error::{EngineError, Error};
    use crate::memory::int64_batch;

    #[derive(Default)]
    struct Recorder {
        closes: AtomicUsize,
        detaches: AtomicUsize,
        last: Mutex<Option<ReaderState>>,
    }

    #[async_trait]
    impl ReleaseCallback for Recorder {
        async fn on_close(&self, outcome: ReaderState) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(outcome);
        }

        fn on_detach(&self) {
            self.detaches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reader(items: Vec<std::result::Result<RecordBatch, EngineError>>) -> (PooledStreamReader, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let reader = PooledStreamReader::new(stream::iter(items).boxed(), recorder.clone());
        (reader, recorder)
    }

    #[tokio::test]
    async fn test_exhaustion_releases_once() {
        let (reader, recorder) = reader(vec![Ok(int64_batch("v", &[1])), Ok(int64_batch("v", &[2]))]);

        assert_eq!(assert_ok!(reader.collect().await).len(), 2);
        assert_eq!(reader.state(), ReaderState::Exhausted);
        assert!(assert_ok!(reader.next().await).is_none());

        reader.cancel().await;
        reader.close().await;
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.last.lock(), Some(ReaderState::Exhausted));
        assert_eq!(reader.state(), ReaderState::Exhausted);
    }

    #[tokio::test]
    async fn test_cancel_then_next_is_done() {
        let (reader, recorder) = reader(vec![Ok(int64_batch("v", &[1])), Ok(int64_batch("v", &[2]))]);

        assert!(assert_ok!(reader.next().await).is_some());
        reader.cancel().await;
        reader.cancel().await;

        assert!(assert_ok!(reader.next().await).is_none());
        assert!(assert_ok!(reader.next().await).is_none());
        assert_eq!(reader.state(), ReaderState::Cancelled);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.last.lock(), Some(ReaderState::Cancelled));
    }

    #[tokio::test]
    async fn test_stream_error_closes_reader() {
        let (reader, recorder) = reader(vec![
            Ok(int64_batch("v", &[1])),
            Err(EngineError::new("out of memory")),
            Ok(int64_batch("v", &[2])),
        ]);

        assert!(assert_ok!(reader.next().await).is_some());
        let err = reader.next().await.unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
        assert!(assert_ok!(reader.next().await).is_none());
        assert_eq!(reader.state(), ReaderState::Failed);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_next_returns_done_on_cancel() {
        let recorder = Arc::new(Recorder::default());
        let reader = Arc::new(PooledStreamReader::new(
            stream::pending().boxed(),
            recorder.clone(),
        ));

        let consumer = {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move { reader.next().await })
        };
        tokio::task::yield_now().await;

        reader.cancel().await;
        let next = consumer.await.unwrap();
        assert!(assert_ok!(next).is_none());
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_in_background() {
        let (reader, recorder) = reader(vec![Ok(int64_batch("v", &[1]))]);
        drop(reader);

        for _ in 0..10 {
            if recorder.closes.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.last.lock(), Some(ReaderState::Cancelled));
    }

    #[test]
    fn test_drop_without_runtime_detaches() {
        let (reader, recorder) = reader(vec![Ok(int64_batch("v", &[1]))]);
        drop(reader);
        assert_eq!(recorder.detaches.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 0);
    }
}
