use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::PoolInner;
use crate::engine::Engine;

/// One physical engine connection plus its in-use flag. Owned by the pool.
pub(crate) struct ConnectionSlot<C> {
    pub(crate) index: usize,
    pub(crate) connection: Arc<C>,
    pub(crate) in_use: bool,
}

impl<C> ConnectionSlot<C> {
    pub(crate) const fn claimed(index: usize, connection: Arc<C>) -> Self {
        Self {
            index,
            connection,
            in_use: true,
        }
    }
}

/// Exclusive claim on one pool slot.
///
/// The slot is released at most once: by [`release`](Self::release) or, if
/// that was never called, when the handle is dropped.
pub struct SlotHandle<E: Engine> {
    pool: Arc<PoolInner<E>>,
    index: usize,
    connection: Arc<E::Connection>,
    released: AtomicBool,
}

impl<E: Engine> fmt::Debug for SlotHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotHandle")
            .field("index", &self.index)
            .field("released", &self.is_released())
            .finish()
    }
}

impl<E: Engine> SlotHandle<E> {
    pub(crate) const fn new(
        pool: Arc<PoolInner<E>>,
        index: usize,
        connection: Arc<E::Connection>,
    ) -> Self {
        Self {
            pool,
            index,
            connection,
            released: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The claimed engine connection.
    #[must_use]
    pub fn connection(&self) -> &E::Connection {
        &self.connection
    }

    /// Give the slot back to the pool. Later calls do nothing.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.pool.release(self.index);
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<E: Engine> Drop for SlotHandle<E> {
    fn drop(&mut self) {
        self.release();
    }
}
