use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::common::types::{BlockId, TxnId};
use crate::storage::buffer::buffer::Buffer;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::disk::DiskManager;
use crate::transaction::wal::LogManager;

/// Default budget a `pin` call may spend waiting for a frame to free up.
pub const MAX_PIN_WAIT: Duration = Duration::from_secs(10);

/// Fixed-size pool of page frames shared by all transactions.
///
/// Frames are allocated up front and handed to callers as
/// `Arc<RwLock<Buffer>>`; the pool-level bookkeeping (which frame holds
/// which block, how many frames are unpinned) is serialized by one mutex.
/// When every frame is pinned, `pin` blocks on the pool's condition
/// variable until an `unpin` drops some pin count to zero or the wait
/// budget runs out, at which point it fails with `BufferAbort`.
pub struct BufferManager {
    pool: Vec<Arc<RwLock<Buffer>>>,
    available: Mutex<usize>,
    frame_freed: Condvar,
    max_wait: Duration,
}

impl BufferManager {
    pub fn new(disk: Arc<DiskManager>, log: Arc<LogManager>, pool_size: usize) -> Self {
        Self::with_max_wait(disk, log, pool_size, MAX_PIN_WAIT)
    }

    /// Like `new`, with an explicit wait budget for `pin`.
    pub fn with_max_wait(
        disk: Arc<DiskManager>,
        log: Arc<LogManager>,
        pool_size: usize,
        max_wait: Duration,
    ) -> Self {
        let pool = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Buffer::new(Arc::clone(&disk), Arc::clone(&log)))))
            .collect();

        Self {
            pool,
            available: Mutex::new(pool_size),
            frame_freed: Condvar::new(),
            max_wait,
        }
    }

    /// Number of unpinned frames.
    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Pin the frame holding `blk`, reading the block in first if no frame
    /// currently holds it. Blocks while the pool is exhausted, up to the
    /// wait budget.
    pub fn pin(&self, blk: &BlockId) -> Result<Arc<RwLock<Buffer>>, BufferPoolError> {
        let start = Instant::now();
        let mut available = self.available.lock();

        loop {
            if let Some(buf) = self.try_to_pin(blk, &mut available)? {
                return Ok(buf);
            }
            let waited = start.elapsed();
            if waited >= self.max_wait {
                return Err(BufferPoolError::BufferAbort);
            }
            self.frame_freed.wait_for(&mut available, self.max_wait - waited);
        }
    }

    /// Release one pin on the frame. When the pin count reaches zero the
    /// frame becomes eviction-eligible and waiters are woken.
    pub fn unpin(&self, buf: &Arc<RwLock<Buffer>>) {
        let mut available = self.available.lock();
        let mut frame = buf.write();
        frame.unpin();
        if !frame.is_pinned() {
            *available += 1;
            self.frame_freed.notify_all();
        }
    }

    /// Write back every frame dirtied by `txn` and mark those frames clean.
    /// Pin counts are unaffected.
    pub fn flush_all(&self, txn: TxnId) -> Result<(), BufferPoolError> {
        let _available = self.available.lock();
        for slot in &self.pool {
            let mut frame = slot.write();
            if frame.modifying_txn() == Some(txn) {
                frame.flush()?;
            }
        }
        Ok(())
    }

    /// One pass of the pin protocol, under the pool mutex. Returns Ok(None)
    /// when no frame holds the block and every frame is pinned.
    fn try_to_pin(
        &self,
        blk: &BlockId,
        available: &mut usize,
    ) -> Result<Option<Arc<RwLock<Buffer>>>, BufferPoolError> {
        let slot = match self.find_existing(blk) {
            Some(slot) => slot,
            None => {
                let Some(slot) = self.find_unpinned() else {
                    return Ok(None);
                };
                self.pool[slot].write().assign_to_block(blk.clone())?;
                slot
            }
        };

        let mut frame = self.pool[slot].write();
        if !frame.is_pinned() {
            *available -= 1;
        }
        frame.pin();
        drop(frame);

        Ok(Some(Arc::clone(&self.pool[slot])))
    }

    fn find_existing(&self, blk: &BlockId) -> Option<usize> {
        self.pool.iter().position(|slot| {
            let frame = slot.read();
            frame.block() == Some(blk)
        })
    }

    fn find_unpinned(&self) -> Option<usize> {
        self.pool.iter().position(|slot| !slot.read().is_pinned())
    }
}
