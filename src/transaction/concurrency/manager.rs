use std::collections::HashMap;
use std::sync::Arc;

use crate::common::types::BlockId;
use crate::transaction::concurrency::lock_table::{LockError, LockTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Per-transaction view of the lock table, implementing strict two-phase
/// locking: locks accumulate as blocks are touched and are released only
/// at commit or rollback.
pub struct ConcurrencyManager {
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockMode>,
}

impl ConcurrencyManager {
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        Self {
            lock_table,
            locks: HashMap::new(),
        }
    }

    /// Acquire a shared lock. A no-op when this transaction already holds
    /// any lock on the block.
    pub fn s_lock(&mut self, blk: &BlockId) -> Result<(), LockError> {
        if self.locks.contains_key(blk) {
            return Ok(());
        }
        self.lock_table.s_lock(blk)?;
        self.locks.insert(blk.clone(), LockMode::Shared);
        Ok(())
    }

    /// Acquire an exclusive lock, upgrading from shared if necessary. A
    /// no-op when this transaction already holds the exclusive lock.
    pub fn x_lock(&mut self, blk: &BlockId) -> Result<(), LockError> {
        if self.has_x_lock(blk) {
            return Ok(());
        }
        self.s_lock(blk)?;
        self.lock_table.x_lock(blk)?;
        self.locks.insert(blk.clone(), LockMode::Exclusive);
        Ok(())
    }

    /// Release every lock this transaction holds.
    pub fn release(&mut self) {
        for blk in self.locks.keys() {
            self.lock_table.unlock(blk);
        }
        self.locks.clear();
    }

    fn has_x_lock(&self, blk: &BlockId) -> bool {
        self.locks.get(blk) == Some(&LockMode::Exclusive)
    }
}
