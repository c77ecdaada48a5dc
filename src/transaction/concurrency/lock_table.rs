use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::BlockId;

/// Default budget a lock request may spend waiting before it times out.
pub const MAX_LOCK_WAIT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum LockError {
    /// The lock could not be granted within the wait budget. This is the
    /// deadlock-avoidance mechanism: the requesting transaction must roll
    /// back; no waits-for graph is maintained.
    #[error("timed out waiting for a lock on {0}")]
    Timeout(BlockId),
}

/// Engine-wide block-granularity lock table.
///
/// One integer per block: `n > 0` means `n` shared holders, `-1` means one
/// exclusive holder, absent means unlocked. A single mutex guards the map;
/// blocked requests wait on the table's condition variable and re-evaluate
/// their predicate each wakeup, giving up once the total wall time exceeds
/// the budget.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, i32>>,
    released: Condvar,
    max_wait: Duration,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::with_timeout(MAX_LOCK_WAIT)
    }

    /// Like `new`, with an explicit wait budget.
    pub fn with_timeout(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            max_wait,
        }
    }

    /// Acquire a shared lock, waiting out any exclusive holder.
    pub fn s_lock(&self, blk: &BlockId) -> Result<(), LockError> {
        let mut locks = self.locks.lock();
        let start = Instant::now();

        while Self::has_x_lock(&locks, blk) {
            let waited = start.elapsed();
            if waited >= self.max_wait {
                return Err(LockError::Timeout(blk.clone()));
            }
            trace!("waiting for shared lock on {}", blk);
            self.released.wait_for(&mut locks, self.max_wait - waited);
        }

        *locks.entry(blk.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Upgrade to an exclusive lock. The caller is expected to already hold
    /// a shared lock on the block, so "no other holders" means a count of
    /// exactly one.
    pub fn x_lock(&self, blk: &BlockId) -> Result<(), LockError> {
        let mut locks = self.locks.lock();
        let start = Instant::now();

        while Self::has_other_s_locks(&locks, blk) {
            let waited = start.elapsed();
            if waited >= self.max_wait {
                return Err(LockError::Timeout(blk.clone()));
            }
            trace!("waiting for exclusive lock on {}", blk);
            self.released.wait_for(&mut locks, self.max_wait - waited);
        }

        locks.insert(blk.clone(), -1);
        Ok(())
    }

    /// Drop one holder. The last holder's release removes the entry and
    /// wakes every waiter.
    pub fn unlock(&self, blk: &BlockId) {
        let mut locks = self.locks.lock();
        match locks.get_mut(blk) {
            Some(holders) if *holders > 1 => *holders -= 1,
            _ => {
                locks.remove(blk);
                self.released.notify_all();
            }
        }
    }

    fn has_x_lock(locks: &HashMap<BlockId, i32>, blk: &BlockId) -> bool {
        locks.get(blk).is_some_and(|&holders| holders < 0)
    }

    fn has_other_s_locks(locks: &HashMap<BlockId, i32>, blk: &BlockId) -> bool {
        locks.get(blk).is_some_and(|&holders| holders > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_table() -> LockTable {
        LockTable::with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn test_shared_locks_stack() {
        let table = quick_table();
        let blk = BlockId::new("data", 0);

        table.s_lock(&blk).unwrap();
        table.s_lock(&blk).unwrap();

        table.unlock(&blk);
        table.unlock(&blk);
        // Fully released: an exclusive request succeeds immediately.
        table.s_lock(&blk).unwrap();
        table.x_lock(&blk).unwrap();
    }

    #[test]
    fn test_upgrade_from_sole_shared_holder() {
        let table = quick_table();
        let blk = BlockId::new("data", 1);

        table.s_lock(&blk).unwrap();
        table.x_lock(&blk).unwrap();
        table.unlock(&blk);
    }

    #[test]
    fn test_x_lock_times_out_with_other_readers() {
        let table = quick_table();
        let blk = BlockId::new("data", 2);

        table.s_lock(&blk).unwrap();
        table.s_lock(&blk).unwrap();

        // Two shared holders: an upgrade cannot be granted.
        assert!(matches!(table.x_lock(&blk), Err(LockError::Timeout(_))));
    }

    #[test]
    fn test_s_lock_times_out_against_writer() {
        let table = quick_table();
        let blk = BlockId::new("data", 3);

        table.s_lock(&blk).unwrap();
        table.x_lock(&blk).unwrap();

        assert!(matches!(table.s_lock(&blk), Err(LockError::Timeout(_))));
    }
}
