use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use quarrydb::storage::buffer::BufferManager;
use quarrydb::storage::disk::DiskManager;
use quarrydb::transaction::wal::LogManager;
use quarrydb::Database;

/// Block size used by most scenarios.
#[allow(dead_code)]
pub const TEST_BLOCK_SIZE: usize = 400;

#[allow(dead_code)]
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A database over a scratch directory. The TempDir must be kept alive for
/// the duration of the test.
#[allow(dead_code)]
pub fn create_test_db(block_size: usize, pool_size: usize) -> Result<(Database, TempDir)> {
    init_logging();
    let dir = TempDir::new()?;
    let db = Database::new(dir.path(), block_size, pool_size)?;
    Ok((db, dir))
}

/// Like `create_test_db`, shortening the lock/pin wait budgets so
/// contention tests finish quickly.
#[allow(dead_code)]
pub fn create_impatient_db(
    block_size: usize,
    pool_size: usize,
    wait_budget: Duration,
) -> Result<(Database, TempDir)> {
    init_logging();
    let dir = TempDir::new()?;
    let db = Database::with_wait_budget(dir.path(), block_size, pool_size, wait_budget)?;
    Ok((db, dir))
}

/// A bare disk manager, for tests below the engine façade.
#[allow(dead_code)]
pub fn create_test_disk(block_size: usize) -> Result<(Arc<DiskManager>, TempDir)> {
    init_logging();
    let dir = TempDir::new()?;
    let disk = Arc::new(DiskManager::new(dir.path(), block_size)?);
    Ok((disk, dir))
}

/// A bare buffer pool (with its own log manager), for tests below the
/// engine façade.
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    block_size: usize,
    pool_size: usize,
    max_wait: Duration,
) -> Result<(Arc<BufferManager>, Arc<DiskManager>, TempDir)> {
    let (disk, dir) = create_test_disk(block_size)?;
    let log = Arc::new(LogManager::new(Arc::clone(&disk), "quarry_test.log")?);
    let pool = Arc::new(BufferManager::with_max_wait(
        Arc::clone(&disk),
        log,
        pool_size,
        max_wait,
    ));
    Ok((pool, disk, dir))
}
