use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::types::BlockId;
use crate::storage::buffer::{Buffer, BufferManager, BufferPoolError};

/// The buffers a transaction currently has pinned: a map from block to its
/// frame, plus the pin multiset (a block may be pinned more than once; the
/// frame mapping survives until the last pin is released).
pub(crate) struct BufferList {
    buffers: HashMap<BlockId, Arc<RwLock<Buffer>>>,
    pins: Vec<BlockId>,
    buffer_mgr: Arc<BufferManager>,
}

impl BufferList {
    pub(crate) fn new(buffer_mgr: Arc<BufferManager>) -> Self {
        Self {
            buffers: HashMap::new(),
            pins: Vec::new(),
            buffer_mgr,
        }
    }

    /// The frame holding `blk`, if this transaction has it pinned.
    pub(crate) fn get(&self, blk: &BlockId) -> Option<Arc<RwLock<Buffer>>> {
        self.buffers.get(blk).cloned()
    }

    pub(crate) fn pin(&mut self, blk: &BlockId) -> Result<(), BufferPoolError> {
        let buf = self.buffer_mgr.pin(blk)?;
        self.buffers.insert(blk.clone(), buf);
        self.pins.push(blk.clone());
        Ok(())
    }

    /// Release one pin on `blk`. Unpinning a block this transaction never
    /// pinned is a programmer error.
    pub(crate) fn unpin(&mut self, blk: &BlockId) {
        let buf = self
            .buffers
            .get(blk)
            .unwrap_or_else(|| panic!("block {} is not pinned by this transaction", blk));
        self.buffer_mgr.unpin(buf);

        if let Some(pos) = self.pins.iter().position(|b| b == blk) {
            self.pins.remove(pos);
        }
        if !self.pins.iter().any(|b| b == blk) {
            self.buffers.remove(blk);
        }
    }

    /// Release every pin this transaction holds.
    pub(crate) fn unpin_all(&mut self) {
        for blk in self.pins.drain(..) {
            if let Some(buf) = self.buffers.get(&blk) {
                self.buffer_mgr.unpin(buf);
            }
        }
        self.buffers.clear();
    }
}
