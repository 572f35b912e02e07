//! Bounded memory ballast

use super::LoadError;
use std::sync::Mutex;

/// Default size of one ballast block (500 MiB)
pub const DEFAULT_BLOCK_BYTES: usize = 500 * 1024 * 1024;

/// Default cap on held blocks
pub const DEFAULT_MAX_BLOCKS: usize = 8;

/// Holds touched memory blocks until freed
pub struct MemoryBallast {
    blocks: Mutex<Vec<Vec<u8>>>,
    block_bytes: usize,
    max_blocks: usize,
}

impl MemoryBallast {
    pub fn new(block_bytes: usize, max_blocks: usize) -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            block_bytes,
            max_blocks,
        }
    }

    pub fn blocks(&self) -> usize {
        self.lock().len()
    }

    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    pub fn allocated_bytes(&self) -> usize {
        self.blocks() * self.block_bytes
    }

    /// Add one block; returns the bytes now held
    pub fn allocate(&self) -> Result<usize, LoadError> {
        let mut blocks = self.lock();
        if blocks.len() >= self.max_blocks {
            return Err(LoadError::BallastFull {
                blocks: blocks.len(),
                bytes: blocks.len() * self.block_bytes,
            });
        }

        // Non-zero fill so every page is actually resident
        blocks.push(vec![1u8; self.block_bytes]);
        Ok(blocks.len() * self.block_bytes)
    }

    /// Drop every block; returns the bytes released
    pub fn free_all(&self) -> usize {
        let mut blocks = self.lock();
        let freed = blocks.len() * self.block_bytes;
        blocks.clear();
        blocks.shrink_to_fit();
        freed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBallast {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_BYTES, DEFAULT_MAX_BLOCKS)
    }
}
