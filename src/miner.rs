//! Proof-of-work sealing for ledger blocks
//!
//! A block is sealed once its hash starts with `difficulty` hexadecimal `'0'`
//! characters. The search is unbounded, so every attempt first checks a
//! [`CancelToken`]; callers that must stay responsive run the search on the
//! tokio blocking pool through [`mine_block_async`].

use crate::blockchain::Block;
use crate::error::{LedgerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Hex characters in a SHA-256 digest; no larger difficulty can ever be met.
pub const MAX_DIFFICULTY: u32 = 64;

/// Shared flag used to abandon an in-flight seal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancels the wrapped token when dropped, so an abandoned future stops its worker.
struct CancelOnDrop(Option<CancelToken>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.0.take() {
            token.cancel();
        }
    }
}

pub fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(LedgerError::InvalidDifficulty(difficulty));
    }
    Ok(())
}

/// Searches nonces from zero until the block hash satisfies `difficulty`.
///
/// Returns [`LedgerError::MiningAborted`] as soon as `cancel` is observed.
pub fn mine_block(mut block: Block, difficulty: u32, cancel: &CancelToken) -> Result<Block> {
    check_difficulty(difficulty)?;

    let started = Instant::now();
    let prefix = block.hash_prefix();
    block.nonce = 0;
    block.hash = Block::hash_with_prefix(&prefix, block.nonce);

    while !Block::hash_meets_difficulty(&block.hash, difficulty) {
        if cancel.is_cancelled() {
            debug!(index = block.index, attempts = block.nonce, "mining cancelled");
            return Err(LedgerError::MiningAborted);
        }
        block.nonce += 1;
        block.hash = Block::hash_with_prefix(&prefix, block.nonce);
    }

    debug!(
        index = block.index,
        nonce = block.nonce,
        elapsed = %humantime::format_duration(started.elapsed()),
        "block sealed"
    );
    Ok(block)
}

/// Runs [`mine_block`] on the blocking pool and hands the result back through the join handle.
///
/// Dropping the returned future cancels the search.
pub async fn mine_block_async(block: Block, difficulty: u32, cancel: CancelToken) -> Result<Block> {
    check_difficulty(difficulty)?;
    let guard = CancelOnDrop(Some(cancel.clone()));
    let mined = tokio::task::spawn_blocking(move || mine_block(block, difficulty, &cancel)).await?;
    guard.disarm();
    mined
}
