//! Ledger ownership for a single user session
//!
//! Each session owns exactly one [`Ledger`]; callers pass the session to the
//! code that needs it instead of reaching for a process-wide instance. A
//! session is not shared between threads: wrap it in a mutex or keep it behind
//! a single task if several callers need it.

use crate::blockchain::{Block, Ledger};
use crate::config::Config;
use crate::error::Result;
use crate::history::HistorySummary;
use crate::miner::CancelToken;
use crate::persistence::LedgerStorage;
use crate::transaction::Transaction;
use tracing::{info, warn};

#[derive(Debug)]
pub struct LedgerSession {
    ledger: Ledger,
}

impl LedgerSession {
    /// Opens the configured store and restores its ledger, or starts a genesis-only one.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let storage = config.storage.open()?;
        Self::open_with_storage(storage, config.ledger.difficulty)
    }

    /// Restores the ledger held by `storage`. Corrupt data is returned as an
    /// error and never replaced with a fresh chain.
    pub fn open_with_storage(storage: LedgerStorage, difficulty: u32) -> Result<Self> {
        let ledger = match storage.load()? {
            Some(ledger) => {
                if ledger.difficulty() != difficulty {
                    warn!(
                        stored = ledger.difficulty(),
                        configured = difficulty,
                        "stored ledger keeps its own difficulty"
                    );
                }
                ledger
            }
            None => {
                info!(key = storage.key(), difficulty, "starting new ledger");
                Ledger::with_storage(difficulty, storage)?
            }
        };
        Ok(Self { ledger })
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    /// Records one transfer as its own sealed block.
    ///
    /// If sealing fails or the future is dropped, the transfer is taken back
    /// out of the pending buffer, so a retried commit records it exactly once.
    pub async fn commit(&mut self, transaction: Transaction, cancel: CancelToken) -> Result<Block> {
        let mut buffered = BufferedTransfer::push(&mut self.ledger, transaction);
        let block = buffered.ledger.seal(cancel).await?;
        buffered.disarm();
        Ok(block)
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.ledger.all_transactions()
    }

    pub fn chain(&self) -> &[Block] {
        self.ledger.chain()
    }

    pub fn is_valid(&self) -> bool {
        self.ledger.is_valid()
    }

    pub fn summary(&self) -> Result<HistorySummary> {
        self.ledger.summary()
    }

    /// Deletes persisted history and starts over from a new genesis block.
    pub fn reset(&mut self) -> Result<()> {
        let storage = self.ledger.storage().clone();
        storage.clear()?;
        self.ledger = Ledger::with_storage(self.ledger.difficulty(), storage)?;
        info!("ledger reset to genesis");
        Ok(())
    }
}

/// A transfer pushed for one commit; popped again unless the seal succeeds.
struct BufferedTransfer<'a> {
    ledger: &'a mut Ledger,
    armed: bool,
}

impl<'a> BufferedTransfer<'a> {
    fn push(ledger: &'a mut Ledger, transaction: Transaction) -> Self {
        ledger.add_transaction(transaction);
        Self { ledger, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for BufferedTransfer<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.pop_pending_transaction();
        }
    }
}
