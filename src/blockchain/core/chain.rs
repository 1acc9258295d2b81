use crate::blockchain::core::validation::validate_chain;
use crate::error::{LedgerError, Result};
use crate::history::{summarize, HistorySummary};
use crate::miner::{check_difficulty, mine_block, mine_block_async, CancelToken};
use crate::persistence::{LedgerRecord, LedgerStorage};
use crate::transaction::types::now_millis;
use crate::transaction::Transaction;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Previous-hash marker of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Difficulty used when none is configured.
pub const DEFAULT_DIFFICULTY: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    /// Builds an unsealed block: nonce 0 and the hash of that first attempt.
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Block {
            index,
            timestamp: now_millis(),
            transactions,
            previous_hash,
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The trusted root block. It carries the reserved genesis record and is not mined.
    pub fn genesis() -> Self {
        Block::new(0, vec![Transaction::genesis()], GENESIS_PREVIOUS_HASH.to_string())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Recomputes the hash from the block's current fields.
    pub fn calculate_hash(&self) -> String {
        Block::hash_with_prefix(&self.hash_prefix(), self.nonce)
    }

    /// Everything the hash covers except the nonce, in hashing order.
    pub(crate) fn hash_prefix(&self) -> String {
        // Encoding plain records into a String cannot fail.
        let transactions = serde_json::to_string(&self.transactions).unwrap_or_default();
        format!(
            "{}{}{}{}",
            self.index,
            self.previous_hash,
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            transactions
        )
    }

    pub(crate) fn hash_with_prefix(prefix: &str, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(nonce.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn hash_meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let required = difficulty as usize;
        hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        Block::hash_meets_difficulty(&self.hash, difficulty)
    }
}

/// The ordered chain of sealed blocks plus the buffer of transactions awaiting a seal.
///
/// A `Ledger` is not internally synchronized. It is mutated only through
/// [`Ledger::add_transaction`] and the seal methods, and a seal either fully
/// succeeds (block appended, buffer cleared, state persisted) or leaves the
/// ledger exactly as it was.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    difficulty: u32,
    pending: Vec<Transaction>,
    storage: LedgerStorage,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::genesis_only(DEFAULT_DIFFICULTY, LedgerStorage::in_memory())
    }
}

impl Ledger {
    /// Create a genesis-only `Ledger` backed by an in-memory store.
    pub fn new(difficulty: u32) -> Result<Self> {
        Self::with_storage(difficulty, LedgerStorage::in_memory())
    }

    /// Create a genesis-only `Ledger` that persists through `storage`.
    pub fn with_storage(difficulty: u32, storage: LedgerStorage) -> Result<Self> {
        check_difficulty(difficulty)?;
        Ok(Ledger::genesis_only(difficulty, storage))
    }

    fn genesis_only(difficulty: u32, storage: LedgerStorage) -> Self {
        Ledger {
            chain: vec![Block::genesis()],
            difficulty,
            pending: Vec::new(),
            storage,
        }
    }

    /// Reassembles a ledger from persisted parts without touching any hash.
    pub(crate) fn from_record(record: LedgerRecord, storage: LedgerStorage) -> Self {
        Ledger {
            chain: record.chain,
            difficulty: record.difficulty,
            pending: record.pending,
            storage,
        }
    }

    pub(crate) fn to_record(&self) -> LedgerRecord {
        LedgerRecord::new(self.difficulty, self.chain.clone(), self.pending.clone())
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn storage(&self) -> &LedgerStorage {
        &self.storage
    }

    pub fn latest_block(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.chain[self.chain.len() - 1]
    }

    /// Buffers a transaction for the next seal. The chain is not touched.
    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.pending.push(transaction);
    }

    /// Takes back the most recently buffered transaction.
    pub fn pop_pending_transaction(&mut self) -> Option<Transaction> {
        self.pending.pop()
    }

    /// Seals the pending buffer into a new block, blocking until mining and persistence finish.
    pub fn seal_pending_transactions(&mut self) -> Result<Block> {
        self.seal_pending_transactions_with(&CancelToken::new())
    }

    /// Like [`Ledger::seal_pending_transactions`], but gives up when `cancel` is set.
    pub fn seal_pending_transactions_with(&mut self, cancel: &CancelToken) -> Result<Block> {
        let candidate = self.candidate_block();
        let sealed = mine_block(candidate, self.difficulty, cancel)?;
        let record = self.record_with(&sealed);
        self.storage.save_record(&record).map_err(|e| {
            warn!(index = sealed.index, error = %e, "failed to persist sealed block");
            e
        })?;
        Ok(self.commit(record, sealed))
    }

    /// Seals the pending buffer with mining and persistence on the blocking pool.
    ///
    /// The ledger is only updated once both have succeeded, so cancelling
    /// through `cancel` (or dropping the future) leaves it unchanged.
    pub async fn seal(&mut self, cancel: CancelToken) -> Result<Block> {
        let candidate = self.candidate_block();
        let sealed = mine_block_async(candidate, self.difficulty, cancel).await?;
        let record = self.record_with(&sealed);
        let bytes = LedgerStorage::encode(&record)?;

        let storage = self.storage.clone();
        let index = sealed.index;
        tokio::task::spawn_blocking(move || storage.write_bytes(&bytes))
            .await?
            .map_err(|e| {
                warn!(index, error = %e, "failed to persist sealed block");
                LedgerError::from(e)
            })?;

        Ok(self.commit(record, sealed))
    }

    fn candidate_block(&self) -> Block {
        Block::new(
            self.chain.len() as u64,
            self.pending.clone(),
            self.latest_block().hash.clone(),
        )
    }

    /// The state that will exist once `sealed` is appended.
    fn record_with(&self, sealed: &Block) -> LedgerRecord {
        let mut chain = self.chain.clone();
        chain.push(sealed.clone());
        LedgerRecord::new(self.difficulty, chain, Vec::new())
    }

    fn commit(&mut self, record: LedgerRecord, sealed: Block) -> Block {
        self.chain = record.chain;
        self.pending.clear();
        info!(
            index = sealed.index,
            transactions = sealed.transactions.len(),
            nonce = sealed.nonce,
            hash = %sealed.hash,
            "sealed block"
        );
        sealed
    }

    /// Persists the current state through the attached storage.
    pub fn save(&self) -> Result<()> {
        self.storage.save(self)?;
        Ok(())
    }

    /// Checks every block after genesis for a matching hash and an intact link.
    pub fn is_valid(&self) -> bool {
        validate_chain(&self.chain).is_ok()
    }

    /// Every recorded transaction in chain order, without the genesis record.
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| !tx.is_genesis())
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> Result<HistorySummary> {
        summarize(&self.all_transactions())
    }
}
