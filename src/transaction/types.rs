/// Transaction types for PixLedger
use super::amount::Amount;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

/// Identifier reserved for the record carried by the genesis block.
pub const GENESIS_TRANSACTION_ID: &str = "genesis";

/// Direction of a transfer relative to the ledger owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

/// A single transfer record.
///
/// Field order is part of the block hash: blocks hash the JSON encoding of
/// their transactions, so fields must not be reordered and optional fields
/// are always written (as `null` when absent).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub amount: Amount,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub category: Option<String>,
    pub date: Option<NaiveDate>,
}

impl Transaction {
    /// Creates a transaction stamped with the current time and a fresh random id.
    pub fn new(direction: Direction, amount: Amount, description: impl Into<String>) -> Self {
        Transaction {
            id: generate_id(),
            direction,
            amount,
            description: description.into(),
            timestamp: now_millis(),
            category: None,
            date: None,
        }
    }

    /// The reserved record carried by every genesis block.
    pub fn genesis() -> Self {
        Transaction {
            id: GENESIS_TRANSACTION_ID.to_string(),
            direction: Direction::Receive,
            amount: Amount::ZERO,
            description: "Genesis Block".to_string(),
            timestamp: now_millis(),
            category: None,
            date: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_genesis(&self) -> bool {
        self.id == GENESIS_TRANSACTION_ID
    }

    /// The date shown to users: the explicit `date`, else the day of `timestamp`.
    pub fn display_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| self.timestamp.date_naive())
    }
}

/// Current UTC time truncated to milliseconds, the precision used for stored instants.
pub(crate) fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn generate_id() -> String {
    format!("tx-{}", hex::encode(rand::random::<[u8; 8]>()))
}
