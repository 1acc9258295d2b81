//! Read-outs over the flattened transaction history

use crate::error::{LedgerError, Result};
use crate::transaction::{Amount, Direction, Transaction};

/// Totals shown alongside a transaction listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub count: usize,
    pub total_received: Amount,
    pub total_sent: Amount,
}

impl HistorySummary {
    /// Received minus sent, in cents.
    pub fn net(&self) -> i128 {
        self.total_received.cents() as i128 - self.total_sent.cents() as i128
    }
}

/// Totals per direction. Fails with `InvalidAmount` if a total does not fit in `Amount`.
pub fn summarize(transactions: &[Transaction]) -> Result<HistorySummary> {
    transactions.iter().try_fold(HistorySummary::default(), |mut summary, tx| {
        summary.count += 1;
        let total = match tx.direction {
            Direction::Receive => &mut summary.total_received,
            Direction::Send => &mut summary.total_sent,
        };
        *total = total
            .checked_add(tx.amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{:?} total overflows at {}", tx.direction, tx.id)))?;
        Ok(summary)
    })
}

pub fn filter_by_direction(transactions: &[Transaction], direction: Direction) -> Vec<Transaction> {
    transactions
        .iter()
        .filter(|tx| tx.direction == direction)
        .cloned()
        .collect()
}
