//! PixLedger - an append-only, hash-chained transaction ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger and chain integrity checks
//! - [`transaction`] - Transaction records and monetary amounts
//! - [`history`] - Totals and filters over the flattened history
//!
//! ## Sealing
//! - [`miner`] - Cancellable proof-of-work search
//!
//! ## State Management
//! - [`persistence`] - Key/value stores and the ledger record format
//! - [`session`] - A ledger owned by one user session
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod history;
pub mod transaction;

// ============================================================================
// Sealing
// ============================================================================
pub mod miner;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod session;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{Block, Ledger};
pub use error::{LedgerError, StorageError};
pub use miner::CancelToken;
pub use persistence::LedgerStorage;
pub use session::LedgerSession;
pub use transaction::{Amount, Direction, Transaction};
