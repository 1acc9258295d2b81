// Thin re-export module: implementation is in `blockchain/core.rs` so block
// sealing, ledger state and integrity checks stay in separate files.

pub mod core;
pub use core::*;
