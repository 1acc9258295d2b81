// core.rs splits block/ledger logic from chain integrity checks.
pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;
