//! Transaction module split into amounts and record types

pub mod amount;
pub mod types;

pub use amount::Amount;
pub use types::*;
