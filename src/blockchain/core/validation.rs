use crate::blockchain::core::chain::Block;
use thiserror::Error;

/// The first integrity failure found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    #[error("chain has no genesis block")]
    MissingGenesis,
    #[error("block {index}: stored hash {stored} does not match recomputed {computed}")]
    HashMismatch {
        index: usize,
        stored: String,
        computed: String,
    },
    #[error("block {index}: previous hash {found} does not match predecessor hash {expected}")]
    BrokenLink {
        index: usize,
        expected: String,
        found: String,
    },
}

/// Walks the chain from position 1 and reports the first block whose hash or link is wrong.
///
/// The genesis block is the root of trust: it must be present but is not
/// rehashed. Positions are reported as offsets into `chain`, not the blocks'
/// own `index` field, since that field may be the tampered one.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainViolation> {
    if chain.is_empty() {
        return Err(ChainViolation::MissingGenesis);
    }

    for (index, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = index + 1;

        let computed = current.calculate_hash();
        if current.hash != computed {
            return Err(ChainViolation::HashMismatch {
                index,
                stored: current.hash.clone(),
                computed,
            });
        }

        if current.previous_hash != previous.hash {
            return Err(ChainViolation::BrokenLink {
                index,
                expected: previous.hash.clone(),
                found: current.previous_hash.clone(),
            });
        }
    }
    Ok(())
}
