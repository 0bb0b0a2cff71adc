//! Core type definitions for the exchange.
//!
//! Re-exports from alloy-primitives for Ethereum-compatible types.

pub use alloy::primitives::{Address, Signature, B256, U256};

/// Unique identifier for a token (contract address).
pub type TokenId = Address;

/// Amount of tokens, represented as U256 to handle large token supplies.
/// This is in the smallest unit (e.g., wei for ETH, smallest decimal for ERC-20).
pub type Amount = U256;

/// Owner of the liquidity that is locked forever on a pair's first mint.
pub const NULL_OWNER: Address = Address::ZERO;

/// Liquidity locked to [`NULL_OWNER`] on the first mint of every pair.
pub const MINIMUM_LIQUIDITY: U256 = U256::from_limbs([1000, 0, 0, 0]);

/// Snapshot of a pair's reserves, oriented as `(token0, token1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reserves {
    pub reserve0: Amount,
    pub reserve1: Amount,
    /// Last update time, truncated to 32 bits.
    pub block_timestamp_last: u32,
}

impl Reserves {
    /// Whether the pair has never received liquidity.
    pub fn is_empty(&self) -> bool {
        self.reserve0.is_zero() && self.reserve1.is_zero()
    }
}

impl std::fmt::Display for Reserves {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} @ {}",
            self.reserve0, self.reserve1, self.block_timestamp_last
        )
    }
}
