//! Exchange configuration parameters.

use crate::types::U256;

/// Basis-point denominator for fees (10000 bp = 100%).
pub const FEE_DENOMINATOR: u32 = 10_000;

/// Configuration for the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Swap fee charged on the input amount, in basis points.
    /// 30 = 0.30%; 0 gives a fee-less pool.
    pub fee_bps: u32,

    /// Chain identifier bound into every permit domain.
    pub chain_id: u64,

    /// EIP-712 domain name of the liquidity-share token.
    pub lp_name: String,

    /// Symbol of the liquidity-share token.
    pub lp_symbol: String,

    /// Maximum number of tokens in a swap path.
    pub max_path_len: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            fee_bps: 30,      // 0.30% default fee
            chain_id: 1,
            lp_name: "Uniswap V2".to_string(),
            lp_symbol: "UNI-V2".to_string(),
            max_path_len: 8,
        }
    }
}

impl ExchangeConfig {
    /// Create a new configuration with custom fee. Values above 100% are capped.
    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps.min(FEE_DENOMINATOR);
        self
    }

    /// Create a new configuration with a custom chain id.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Create a new configuration with a custom liquidity token name and symbol.
    pub fn with_lp_token(mut self, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        self.lp_name = name.into();
        self.lp_symbol = symbol.into();
        self
    }

    /// Create a new configuration with a custom maximum path length.
    pub fn with_max_path_len(mut self, max_path_len: usize) -> Self {
        self.max_path_len = max_path_len;
        self
    }
}

/// `FEE_DENOMINATOR - fee_bps`: the part of an input left after the swap fee.
pub fn fee_complement(fee_bps: u32) -> U256 {
    U256::from(FEE_DENOMINATOR.saturating_sub(fee_bps))
}
