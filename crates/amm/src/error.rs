//! Errors surfaced by every exchange operation.

use crate::types::{Address, TokenId};

/// Convenience alias used throughout the crate.
pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;

/// Broad classification of an [`ExchangeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Checked arithmetic failed.
    Arithmetic,
    /// Caller-supplied input was rejected.
    Validation,
    /// The constant-product check failed.
    Invariant,
    /// Signature, permit or privilege failure.
    Authorization,
    /// The operation is not valid in the current state.
    State,
    /// The external token ledger rejected a movement.
    External,
}

/// Errors that can occur in the exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("arithmetic underflow")]
    ArithmeticUnderflow,
    #[error("division by zero")]
    DivisionByZero,

    #[error("identical addresses")]
    IdenticalAddresses,
    #[error("zero address")]
    ZeroAddress,
    #[error("insufficient A amount")]
    InsufficientAAmount,
    #[error("insufficient B amount")]
    InsufficientBAmount,
    #[error("insufficient amount")]
    InsufficientAmount,
    #[error("insufficient input amount")]
    InsufficientInputAmount,
    #[error("insufficient output amount")]
    InsufficientOutputAmount,
    #[error("excessive input amount")]
    ExcessiveInputAmount,
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    #[error("insufficient initial liquidity")]
    InsufficientInitialLiquidity,
    #[error("insufficient liquidity minted")]
    InsufficientLiquidityMinted,
    #[error("insufficient liquidity burned")]
    InsufficientLiquidityBurned,
    #[error("invalid recipient")]
    InvalidTo,
    #[error("invalid path")]
    InvalidPath,
    #[error("expired")]
    Expired,

    #[error("K")]
    K,

    #[error("permit expired")]
    PermitExpired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("forbidden")]
    Forbidden,

    #[error("pair already initialized")]
    AlreadyInitialized,
    #[error("pair exists")]
    PairExists,
    #[error("pair not found: {0}")]
    PairNotFound(Address),

    #[error("insufficient balance of {token} for {owner}")]
    InsufficientBalance { token: TokenId, owner: Address },
    #[error("insufficient allowance of {token} from {owner} to {spender}")]
    InsufficientAllowance {
        token: TokenId,
        owner: Address,
        spender: Address,
    },
    #[error("transfer failed: {0}")]
    TransferFailed(String),
}

impl ExchangeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use ExchangeError::*;
        match self {
            ArithmeticOverflow | ArithmeticUnderflow | DivisionByZero => ErrorKind::Arithmetic,
            IdenticalAddresses
            | ZeroAddress
            | InsufficientAAmount
            | InsufficientBAmount
            | InsufficientAmount
            | InsufficientInputAmount
            | InsufficientOutputAmount
            | ExcessiveInputAmount
            | InsufficientLiquidity
            | InsufficientInitialLiquidity
            | InsufficientLiquidityMinted
            | InsufficientLiquidityBurned
            | InvalidTo
            | InvalidPath
            | Expired => ErrorKind::Validation,
            K => ErrorKind::Invariant,
            PermitExpired | InvalidSignature | Forbidden => ErrorKind::Authorization,
            AlreadyInitialized | PairExists | PairNotFound(_) => ErrorKind::State,
            InsufficientBalance { .. } | InsufficientAllowance { .. } | TransferFailed(_) => {
                ErrorKind::External
            }
        }
    }
}
