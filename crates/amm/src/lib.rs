//! Constant-product automated market maker for ERC-20 style tokens.
//!
//! This library provides:
//! - Pair ledgers holding two reserves, with LP shares, TWAP accumulators
//!   and an optional protocol fee
//! - A factory registry with deterministic pair addresses
//! - Signed permits for LP share allowances
//! - A router for liquidity provision, withdrawals and multi-hop swaps,
//!   including native-asset and fee-on-transfer variants
//!
//! Every state change goes through an [`Exchange`], which applies each
//! operation atomically against a [`TokenLedger`].

pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod factory;
pub mod ledger;
pub mod library;
pub mod lp_token;
pub mod math;
pub mod pair;
pub mod permit;
pub mod router;
pub mod state;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExchangeConfig, FEE_DENOMINATOR};
pub use error::{ErrorKind, ExchangeError, Result};
pub use exchange::Exchange;
pub use factory::{Factory, FeeSwitch};
pub use ledger::{AsDynLedger, Checkpoint, MemoryLedger, NativeWrapper, TokenLedger};
pub use lp_token::LiquidityToken;
pub use pair::{FeePolicy, NoProtocolFee, Pair, PendingSwap, SwapCallee};
pub use permit::PermitAuthorizer;
pub use router::Router;
pub use state::ExchangeState;
pub use types::{Address, Amount, Reserves, Signature, TokenId, B256, MINIMUM_LIQUIDITY, U256};
