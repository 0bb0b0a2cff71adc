//! Constant-product pair ledger.
//!
//! A [`Pair`] owns the recorded reserves of two tokens and the supply of its
//! liquidity shares. Tokens are moved into the pair's custody by the caller
//! *before* `mint` and `swap` settle; the pair always measures what it
//! received as `balance - reserve`, which keeps it correct for tokens that
//! charge a fee on transfer.

use crate::config::{ExchangeConfig, FEE_DENOMINATOR};
use crate::error::{ExchangeError, Result};
use crate::ledger::{AsDynLedger, TokenLedger};
use crate::lp_token::LiquidityToken;
use crate::math;
use crate::types::{Address, Amount, Reserves, TokenId, MINIMUM_LIQUIDITY, NULL_OWNER, U256};
use tracing::debug;

/// Protocol-fee strategy consulted by a pair on every mint and burn.
pub trait FeePolicy {
    /// Recipient of protocol-fee shares, or `None` while the fee is off.
    fn fee_to(&self) -> Option<Address>;

    /// Shares owed to the protocol for reserve growth from `root_k_last` to `root_k`.
    ///
    /// Defaults to one sixth of the growth: `S * (√k - √k_last) / (5√k + √k_last)`.
    fn protocol_fee_shares(
        &self,
        total_supply: Amount,
        root_k: Amount,
        root_k_last: Amount,
    ) -> Result<Amount> {
        let numerator = math::mul(total_supply, math::sub(root_k, root_k_last)?)?;
        let denominator = math::add(math::mul(root_k, U256::from(5))?, root_k_last)?;
        math::div(numerator, denominator)
    }
}

/// Policy with the protocol fee switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProtocolFee;

impl FeePolicy for NoProtocolFee {
    fn fee_to(&self) -> Option<Address> {
        None
    }
}

/// Receives the optimistic output of a swap before the pair settles it.
///
/// This is the flash-swap hook: the callee may use the output and must pay
/// the pair back (in either token) before returning.
pub trait SwapCallee {
    fn on_swap(
        &mut self,
        ledger: &mut dyn TokenLedger,
        pair: Address,
        amount0_out: Amount,
        amount1_out: Amount,
    ) -> Result<()>;
}

/// Output already sent by [`Pair::begin_swap`] and awaiting settlement.
#[derive(Debug)]
#[must_use = "a pending swap must be settled"]
pub struct PendingSwap {
    amount0_out: Amount,
    amount1_out: Amount,
    reserve0: Amount,
    reserve1: Amount,
}

/// One trading pair's reserve ledger.
#[derive(Debug, Clone)]
pub struct Pair {
    address: Address,
    factory: Address,
    token0: TokenId,
    token1: TokenId,
    initialized: bool,
    reserve0: Amount,
    reserve1: Amount,
    block_timestamp_last: u32,
    price0_cumulative_last: U256,
    price1_cumulative_last: U256,
    /// reserve0 * reserve1 after the most recent liquidity event (protocol fee only).
    k_last: U256,
    fee_bps: u32,
    lp: LiquidityToken,
}

impl Pair {
    /// Create an uninitialized pair living at `address`.
    pub fn new(address: Address, factory: Address, config: &ExchangeConfig) -> Self {
        Self {
            address,
            factory,
            token0: Address::ZERO,
            token1: Address::ZERO,
            initialized: false,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            block_timestamp_last: 0,
            price0_cumulative_last: U256::ZERO,
            price1_cumulative_last: U256::ZERO,
            k_last: U256::ZERO,
            fee_bps: config.fee_bps,
            lp: LiquidityToken::new(address, &config.lp_name, &config.lp_symbol, config.chain_id),
        }
    }

    /// Bind the pair to its (already ordered) tokens. Allowed once.
    pub fn initialize(&mut self, token0: TokenId, token1: TokenId) -> Result<()> {
        if self.initialized {
            return Err(ExchangeError::AlreadyInitialized);
        }
        self.token0 = token0;
        self.token1 = token1;
        self.initialized = true;
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn token0(&self) -> TokenId {
        self.token0
    }

    pub fn token1(&self) -> TokenId {
        self.token1
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    pub fn price0_cumulative_last(&self) -> U256 {
        self.price0_cumulative_last
    }

    pub fn price1_cumulative_last(&self) -> U256 {
        self.price1_cumulative_last
    }

    pub fn k_last(&self) -> U256 {
        self.k_last
    }

    /// The pair's liquidity-share token.
    pub fn lp(&self) -> &LiquidityToken {
        &self.lp
    }

    pub fn lp_mut(&mut self) -> &mut LiquidityToken {
        &mut self.lp
    }

    pub fn get_reserves(&self) -> Reserves {
        Reserves {
            reserve0: self.reserve0,
            reserve1: self.reserve1,
            block_timestamp_last: self.block_timestamp_last,
        }
    }

    /// Mint liquidity for tokens already transferred to the pair.
    ///
    /// Nothing is written until every check has passed, so a rejected mint
    /// leaves the pair untouched.
    pub fn mint<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &L,
        to: Address,
        fee_policy: &dyn FeePolicy,
        now: u64,
    ) -> Result<Amount> {
        let (reserve0, reserve1) = (self.reserve0, self.reserve1);
        let balance0 = ledger.balance_of(self.token0, self.address);
        let balance1 = ledger.balance_of(self.token1, self.address);
        let amount0 = math::sub(balance0, reserve0)?;
        let amount1 = math::sub(balance1, reserve1)?;

        let fee = self.accrue_protocol_fee(fee_policy)?;
        let total_supply = math::add(self.lp.total_supply(), fee.shares())?;
        let (liquidity, locked) = if total_supply.is_zero() {
            let root = math::sqrt(math::mul(amount0, amount1)?);
            if root <= MINIMUM_LIQUIDITY {
                return Err(ExchangeError::InsufficientInitialLiquidity);
            }
            (root - MINIMUM_LIQUIDITY, MINIMUM_LIQUIDITY)
        } else {
            let liquidity = math::min(
                math::mul_div(amount0, total_supply, reserve0)?,
                math::mul_div(amount1, total_supply, reserve1)?,
            );
            (liquidity, U256::ZERO)
        };
        if liquidity.is_zero() {
            return Err(ExchangeError::InsufficientLiquidityMinted);
        }
        // every share still fits once the fee and the lock are added
        math::add(math::add(total_supply, locked)?, liquidity)?;
        let update = self.reserve_update(balance0, balance1, now)?;
        let k_last = fee.k_last(&update)?;

        fee.apply(&mut self.lp)?;
        if !locked.is_zero() {
            self.lp.mint(NULL_OWNER, locked)?;
        }
        self.lp.mint(to, liquidity)?;
        self.apply_reserves(update);
        self.k_last = k_last;
        debug!(pair = %self.address, %to, %amount0, %amount1, %liquidity, "Mint");
        Ok(liquidity)
    }

    /// Burn the shares held by the pair itself and pay out the underlying tokens.
    ///
    /// The pair's own books change only after both payouts went through.
    pub fn burn<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        to: Address,
        fee_policy: &dyn FeePolicy,
        now: u64,
    ) -> Result<(Amount, Amount)> {
        let (token0, token1) = (self.token0, self.token1);
        let balance0 = ledger.balance_of(token0, self.address);
        let balance1 = ledger.balance_of(token1, self.address);
        let liquidity = self.lp.balance_of(self.address);

        let fee = self.accrue_protocol_fee(fee_policy)?;
        let total_supply = math::add(self.lp.total_supply(), fee.shares())?;
        if liquidity.is_zero() || total_supply.is_zero() {
            return Err(ExchangeError::InsufficientLiquidityBurned);
        }
        let amount0 = math::mul_div(liquidity, balance0, total_supply)?;
        let amount1 = math::mul_div(liquidity, balance1, total_supply)?;
        if amount0.is_zero() || amount1.is_zero() {
            return Err(ExchangeError::InsufficientLiquidityBurned);
        }

        ledger.transfer(token0, self.address, to, amount0)?;
        ledger.transfer(token1, self.address, to, amount1)?;

        let balance0 = ledger.balance_of(token0, self.address);
        let balance1 = ledger.balance_of(token1, self.address);
        let update = self.reserve_update(balance0, balance1, now)?;
        let k_last = fee.k_last(&update)?;

        fee.apply(&mut self.lp)?;
        self.lp.burn(self.address, liquidity)?;
        self.apply_reserves(update);
        self.k_last = k_last;
        debug!(pair = %self.address, %to, %amount0, %amount1, %liquidity, "Burn");
        Ok((amount0, amount1))
    }

    /// Swap in one call: optimistic transfer, optional flash callback, settlement.
    pub fn swap<'a, L: AsDynLedger<'a> + ?Sized>(
        &mut self,
        ledger: &mut L,
        amount0_out: Amount,
        amount1_out: Amount,
        to: Address,
        callee: Option<&mut dyn SwapCallee>,
        now: u64,
    ) -> Result<()> {
        let pending = self.begin_swap(ledger, amount0_out, amount1_out, to)?;
        if let Some(callee) = callee {
            callee.on_swap(ledger.as_dyn_ledger(), self.address, amount0_out, amount1_out)?;
        }
        self.settle_swap(ledger, pending, now)
    }

    /// First phase of a swap: validate the request and send the output to `to`.
    pub fn begin_swap<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        amount0_out: Amount,
        amount1_out: Amount,
        to: Address,
    ) -> Result<PendingSwap> {
        if amount0_out.is_zero() && amount1_out.is_zero() {
            return Err(ExchangeError::InsufficientOutputAmount);
        }
        let (reserve0, reserve1) = (self.reserve0, self.reserve1);
        if amount0_out >= reserve0 || amount1_out >= reserve1 {
            return Err(ExchangeError::InsufficientLiquidity);
        }
        if to == self.token0 || to == self.token1 {
            return Err(ExchangeError::InvalidTo);
        }

        if !amount0_out.is_zero() {
            ledger.transfer(self.token0, self.address, to, amount0_out)?;
        }
        if !amount1_out.is_zero() {
            ledger.transfer(self.token1, self.address, to, amount1_out)?;
        }

        Ok(PendingSwap {
            amount0_out,
            amount1_out,
            reserve0,
            reserve1,
        })
    }

    /// Second phase of a swap: measure the input, enforce the fee-adjusted
    /// constant product and record the new reserves.
    pub fn settle_swap<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &L,
        pending: PendingSwap,
        now: u64,
    ) -> Result<()> {
        let PendingSwap {
            amount0_out,
            amount1_out,
            reserve0,
            reserve1,
        } = pending;

        let balance0 = ledger.balance_of(self.token0, self.address);
        let balance1 = ledger.balance_of(self.token1, self.address);

        let amount0_in = Self::amount_in(balance0, reserve0, amount0_out);
        let amount1_in = Self::amount_in(balance1, reserve1, amount1_out);
        if amount0_in.is_zero() && amount1_in.is_zero() {
            return Err(ExchangeError::InsufficientInputAmount);
        }

        let fee = U256::from(self.fee_bps);
        let scale = U256::from(FEE_DENOMINATOR);
        let balance0_adjusted = math::sub(math::mul(balance0, scale)?, math::mul(amount0_in, fee)?)?;
        let balance1_adjusted = math::sub(math::mul(balance1, scale)?, math::mul(amount1_in, fee)?)?;
        let k_before = math::mul(math::mul(reserve0, reserve1)?, math::mul(scale, scale)?)?;
        if math::mul(balance0_adjusted, balance1_adjusted)? < k_before {
            return Err(ExchangeError::K);
        }

        self.update(balance0, balance1, now)?;
        debug!(
            pair = %self.address,
            %amount0_in,
            %amount1_in,
            %amount0_out,
            %amount1_out,
            "Swap"
        );
        Ok(())
    }

    /// Send any balance above the recorded reserves to `to`.
    pub fn skim<L: TokenLedger + ?Sized>(&mut self, ledger: &mut L, to: Address) -> Result<()> {
        let (token0, token1) = (self.token0, self.token1);
        let excess0 = math::sub(ledger.balance_of(token0, self.address), self.reserve0)?;
        let excess1 = math::sub(ledger.balance_of(token1, self.address), self.reserve1)?;
        if !excess0.is_zero() {
            ledger.transfer(token0, self.address, to, excess0)?;
        }
        if !excess1.is_zero() {
            ledger.transfer(token1, self.address, to, excess1)?;
        }
        Ok(())
    }

    /// Force the reserves to match the balances.
    pub fn sync<L: TokenLedger + ?Sized>(&mut self, ledger: &L, now: u64) -> Result<()> {
        let balance0 = ledger.balance_of(self.token0, self.address);
        let balance1 = ledger.balance_of(self.token1, self.address);
        self.update(balance0, balance1, now)
    }

    fn amount_in(balance: Amount, reserve: Amount, amount_out: Amount) -> Amount {
        let floor = reserve - amount_out;
        if balance > floor {
            balance - floor
        } else {
            U256::ZERO
        }
    }

    /// Record new reserves and, on the first call of each second, accumulate prices.
    fn update(&mut self, balance0: Amount, balance1: Amount, now: u64) -> Result<()> {
        let update = self.reserve_update(balance0, balance1, now)?;
        self.apply_reserves(update);
        Ok(())
    }

    fn reserve_update(&self, balance0: Amount, balance1: Amount, now: u64) -> Result<ReserveUpdate> {
        let reserve0 = math::to_reserve(balance0)?;
        let reserve1 = math::to_reserve(balance1)?;

        let block_timestamp = (now % (1u64 << 32)) as u32;
        let time_elapsed = block_timestamp.wrapping_sub(self.block_timestamp_last);
        let mut price0_cumulative = self.price0_cumulative_last;
        let mut price1_cumulative = self.price1_cumulative_last;
        if time_elapsed > 0 && !self.reserve0.is_zero() && !self.reserve1.is_zero() {
            let elapsed = U256::from(time_elapsed);
            // accumulators wrap, like the 32-bit timestamps
            let price0 = math::uqdiv(math::encode(self.reserve1), self.reserve0)?;
            let price1 = math::uqdiv(math::encode(self.reserve0), self.reserve1)?;
            price0_cumulative = price0_cumulative.wrapping_add(price0.wrapping_mul(elapsed));
            price1_cumulative = price1_cumulative.wrapping_add(price1.wrapping_mul(elapsed));
        }

        Ok(ReserveUpdate {
            reserve0,
            reserve1,
            block_timestamp,
            price0_cumulative,
            price1_cumulative,
        })
    }

    fn apply_reserves(&mut self, update: ReserveUpdate) {
        self.reserve0 = update.reserve0;
        self.reserve1 = update.reserve1;
        self.block_timestamp_last = update.block_timestamp;
        self.price0_cumulative_last = update.price0_cumulative;
        self.price1_cumulative_last = update.price1_cumulative;
        debug!(pair = %self.address, reserve0 = %update.reserve0, reserve1 = %update.reserve1, "Sync");
    }

    /// The protocol's share of fee growth since the last liquidity event, not yet minted.
    fn accrue_protocol_fee(&self, fee_policy: &dyn FeePolicy) -> Result<ProtocolFee> {
        let Some(fee_to) = fee_policy.fee_to() else {
            return Ok(ProtocolFee::Off);
        };

        let mut shares = U256::ZERO;
        if !self.k_last.is_zero() {
            let root_k = math::sqrt(math::mul(self.reserve0, self.reserve1)?);
            let root_k_last = math::sqrt(self.k_last);
            if root_k > root_k_last {
                shares = fee_policy.protocol_fee_shares(
                    self.lp.total_supply(),
                    root_k,
                    root_k_last,
                )?;
            }
        }
        Ok(ProtocolFee::On { fee_to, shares })
    }
}

/// Reserves and accumulators computed ahead of being written.
struct ReserveUpdate {
    reserve0: Amount,
    reserve1: Amount,
    block_timestamp: u32,
    price0_cumulative: U256,
    price1_cumulative: U256,
}

/// Protocol fee owed at a liquidity event.
enum ProtocolFee {
    Off,
    On { fee_to: Address, shares: Amount },
}

impl ProtocolFee {
    fn shares(&self) -> Amount {
        match self {
            Self::Off => U256::ZERO,
            Self::On { shares, .. } => *shares,
        }
    }

    /// `k_last` to record once the event lands; zero while the fee is off.
    fn k_last(&self, update: &ReserveUpdate) -> Result<U256> {
        match self {
            Self::Off => Ok(U256::ZERO),
            Self::On { .. } => math::mul(update.reserve0, update.reserve1),
        }
    }

    fn apply(&self, lp: &mut LiquidityToken) -> Result<()> {
        if let Self::On { fee_to, shares } = *self {
            if !shares.is_zero() {
                lp.mint(fee_to, shares)?;
                debug!(pair = %lp.address(), %fee_to, liquidity = %shares, "protocol fee minted");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn token0() -> TokenId {
        Address::repeat_byte(0x01)
    }

    fn token1() -> TokenId {
        Address::repeat_byte(0x02)
    }

    fn pair_address() -> Address {
        Address::repeat_byte(0x50)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xAA)
    }

    fn fee_recipient() -> Address {
        Address::repeat_byte(0xFE)
    }

    struct FeeOn;

    impl FeePolicy for FeeOn {
        fn fee_to(&self) -> Option<Address> {
            Some(fee_recipient())
        }
    }

    fn setup() -> (Pair, MemoryLedger) {
        let mut pair = Pair::new(pair_address(), Address::repeat_byte(0xFA), &ExchangeConfig::default());
        pair.initialize(token0(), token1()).unwrap();

        let mut ledger = MemoryLedger::new(Address::repeat_byte(0xEE));
        let supply = U256::from(10u128.pow(30));
        ledger.mint(token0(), alice(), supply).unwrap();
        ledger.mint(token1(), alice(), supply).unwrap();
        (pair, ledger)
    }

    fn deposit(pair: &Pair, ledger: &mut MemoryLedger, amount0: u128, amount1: u128) {
        ledger
            .transfer(token0(), alice(), pair.address(), U256::from(amount0))
            .unwrap();
        ledger
            .transfer(token1(), alice(), pair.address(), U256::from(amount1))
            .unwrap();
    }

    fn add_liquidity(
        pair: &mut Pair,
        ledger: &mut MemoryLedger,
        amount0: u128,
        amount1: u128,
        policy: &dyn FeePolicy,
        now: u64,
    ) -> Amount {
        deposit(pair, ledger, amount0, amount1);
        pair.mint(&*ledger, alice(), policy, now).unwrap()
    }

    #[test]
    fn test_initialize_once() {
        let (mut pair, _) = setup();
        assert_eq!(
            pair.initialize(token0(), token1()),
            Err(ExchangeError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_first_mint() {
        let (mut pair, mut ledger) = setup();
        let amount = 10u128.pow(18);
        let liquidity = add_liquidity(&mut pair, &mut ledger, amount, 4 * amount, &NoProtocolFee, 1);

        // sqrt(1e18 * 4e18) = 2e18
        let expected = U256::from(2 * amount);
        assert_eq!(liquidity, expected - MINIMUM_LIQUIDITY);
        assert_eq!(pair.lp().total_supply(), expected);
        assert_eq!(pair.lp().balance_of(NULL_OWNER), MINIMUM_LIQUIDITY);
        assert_eq!(pair.lp().balance_of(alice()), expected - MINIMUM_LIQUIDITY);

        let reserves = pair.get_reserves();
        assert_eq!(reserves.reserve0, U256::from(amount));
        assert_eq!(reserves.reserve1, U256::from(4 * amount));
        assert_eq!(reserves.block_timestamp_last, 1);
    }

    #[test]
    fn test_first_mint_at_minimum_fails() {
        let (mut pair, mut ledger) = setup();
        deposit(&pair, &mut ledger, 1000, 1000);
        assert_eq!(
            pair.mint(&ledger, alice(), &NoProtocolFee, 1),
            Err(ExchangeError::InsufficientInitialLiquidity)
        );
        assert_eq!(pair.lp().total_supply(), U256::ZERO);
    }

    #[test]
    fn test_mint_takes_the_smaller_share() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &NoProtocolFee, 1);

        // Unbalanced deposit: only the 100/10000 side counts
        let liquidity = add_liquidity(&mut pair, &mut ledger, 100, 500, &NoProtocolFee, 2);
        assert_eq!(liquidity, U256::from(100));
        assert_eq!(pair.get_reserves().reserve1, U256::from(10_500));
    }

    #[test]
    fn test_mint_without_deposit_fails() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &NoProtocolFee, 1);
        assert_eq!(
            pair.mint(&ledger, alice(), &NoProtocolFee, 2),
            Err(ExchangeError::InsufficientLiquidityMinted)
        );
    }

    #[test]
    fn test_burn_returns_proportional_amounts() {
        let (mut pair, mut ledger) = setup();
        let amount = 3 * 10u128.pow(18);
        let liquidity = add_liquidity(&mut pair, &mut ledger, amount, amount, &NoProtocolFee, 1);

        pair.lp_mut()
            .transfer(alice(), pair_address(), liquidity)
            .unwrap();
        let before0 = ledger.balance_of(token0(), alice());
        let (amount0, amount1) = pair.burn(&mut ledger, alice(), &NoProtocolFee, 2).unwrap();

        let expected = U256::from(amount) - MINIMUM_LIQUIDITY;
        assert_eq!(amount0, expected);
        assert_eq!(amount1, expected);
        assert_eq!(ledger.balance_of(token0(), alice()), before0 + expected);
        assert_eq!(pair.lp().total_supply(), MINIMUM_LIQUIDITY);
        assert_eq!(pair.get_reserves().reserve0, MINIMUM_LIQUIDITY);
        assert_eq!(pair.get_reserves().reserve1, MINIMUM_LIQUIDITY);
    }

    #[test]
    fn test_burn_nothing_fails() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &NoProtocolFee, 1);
        assert_eq!(
            pair.burn(&mut ledger, alice(), &NoProtocolFee, 2),
            Err(ExchangeError::InsufficientLiquidityBurned)
        );
    }

    #[test]
    fn test_swap_token0_for_token1() {
        let (mut pair, mut ledger) = setup();
        let unit = 10u128.pow(18);
        add_liquidity(&mut pair, &mut ledger, 5 * unit, 10 * unit, &NoProtocolFee, 1);

        // 1 in, x*y=k with 0.3% fee: 1662497915624478906
        let amount_in = U256::from(unit);
        let expected_out = U256::from(1_662_497_915_624_478_906u128);
        ledger
            .transfer(token0(), alice(), pair_address(), amount_in)
            .unwrap();
        pair.swap(&mut ledger, U256::ZERO, expected_out, alice(), None, 2)
            .unwrap();

        let reserves = pair.get_reserves();
        assert_eq!(reserves.reserve0, U256::from(6 * unit));
        assert_eq!(reserves.reserve1, U256::from(10 * unit) - expected_out);
    }

    #[test]
    fn test_swap_one_wei_too_many_fails_k() {
        let (mut pair, mut ledger) = setup();
        let unit = 10u128.pow(18);
        add_liquidity(&mut pair, &mut ledger, 5 * unit, 10 * unit, &NoProtocolFee, 1);

        ledger
            .transfer(token0(), alice(), pair_address(), U256::from(unit))
            .unwrap();
        let too_much = U256::from(1_662_497_915_624_478_907u128);
        assert_eq!(
            pair.swap(&mut ledger, U256::ZERO, too_much, alice(), None, 2),
            Err(ExchangeError::K)
        );
    }

    #[test]
    fn test_swap_validation() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &NoProtocolFee, 1);

        assert!(matches!(
            pair.begin_swap(&mut ledger, U256::ZERO, U256::ZERO, alice()),
            Err(ExchangeError::InsufficientOutputAmount)
        ));
        assert!(matches!(
            pair.begin_swap(&mut ledger, U256::from(10_000), U256::ZERO, alice()),
            Err(ExchangeError::InsufficientLiquidity)
        ));
        assert!(matches!(
            pair.begin_swap(&mut ledger, U256::from(1), U256::ZERO, token1()),
            Err(ExchangeError::InvalidTo)
        ));
        assert_eq!(
            pair.swap(&mut ledger, U256::from(1), U256::ZERO, alice(), None, 2),
            Err(ExchangeError::InsufficientInputAmount)
        );
    }

    struct Repay {
        amount1: Amount,
    }

    impl SwapCallee for Repay {
        fn on_swap(
            &mut self,
            ledger: &mut dyn TokenLedger,
            pair: Address,
            amount0_out: Amount,
            _amount1_out: Amount,
        ) -> Result<()> {
            // borrowed token0, pays back in token1
            assert!(!amount0_out.is_zero());
            ledger.transfer(token1(), alice(), pair, self.amount1)
        }
    }

    #[test]
    fn test_flash_swap_repaid_in_other_token() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 1_000_000, 1_000_000, &NoProtocolFee, 1);

        let mut callee = Repay {
            amount1: U256::from(1_100),
        };
        pair.swap(
            &mut ledger,
            U256::from(1_000),
            U256::ZERO,
            alice(),
            Some(&mut callee),
            2,
        )
        .unwrap();
        let reserves = pair.get_reserves();
        assert_eq!(reserves.reserve0, U256::from(999_000));
        assert_eq!(reserves.reserve1, U256::from(1_001_100));

        let mut stingy = Repay {
            amount1: U256::from(1),
        };
        assert_eq!(
            pair.swap(
                &mut ledger,
                U256::from(1_000),
                U256::ZERO,
                alice(),
                Some(&mut stingy),
                3
            ),
            Err(ExchangeError::K)
        );
    }

    #[test]
    fn test_zero_fee_pair() {
        let config = ExchangeConfig::default().with_fee_bps(0);
        let (_, mut ledger) = setup();
        let mut pair = Pair::new(pair_address(), Address::repeat_byte(0xFA), &config);
        pair.initialize(token0(), token1()).unwrap();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &NoProtocolFee, 1);

        // Without a fee, 1000 in buys floor(1000 * 10000 / 11000) = 909
        ledger
            .transfer(token0(), alice(), pair_address(), U256::from(1000))
            .unwrap();
        pair.swap(&mut ledger, U256::ZERO, U256::from(909), alice(), None, 2)
            .unwrap();
    }

    #[test]
    fn test_price_accumulators() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 1_000, 4_000, &NoProtocolFee, 10);
        assert_eq!(pair.price0_cumulative_last(), U256::ZERO);

        pair.sync(&ledger, 20).unwrap();
        // price0 = 4, price1 = 1/4, over 10 seconds
        assert_eq!(
            pair.price0_cumulative_last(),
            math::encode(U256::from(4)) * U256::from(10)
        );
        assert_eq!(
            pair.price1_cumulative_last(),
            math::Q112 / U256::from(4) * U256::from(10)
        );

        // Same second: no accumulation
        pair.sync(&ledger, 20).unwrap();
        assert_eq!(
            pair.price0_cumulative_last(),
            math::encode(U256::from(4)) * U256::from(10)
        );
    }

    #[test]
    fn test_skim_and_sync() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &NoProtocolFee, 1);
        ledger
            .transfer(token0(), alice(), pair_address(), U256::from(500))
            .unwrap();

        let receiver = Address::repeat_byte(0xCC);
        pair.skim(&mut ledger, receiver).unwrap();
        assert_eq!(ledger.balance_of(token0(), receiver), U256::from(500));
        assert_eq!(pair.get_reserves().reserve0, U256::from(10_000));

        ledger
            .transfer(token1(), alice(), pair_address(), U256::from(7))
            .unwrap();
        pair.sync(&ledger, 2).unwrap();
        assert_eq!(pair.get_reserves().reserve1, U256::from(10_007));
    }

    #[test]
    fn test_reserve_overflow() {
        let (mut pair, mut ledger) = setup();
        ledger
            .mint(token0(), pair_address(), math::Q112)
            .unwrap();
        ledger.mint(token1(), pair_address(), U256::from(1)).unwrap();
        assert_eq!(pair.sync(&ledger, 1), Err(ExchangeError::ArithmeticOverflow));
    }

    #[test]
    fn test_protocol_fee_minted_on_next_liquidity_event() {
        let (mut pair, mut ledger) = setup();
        let unit = 10u128.pow(18);
        add_liquidity(&mut pair, &mut ledger, 1000 * unit, 1000 * unit, &FeeOn, 1);
        assert_eq!(pair.k_last(), U256::from(1000 * unit) * U256::from(1000 * unit));

        let amount_in = U256::from(unit);
        let amount_out = U256::from(996_006_981_039_903_216u128);
        ledger
            .transfer(token1(), alice(), pair_address(), amount_in)
            .unwrap();
        pair.swap(&mut ledger, amount_out, U256::ZERO, alice(), None, 2)
            .unwrap();

        // Fee shares only appear at the next mint/burn
        assert_eq!(pair.lp().balance_of(fee_recipient()), U256::ZERO);
        let liquidity = pair.lp().balance_of(alice());
        pair.lp_mut()
            .transfer(alice(), pair_address(), liquidity)
            .unwrap();
        pair.burn(&mut ledger, alice(), &FeeOn, 3).unwrap();

        assert_eq!(
            pair.lp().balance_of(fee_recipient()),
            U256::from(249_750_499_251_388u128)
        );
        assert_eq!(
            pair.lp().total_supply(),
            MINIMUM_LIQUIDITY + U256::from(249_750_499_251_388u128)
        );
    }

    #[test]
    fn test_fee_switch_off_clears_k_last() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 10_000, 10_000, &FeeOn, 1);
        assert!(!pair.k_last().is_zero());

        add_liquidity(&mut pair, &mut ledger, 100, 100, &NoProtocolFee, 2);
        assert_eq!(pair.k_last(), U256::ZERO);
    }

    #[test]
    fn test_rejected_first_mint_leaves_pair_untouched() {
        let (mut pair, mut ledger) = setup();
        // too much token0 to record as a reserve
        ledger.mint(token0(), pair_address(), math::Q112).unwrap();
        ledger
            .mint(token1(), pair_address(), U256::from(10_000_000))
            .unwrap();

        assert_eq!(
            pair.mint(&ledger, alice(), &NoProtocolFee, 1),
            Err(ExchangeError::ArithmeticOverflow)
        );
        assert_eq!(pair.lp().total_supply(), U256::ZERO);
        assert_eq!(pair.lp().balance_of(NULL_OWNER), U256::ZERO);
        assert_eq!(pair.lp().balance_of(alice()), U256::ZERO);
        assert!(pair.get_reserves().is_empty());
        assert_eq!(pair.get_reserves().block_timestamp_last, 0);
    }

    #[test]
    fn test_rejected_mint_does_not_accrue_protocol_fee() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 1_000_000, 1_000_000, &FeeOn, 1);
        let k_last = pair.k_last();

        // donation grows k without a liquidity event
        ledger
            .transfer(token0(), alice(), pair_address(), U256::from(500_000))
            .unwrap();
        pair.sync(&ledger, 2).unwrap();
        let supply = pair.lp().total_supply();

        for now in 3..6 {
            assert_eq!(
                pair.mint(&ledger, alice(), &FeeOn, now),
                Err(ExchangeError::InsufficientLiquidityMinted)
            );
        }
        assert_eq!(pair.lp().balance_of(fee_recipient()), U256::ZERO);
        assert_eq!(pair.lp().total_supply(), supply);
        assert_eq!(pair.k_last(), k_last);

        // the next real deposit mints the fee exactly once
        let reserves = pair.get_reserves();
        let expected_fee = FeeOn
            .protocol_fee_shares(
                supply,
                math::sqrt(reserves.reserve0 * reserves.reserve1),
                math::sqrt(k_last),
            )
            .unwrap();
        assert!(!expected_fee.is_zero());
        let liquidity = add_liquidity(&mut pair, &mut ledger, 150_000, 100_000, &FeeOn, 6);
        assert_eq!(pair.lp().balance_of(fee_recipient()), expected_fee);
        assert_eq!(pair.lp().total_supply(), supply + expected_fee + liquidity);
        assert_eq!(
            pair.k_last(),
            U256::from(1_650_000u64) * U256::from(1_100_000u64)
        );
    }

    #[test]
    fn test_swap_through_dyn_ledger() {
        let (mut pair, mut ledger) = setup();
        add_liquidity(&mut pair, &mut ledger, 1_000_000, 1_000_000, &NoProtocolFee, 1);

        let mut callee = Repay {
            amount1: U256::from(1_100),
        };
        let dyn_ledger: &mut dyn TokenLedger = &mut ledger;
        pair.swap(
            dyn_ledger,
            U256::from(1_000),
            U256::ZERO,
            alice(),
            Some(&mut callee),
            2,
        )
        .unwrap();
        assert_eq!(pair.get_reserves().reserve1, U256::from(1_001_100));
    }
}
