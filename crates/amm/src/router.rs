//! User-facing router: liquidity provision, withdrawals and multi-hop swaps.
//!
//! The router keeps no state of its own. Each operation checks its deadline,
//! then runs as a single [`Exchange::transact`] unit: token pulls, pair
//! mutations, wrapping and refunds either all happen or none do.
//!
//! Callers approve the router's address on the token ledger (or sign a
//! permit for liquidity shares) before calling it. Native value sent with a
//! payable call is passed as `value` and debited from `sender`.

use crate::error::{ExchangeError, Result};
use crate::exchange::Exchange;
use crate::ledger::{Checkpoint, NativeWrapper, TokenLedger};
use crate::library;
use crate::math;
use crate::state::ExchangeState;
use crate::types::{Address, Amount, Signature, TokenId, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Stateless orchestrator over a shared [`Exchange`].
#[derive(Debug)]
pub struct Router<L> {
    exchange: Arc<Exchange<L>>,
    address: Address,
    weth: TokenId,
}

impl<L> Clone for Router<L> {
    fn clone(&self) -> Self {
        Self {
            exchange: Arc::clone(&self.exchange),
            address: self.address,
            weth: self.weth,
        }
    }
}

impl<L: TokenLedger + NativeWrapper + Checkpoint> Router<L> {
    /// Create a router living at `address`. The wrapped native token is taken
    /// from the ledger.
    pub fn new(exchange: Arc<Exchange<L>>, address: Address) -> Self {
        let weth = exchange.read(|state| state.ledger().wrapped());
        Self {
            exchange,
            address,
            weth,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn factory(&self) -> Address {
        self.exchange.factory_address()
    }

    #[allow(non_snake_case)]
    pub fn WETH(&self) -> TokenId {
        self.weth
    }

    pub fn exchange(&self) -> &Arc<Exchange<L>> {
        &self.exchange
    }

    // ---------------------------------------------------------------------
    // Add liquidity
    // ---------------------------------------------------------------------

    /// Deposit into the `token_a`/`token_b` pair at the current ratio,
    /// creating the pair if needed. Returns `(amount_a, amount_b, liquidity)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_liquidity(
        &self,
        sender: Address,
        token_a: TokenId,
        token_b: TokenId,
        amount_a_desired: Amount,
        amount_b_desired: Amount,
        amount_a_min: Amount,
        amount_b_min: Amount,
        to: Address,
        deadline: U256,
    ) -> Result<(Amount, Amount, Amount)> {
        let result = self.exchange.transact_before(deadline, |state, now| {
            let (amount_a, amount_b) = Self::optimal_deposit(
                state,
                token_a,
                token_b,
                amount_a_desired,
                amount_b_desired,
                amount_a_min,
                amount_b_min,
            )?;
            let pair = library::pair_for(state.factory().address(), token_a, token_b)?;
            state
                .ledger_mut()
                .transfer_from(token_a, self.address, sender, pair, amount_a)?;
            state
                .ledger_mut()
                .transfer_from(token_b, self.address, sender, pair, amount_b)?;
            let liquidity = state.mint(pair, to, now)?;
            Ok((amount_a, amount_b, liquidity))
        })?;
        info!(
            %sender,
            %token_a,
            %token_b,
            amount_a = %result.0,
            amount_b = %result.1,
            liquidity = %result.2,
            "Liquidity added"
        );
        Ok(result)
    }

    /// [`Self::add_liquidity`] with the native asset as one side. Unused
    /// `value` is refunded to `sender`. Returns `(amount_token, amount_eth, liquidity)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_liquidity_eth(
        &self,
        sender: Address,
        value: Amount,
        token: TokenId,
        amount_token_desired: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
        deadline: U256,
    ) -> Result<(Amount, Amount, Amount)> {
        let result = self.exchange.transact_before(deadline, |state, now| {
            state
                .ledger_mut()
                .transfer_native(sender, self.address, value)?;
            let (amount_token, amount_eth) = Self::optimal_deposit(
                state,
                token,
                self.weth,
                amount_token_desired,
                value,
                amount_token_min,
                amount_eth_min,
            )?;
            let pair = library::pair_for(state.factory().address(), token, self.weth)?;
            state
                .ledger_mut()
                .transfer_from(token, self.address, sender, pair, amount_token)?;
            self.wrap_into(state, pair, amount_eth)?;
            let liquidity = state.mint(pair, to, now)?;
            if value > amount_eth {
                state
                    .ledger_mut()
                    .transfer_native(self.address, sender, value - amount_eth)?;
            }
            Ok((amount_token, amount_eth, liquidity))
        })?;
        info!(
            %sender,
            %token,
            amount_token = %result.0,
            amount_eth = %result.1,
            liquidity = %result.2,
            "ETH liquidity added"
        );
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // Remove liquidity
    // ---------------------------------------------------------------------

    /// Burn `liquidity` shares of the `token_a`/`token_b` pair. Returns `(amount_a, amount_b)`.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity(
        &self,
        sender: Address,
        token_a: TokenId,
        token_b: TokenId,
        liquidity: Amount,
        amount_a_min: Amount,
        amount_b_min: Amount,
        to: Address,
        deadline: U256,
    ) -> Result<(Amount, Amount)> {
        let result = self.exchange.transact_before(deadline, |state, now| {
            self.withdraw(
                state,
                now,
                sender,
                token_a,
                token_b,
                liquidity,
                amount_a_min,
                amount_b_min,
                to,
            )
        })?;
        self.log_removal(sender, token_a, token_b, liquidity, result);
        Ok(result)
    }

    /// [`Self::remove_liquidity`] with the native asset as one side, unwrapped
    /// before it is sent to `to`. Returns `(amount_token, amount_eth)`.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity_eth(
        &self,
        sender: Address,
        token: TokenId,
        liquidity: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
        deadline: U256,
    ) -> Result<(Amount, Amount)> {
        let result = self.exchange.transact_before(deadline, |state, now| {
            self.withdraw_eth(
                state,
                now,
                sender,
                token,
                liquidity,
                amount_token_min,
                amount_eth_min,
                to,
            )
        })?;
        self.log_removal(sender, token, self.weth, liquidity, result);
        Ok(result)
    }

    /// [`Self::remove_liquidity`] authorised by a permit signature instead of
    /// a prior approval. `approve_max` permits `U256::MAX` rather than `liquidity`.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity_with_permit(
        &self,
        sender: Address,
        token_a: TokenId,
        token_b: TokenId,
        liquidity: Amount,
        amount_a_min: Amount,
        amount_b_min: Amount,
        to: Address,
        deadline: U256,
        approve_max: bool,
        signature: &Signature,
    ) -> Result<(Amount, Amount)> {
        let result = self.exchange.transact_before(deadline, |state, now| {
            self.permit(state, now, sender, token_a, token_b, liquidity, deadline, approve_max, signature)?;
            self.withdraw(
                state,
                now,
                sender,
                token_a,
                token_b,
                liquidity,
                amount_a_min,
                amount_b_min,
                to,
            )
        })?;
        self.log_removal(sender, token_a, token_b, liquidity, result);
        Ok(result)
    }

    /// [`Self::remove_liquidity_eth`] authorised by a permit signature.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity_eth_with_permit(
        &self,
        sender: Address,
        token: TokenId,
        liquidity: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
        deadline: U256,
        approve_max: bool,
        signature: &Signature,
    ) -> Result<(Amount, Amount)> {
        let result = self.exchange.transact_before(deadline, |state, now| {
            self.permit(state, now, sender, token, self.weth, liquidity, deadline, approve_max, signature)?;
            self.withdraw_eth(
                state,
                now,
                sender,
                token,
                liquidity,
                amount_token_min,
                amount_eth_min,
                to,
            )
        })?;
        self.log_removal(sender, token, self.weth, liquidity, result);
        Ok(result)
    }

    /// ETH withdrawal for tokens that charge a fee on transfer: forwards
    /// whatever token balance actually reached the router. Returns `amount_eth`.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity_eth_supporting_fee_on_transfer_tokens(
        &self,
        sender: Address,
        token: TokenId,
        liquidity: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
        deadline: U256,
    ) -> Result<Amount> {
        self.exchange.transact_before(deadline, |state, now| {
            self.withdraw_eth_fee_on_transfer(
                state,
                now,
                sender,
                token,
                liquidity,
                amount_token_min,
                amount_eth_min,
                to,
            )
        })
    }

    /// Permit-authorised variant of
    /// [`Self::remove_liquidity_eth_supporting_fee_on_transfer_tokens`].
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity_eth_with_permit_supporting_fee_on_transfer_tokens(
        &self,
        sender: Address,
        token: TokenId,
        liquidity: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
        deadline: U256,
        approve_max: bool,
        signature: &Signature,
    ) -> Result<Amount> {
        self.exchange.transact_before(deadline, |state, now| {
            self.permit(state, now, sender, token, self.weth, liquidity, deadline, approve_max, signature)?;
            self.withdraw_eth_fee_on_transfer(
                state,
                now,
                sender,
                token,
                liquidity,
                amount_token_min,
                amount_eth_min,
                to,
            )
        })
    }

    // ---------------------------------------------------------------------
    // Swaps
    // ---------------------------------------------------------------------

    /// Sell exactly `amount_in` of `path[0]` for at least `amount_out_min` of the last token.
    pub fn swap_exact_tokens_for_tokens(
        &self,
        sender: Address,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<Vec<Amount>> {
        let amounts = self.exchange.transact_before(deadline, |state, now| {
            let amounts = library::get_amounts_out(state.factory(), amount_in, path)?;
            if amounts[amounts.len() - 1] < amount_out_min {
                return Err(ExchangeError::InsufficientOutputAmount);
            }
            self.pull_into_first_pair(state, sender, path, amounts[0])?;
            self.swap_hops(state, now, &amounts, path, to)?;
            Ok(amounts)
        })?;
        self.log_swap(sender, path, &amounts);
        Ok(amounts)
    }

    /// Buy exactly `amount_out` of the last token for at most `amount_in_max` of `path[0]`.
    pub fn swap_tokens_for_exact_tokens(
        &self,
        sender: Address,
        amount_out: Amount,
        amount_in_max: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<Vec<Amount>> {
        let amounts = self.exchange.transact_before(deadline, |state, now| {
            let amounts = library::get_amounts_in(state.factory(), amount_out, path)?;
            if amounts[0] > amount_in_max {
                return Err(ExchangeError::ExcessiveInputAmount);
            }
            self.pull_into_first_pair(state, sender, path, amounts[0])?;
            self.swap_hops(state, now, &amounts, path, to)?;
            Ok(amounts)
        })?;
        self.log_swap(sender, path, &amounts);
        Ok(amounts)
    }

    /// Sell all of `value` (native) for at least `amount_out_min`; `path[0]` must be WETH.
    pub fn swap_exact_eth_for_tokens(
        &self,
        sender: Address,
        value: Amount,
        amount_out_min: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<Vec<Amount>> {
        let amounts = self.exchange.transact_before(deadline, |state, now| {
            self.ensure_path_starts_with_weth(path)?;
            let amounts = library::get_amounts_out(state.factory(), value, path)?;
            if amounts[amounts.len() - 1] < amount_out_min {
                return Err(ExchangeError::InsufficientOutputAmount);
            }
            state
                .ledger_mut()
                .transfer_native(sender, self.address, value)?;
            let pair = library::pair_for(state.factory().address(), path[0], path[1])?;
            self.wrap_into(state, pair, amounts[0])?;
            self.swap_hops(state, now, &amounts, path, to)?;
            Ok(amounts)
        })?;
        self.log_swap(sender, path, &amounts);
        Ok(amounts)
    }

    /// Buy exactly `amount_out` native for at most `amount_in_max`; the last token must be WETH.
    pub fn swap_tokens_for_exact_eth(
        &self,
        sender: Address,
        amount_out: Amount,
        amount_in_max: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<Vec<Amount>> {
        let amounts = self.exchange.transact_before(deadline, |state, now| {
            self.ensure_path_ends_with_weth(path)?;
            let amounts = library::get_amounts_in(state.factory(), amount_out, path)?;
            if amounts[0] > amount_in_max {
                return Err(ExchangeError::ExcessiveInputAmount);
            }
            self.pull_into_first_pair(state, sender, path, amounts[0])?;
            self.swap_hops(state, now, &amounts, path, self.address)?;
            self.unwrap_to(state, amounts[amounts.len() - 1], to)?;
            Ok(amounts)
        })?;
        self.log_swap(sender, path, &amounts);
        Ok(amounts)
    }

    /// Sell exactly `amount_in` for at least `amount_out_min` native; the last token must be WETH.
    pub fn swap_exact_tokens_for_eth(
        &self,
        sender: Address,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<Vec<Amount>> {
        let amounts = self.exchange.transact_before(deadline, |state, now| {
            self.ensure_path_ends_with_weth(path)?;
            let amounts = library::get_amounts_out(state.factory(), amount_in, path)?;
            if amounts[amounts.len() - 1] < amount_out_min {
                return Err(ExchangeError::InsufficientOutputAmount);
            }
            self.pull_into_first_pair(state, sender, path, amounts[0])?;
            self.swap_hops(state, now, &amounts, path, self.address)?;
            self.unwrap_to(state, amounts[amounts.len() - 1], to)?;
            Ok(amounts)
        })?;
        self.log_swap(sender, path, &amounts);
        Ok(amounts)
    }

    /// Buy exactly `amount_out` with native `value`, refunding the rest; `path[0]` must be WETH.
    pub fn swap_eth_for_exact_tokens(
        &self,
        sender: Address,
        value: Amount,
        amount_out: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<Vec<Amount>> {
        let amounts = self.exchange.transact_before(deadline, |state, now| {
            self.ensure_path_starts_with_weth(path)?;
            let amounts = library::get_amounts_in(state.factory(), amount_out, path)?;
            if amounts[0] > value {
                return Err(ExchangeError::ExcessiveInputAmount);
            }
            state
                .ledger_mut()
                .transfer_native(sender, self.address, value)?;
            let pair = library::pair_for(state.factory().address(), path[0], path[1])?;
            self.wrap_into(state, pair, amounts[0])?;
            self.swap_hops(state, now, &amounts, path, to)?;
            if value > amounts[0] {
                state
                    .ledger_mut()
                    .transfer_native(self.address, sender, value - amounts[0])?;
            }
            Ok(amounts)
        })?;
        self.log_swap(sender, path, &amounts);
        Ok(amounts)
    }

    /// Exact-input swap for tokens that charge a fee on transfer. The minimum
    /// is checked against what `to` actually received.
    pub fn swap_exact_tokens_for_tokens_supporting_fee_on_transfer_tokens(
        &self,
        sender: Address,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<()> {
        self.exchange.transact_before(deadline, |state, now| {
            library::validate_path(state.factory(), path)?;
            self.pull_into_first_pair(state, sender, path, amount_in)?;
            self.swap_hops_measured(state, now, path, to, amount_out_min)
        })
    }

    /// Fee-on-transfer variant of [`Self::swap_exact_eth_for_tokens`].
    pub fn swap_exact_eth_for_tokens_supporting_fee_on_transfer_tokens(
        &self,
        sender: Address,
        value: Amount,
        amount_out_min: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<()> {
        self.exchange.transact_before(deadline, |state, now| {
            self.ensure_path_starts_with_weth(path)?;
            library::validate_path(state.factory(), path)?;
            state
                .ledger_mut()
                .transfer_native(sender, self.address, value)?;
            let pair = library::pair_for(state.factory().address(), path[0], path[1])?;
            self.wrap_into(state, pair, value)?;
            self.swap_hops_measured(state, now, path, to, amount_out_min)
        })
    }

    /// Fee-on-transfer variant of [`Self::swap_exact_tokens_for_eth`].
    pub fn swap_exact_tokens_for_eth_supporting_fee_on_transfer_tokens(
        &self,
        sender: Address,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[TokenId],
        to: Address,
        deadline: U256,
    ) -> Result<()> {
        self.exchange.transact_before(deadline, |state, now| {
            self.ensure_path_ends_with_weth(path)?;
            library::validate_path(state.factory(), path)?;
            self.pull_into_first_pair(state, sender, path, amount_in)?;
            self.swap_hops_measured_unchecked(state, now, path, self.address)?;
            let amount_out = state.ledger().balance_of(self.weth, self.address);
            if amount_out < amount_out_min {
                return Err(ExchangeError::InsufficientOutputAmount);
            }
            self.unwrap_to(state, amount_out, to)
        })
    }

    // ---------------------------------------------------------------------
    // Library passthroughs
    // ---------------------------------------------------------------------

    pub fn quote(&self, amount_a: Amount, reserve_a: Amount, reserve_b: Amount) -> Result<Amount> {
        library::quote(amount_a, reserve_a, reserve_b)
    }

    /// Output for an exact input at the configured fee.
    pub fn get_amount_out(
        &self,
        amount_in: Amount,
        reserve_in: Amount,
        reserve_out: Amount,
    ) -> Result<Amount> {
        let fee_bps = self.exchange.config().fee_bps;
        library::get_amount_out(amount_in, reserve_in, reserve_out, fee_bps)
    }

    /// Input for an exact output at the configured fee.
    pub fn get_amount_in(
        &self,
        amount_out: Amount,
        reserve_in: Amount,
        reserve_out: Amount,
    ) -> Result<Amount> {
        let fee_bps = self.exchange.config().fee_bps;
        library::get_amount_in(amount_out, reserve_in, reserve_out, fee_bps)
    }

    pub fn get_amounts_out(&self, amount_in: Amount, path: &[TokenId]) -> Result<Vec<Amount>> {
        self.exchange
            .read(|state| library::get_amounts_out(state.factory(), amount_in, path))
    }

    pub fn get_amounts_in(&self, amount_out: Amount, path: &[TokenId]) -> Result<Vec<Amount>> {
        self.exchange
            .read(|state| library::get_amounts_in(state.factory(), amount_out, path))
    }

    /// Reserves of the `token_a`/`token_b` pair oriented as `(reserve_a, reserve_b)`.
    pub fn get_reserves(&self, token_a: TokenId, token_b: TokenId) -> Result<(Amount, Amount)> {
        self.exchange
            .read(|state| library::get_reserves(state.factory(), token_a, token_b))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Pick the deposit that matches the pair's current ratio without
    /// exceeding either desired amount.
    fn optimal_deposit(
        state: &mut ExchangeState<L>,
        token_a: TokenId,
        token_b: TokenId,
        amount_a_desired: Amount,
        amount_b_desired: Amount,
        amount_a_min: Amount,
        amount_b_min: Amount,
    ) -> Result<(Amount, Amount)> {
        if state.factory().get_pair(token_a, token_b).is_none() {
            state.factory_mut().create_pair(token_a, token_b)?;
        }
        let (reserve_a, reserve_b) = library::get_reserves(state.factory(), token_a, token_b)?;
        if reserve_a.is_zero() && reserve_b.is_zero() {
            return Ok((amount_a_desired, amount_b_desired));
        }

        let amount_b_optimal = library::quote(amount_a_desired, reserve_a, reserve_b)?;
        if amount_b_optimal <= amount_b_desired {
            if amount_b_optimal < amount_b_min {
                return Err(ExchangeError::InsufficientBAmount);
            }
            return Ok((amount_a_desired, amount_b_optimal));
        }

        let amount_a_optimal = library::quote(amount_b_desired, reserve_b, reserve_a)?;
        if amount_a_optimal > amount_a_desired || amount_a_optimal < amount_a_min {
            return Err(ExchangeError::InsufficientAAmount);
        }
        Ok((amount_a_optimal, amount_b_desired))
    }

    /// Consume a permit for the router to move `sender`'s shares of the pair.
    #[allow(clippy::too_many_arguments)]
    fn permit(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        sender: Address,
        token_a: TokenId,
        token_b: TokenId,
        liquidity: Amount,
        deadline: U256,
        approve_max: bool,
        signature: &Signature,
    ) -> Result<()> {
        let pair = library::pair_for(state.factory().address(), token_a, token_b)?;
        let value = if approve_max { U256::MAX } else { liquidity };
        state
            .pair_mut(pair)?
            .lp_mut()
            .permit(sender, self.address, value, deadline, signature, now)
    }

    #[allow(clippy::too_many_arguments)]
    fn withdraw(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        sender: Address,
        token_a: TokenId,
        token_b: TokenId,
        liquidity: Amount,
        amount_a_min: Amount,
        amount_b_min: Amount,
        to: Address,
    ) -> Result<(Amount, Amount)> {
        let pair = library::pair_for(state.factory().address(), token_a, token_b)?;
        state
            .pair_mut(pair)?
            .lp_mut()
            .transfer_from(self.address, sender, pair, liquidity)?;
        let (amount0, amount1) = state.burn(pair, to, now)?;

        let (token0, _) = library::sort_tokens(token_a, token_b)?;
        let (amount_a, amount_b) = if token_a == token0 {
            (amount0, amount1)
        } else {
            (amount1, amount0)
        };
        if amount_a < amount_a_min {
            return Err(ExchangeError::InsufficientAAmount);
        }
        if amount_b < amount_b_min {
            return Err(ExchangeError::InsufficientBAmount);
        }
        Ok((amount_a, amount_b))
    }

    #[allow(clippy::too_many_arguments)]
    fn withdraw_eth(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        sender: Address,
        token: TokenId,
        liquidity: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
    ) -> Result<(Amount, Amount)> {
        let (amount_token, amount_eth) = self.withdraw(
            state,
            now,
            sender,
            token,
            self.weth,
            liquidity,
            amount_token_min,
            amount_eth_min,
            self.address,
        )?;
        state
            .ledger_mut()
            .transfer(token, self.address, to, amount_token)?;
        self.unwrap_to(state, amount_eth, to)?;
        Ok((amount_token, amount_eth))
    }

    #[allow(clippy::too_many_arguments)]
    fn withdraw_eth_fee_on_transfer(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        sender: Address,
        token: TokenId,
        liquidity: Amount,
        amount_token_min: Amount,
        amount_eth_min: Amount,
        to: Address,
    ) -> Result<Amount> {
        let (_, amount_eth) = self.withdraw(
            state,
            now,
            sender,
            token,
            self.weth,
            liquidity,
            amount_token_min,
            amount_eth_min,
            self.address,
        )?;
        let received = state.ledger().balance_of(token, self.address);
        state.ledger_mut().transfer(token, self.address, to, received)?;
        self.unwrap_to(state, amount_eth, to)?;
        info!(%sender, %token, %liquidity, %amount_eth, "Fee-on-transfer ETH liquidity removed");
        Ok(amount_eth)
    }

    /// Move `amount` of `path[0]` from `sender` into the first pair of the path.
    fn pull_into_first_pair(
        &self,
        state: &mut ExchangeState<L>,
        sender: Address,
        path: &[TokenId],
        amount: Amount,
    ) -> Result<()> {
        let pair = library::pair_for(state.factory().address(), path[0], path[1])?;
        state
            .ledger_mut()
            .transfer_from(path[0], self.address, sender, pair, amount)
    }

    /// Wrap native value held by the router and send it to `pair`.
    fn wrap_into(&self, state: &mut ExchangeState<L>, pair: Address, amount: Amount) -> Result<()> {
        state.ledger_mut().deposit(self.address, amount)?;
        state
            .ledger_mut()
            .transfer(self.weth, self.address, pair, amount)
    }

    /// Unwrap WETH held by the router and send the native value to `to`.
    fn unwrap_to(&self, state: &mut ExchangeState<L>, amount: Amount, to: Address) -> Result<()> {
        state.ledger_mut().withdraw(self.address, amount)?;
        state
            .ledger_mut()
            .transfer_native(self.address, to, amount)
    }

    /// Where hop `i`'s output goes: the next pair, or `to` after the last hop.
    fn hop_recipient(
        &self,
        state: &ExchangeState<L>,
        path: &[TokenId],
        i: usize,
        to: Address,
    ) -> Result<Address> {
        if i < path.len() - 2 {
            library::pair_for(state.factory().address(), path[i + 1], path[i + 2])
        } else {
            Ok(to)
        }
    }

    /// Execute precomputed `amounts` along `path`; the first pair is already funded.
    fn swap_hops(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        amounts: &[Amount],
        path: &[TokenId],
        to: Address,
    ) -> Result<()> {
        for i in 0..path.len() - 1 {
            let (input, output) = (path[i], path[i + 1]);
            let (token0, _) = library::sort_tokens(input, output)?;
            let amount_out = amounts[i + 1];
            let (amount0_out, amount1_out) = if input == token0 {
                (U256::ZERO, amount_out)
            } else {
                (amount_out, U256::ZERO)
            };
            let recipient = self.hop_recipient(state, path, i, to)?;
            let pair = library::pair_for(state.factory().address(), input, output)?;
            state.swap(pair, amount0_out, amount1_out, recipient, None, now)?;
            debug!(hop = i, %input, %output, %amount_out, "hop executed");
        }
        Ok(())
    }

    /// Execute `path` measuring each hop's real input, then check what `to` received.
    fn swap_hops_measured(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        path: &[TokenId],
        to: Address,
        amount_out_min: Amount,
    ) -> Result<()> {
        let last = path[path.len() - 1];
        let before = state.ledger().balance_of(last, to);
        self.swap_hops_measured_unchecked(state, now, path, to)?;
        let received = math::sub(state.ledger().balance_of(last, to), before)?;
        if received < amount_out_min {
            return Err(ExchangeError::InsufficientOutputAmount);
        }
        info!(input = %path[0], output = %last, %received, "Fee-on-transfer swap executed");
        Ok(())
    }

    fn swap_hops_measured_unchecked(
        &self,
        state: &mut ExchangeState<L>,
        now: u64,
        path: &[TokenId],
        to: Address,
    ) -> Result<()> {
        for i in 0..path.len() - 1 {
            let (input, output) = (path[i], path[i + 1]);
            let (token0, _) = library::sort_tokens(input, output)?;
            let pair_address = library::pair_for(state.factory().address(), input, output)?;
            let (amount_input, amount_output, fee_bps) = {
                let pair = state.pair(pair_address)?;
                let reserves = pair.get_reserves();
                let (reserve_input, reserve_output) = if input == token0 {
                    (reserves.reserve0, reserves.reserve1)
                } else {
                    (reserves.reserve1, reserves.reserve0)
                };
                let amount_input = math::sub(
                    state.ledger().balance_of(input, pair_address),
                    reserve_input,
                )?;
                let amount_output = library::get_amount_out(
                    amount_input,
                    reserve_input,
                    reserve_output,
                    pair.fee_bps(),
                )?;
                (amount_input, amount_output, pair.fee_bps())
            };
            let (amount0_out, amount1_out) = if input == token0 {
                (U256::ZERO, amount_output)
            } else {
                (amount_output, U256::ZERO)
            };
            let recipient = self.hop_recipient(state, path, i, to)?;
            state.swap(pair_address, amount0_out, amount1_out, recipient, None, now)?;
            debug!(hop = i, %input, %output, %amount_input, %amount_output, fee_bps, "measured hop executed");
        }
        Ok(())
    }

    fn ensure_path_starts_with_weth(&self, path: &[TokenId]) -> Result<()> {
        match path.first() {
            Some(&first) if first == self.weth => Ok(()),
            _ => Err(ExchangeError::InvalidPath),
        }
    }

    fn ensure_path_ends_with_weth(&self, path: &[TokenId]) -> Result<()> {
        match path.last() {
            Some(&last) if last == self.weth => Ok(()),
            _ => Err(ExchangeError::InvalidPath),
        }
    }

    fn log_removal(
        &self,
        sender: Address,
        token_a: TokenId,
        token_b: TokenId,
        liquidity: Amount,
        (amount_a, amount_b): (Amount, Amount),
    ) {
        info!(%sender, %token_a, %token_b, %liquidity, %amount_a, %amount_b, "Liquidity removed");
    }

    fn log_swap(&self, sender: Address, path: &[TokenId], amounts: &[Amount]) {
        info!(
            %sender,
            hops = path.len() - 1,
            amount_in = %amounts[0],
            amount_out = %amounts[amounts.len() - 1],
            "Swap executed"
        );
    }
}
