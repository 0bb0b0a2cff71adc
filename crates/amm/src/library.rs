//! Pure helpers: token ordering, deterministic pair addresses and
//! constant-product amount math.

use crate::config::{fee_complement, FEE_DENOMINATOR};
use crate::error::{ExchangeError, Result};
use crate::factory::Factory;
use crate::math;
use crate::types::{Address, Amount, TokenId, B256, U256};
use alloy::primitives::{b256, keccak256};

/// Hash standing in for the pair creation code in CREATE2 address derivation.
pub const PAIR_INIT_CODE_HASH: B256 =
    b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");

/// Order two tokens by address, rejecting identical or zero tokens.
pub fn sort_tokens(token_a: TokenId, token_b: TokenId) -> Result<(TokenId, TokenId)> {
    if token_a == token_b {
        return Err(ExchangeError::IdenticalAddresses);
    }
    let (token0, token1) = if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    };
    if token0.is_zero() {
        return Err(ExchangeError::ZeroAddress);
    }
    Ok((token0, token1))
}

/// CREATE2 salt of a pair: `keccak256(token0 ++ token1)`.
pub fn pair_salt(token0: TokenId, token1: TokenId) -> B256 {
    let mut data = [0u8; 40];
    data[..20].copy_from_slice(token0.as_slice());
    data[20..].copy_from_slice(token1.as_slice());
    keccak256(data)
}

/// Deterministic address of the pair for two tokens, in either order.
pub fn pair_for(factory: Address, token_a: TokenId, token_b: TokenId) -> Result<Address> {
    let (token0, token1) = sort_tokens(token_a, token_b)?;
    Ok(factory.create2(pair_salt(token0, token1), PAIR_INIT_CODE_HASH))
}

/// Reserves of the `token_a`/`token_b` pair, oriented as `(reserve_a, reserve_b)`.
pub fn get_reserves(
    factory: &Factory,
    token_a: TokenId,
    token_b: TokenId,
) -> Result<(Amount, Amount)> {
    let (token0, _) = sort_tokens(token_a, token_b)?;
    let pair = factory.pair(pair_for(factory.address(), token_a, token_b)?)?;
    let reserves = pair.get_reserves();
    if token_a == token0 {
        Ok((reserves.reserve0, reserves.reserve1))
    } else {
        Ok((reserves.reserve1, reserves.reserve0))
    }
}

/// Equivalent amount of the other asset at the current reserve ratio.
pub fn quote(amount_a: Amount, reserve_a: Amount, reserve_b: Amount) -> Result<Amount> {
    if amount_a.is_zero() {
        return Err(ExchangeError::InsufficientAmount);
    }
    if reserve_a.is_zero() || reserve_b.is_zero() {
        return Err(ExchangeError::InsufficientLiquidity);
    }
    math::mul_div(amount_a, reserve_b, reserve_a)
}

/// Maximum output for an exact input, after the swap fee.
pub fn get_amount_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Amount> {
    if amount_in.is_zero() {
        return Err(ExchangeError::InsufficientInputAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(ExchangeError::InsufficientLiquidity);
    }
    let amount_in_with_fee = math::mul(amount_in, fee_complement(fee_bps))?;
    let numerator = math::mul(amount_in_with_fee, reserve_out)?;
    let denominator = math::add(
        math::mul(reserve_in, U256::from(FEE_DENOMINATOR))?,
        amount_in_with_fee,
    )?;
    math::div(numerator, denominator)
}

/// Minimum input for an exact output, after the swap fee (rounded up).
pub fn get_amount_in(
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Amount> {
    if amount_out.is_zero() {
        return Err(ExchangeError::InsufficientOutputAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() || amount_out >= reserve_out {
        return Err(ExchangeError::InsufficientLiquidity);
    }
    let numerator = math::mul(
        math::mul(reserve_in, amount_out)?,
        U256::from(FEE_DENOMINATOR),
    )?;
    let denominator = math::mul(reserve_out - amount_out, fee_complement(fee_bps))?;
    math::add(math::div(numerator, denominator)?, U256::from(1))
}

/// Chained [`get_amount_out`] along `path`; `amounts[0] == amount_in`.
pub fn get_amounts_out(factory: &Factory, amount_in: Amount, path: &[TokenId]) -> Result<Vec<Amount>> {
    validate_path(factory, path)?;
    let mut amounts = Vec::with_capacity(path.len());
    amounts.push(amount_in);
    for window in path.windows(2) {
        let (reserve_in, reserve_out) = get_reserves(factory, window[0], window[1])?;
        let fee_bps = hop_fee(factory, window[0], window[1])?;
        let last = amounts[amounts.len() - 1];
        amounts.push(get_amount_out(last, reserve_in, reserve_out, fee_bps)?);
    }
    Ok(amounts)
}

/// Chained [`get_amount_in`] backwards along `path`; the last amount is `amount_out`.
pub fn get_amounts_in(factory: &Factory, amount_out: Amount, path: &[TokenId]) -> Result<Vec<Amount>> {
    validate_path(factory, path)?;
    let mut amounts = vec![U256::ZERO; path.len()];
    amounts[path.len() - 1] = amount_out;
    for i in (1..path.len()).rev() {
        let (reserve_in, reserve_out) = get_reserves(factory, path[i - 1], path[i])?;
        let fee_bps = hop_fee(factory, path[i - 1], path[i])?;
        amounts[i - 1] = get_amount_in(amounts[i], reserve_in, reserve_out, fee_bps)?;
    }
    Ok(amounts)
}

/// A path needs at least two tokens and at most the configured maximum.
pub fn validate_path(factory: &Factory, path: &[TokenId]) -> Result<()> {
    if path.len() < 2 || path.len() > factory.config().max_path_len {
        return Err(ExchangeError::InvalidPath);
    }
    Ok(())
}

fn hop_fee(factory: &Factory, token_a: TokenId, token_b: TokenId) -> Result<u32> {
    Ok(factory
        .pair(pair_for(factory.address(), token_a, token_b)?)?
        .fee_bps())
}
