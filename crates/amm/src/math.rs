//! Overflow-checked arithmetic and fixed-point helpers.
//!
//! Every reserve and supply mutation goes through these functions, so this is
//! the only place the overflow policy lives.

use crate::error::{ExchangeError, Result};
use crate::types::U256;

/// 2^112, the UQ112x112 resolution.
pub const Q112: U256 = U256::from_limbs([0, 1 << 48, 0, 0]);

/// Largest value a reserve may hold (2^112 - 1).
pub const MAX_RESERVE: U256 = U256::from_limbs([u64::MAX, (1 << 48) - 1, 0, 0]);

pub fn add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(ExchangeError::ArithmeticOverflow)
}

pub fn sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or(ExchangeError::ArithmeticUnderflow)
}

pub fn mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or(ExchangeError::ArithmeticOverflow)
}

/// Floor division.
pub fn div(a: U256, b: U256) -> Result<U256> {
    a.checked_div(b).ok_or(ExchangeError::DivisionByZero)
}

/// `a * b / c`, floored.
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256> {
    div(mul(a, b)?, c)
}

pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

/// Integer square root (floor), babylonian method.
pub fn sqrt(y: U256) -> U256 {
    if y > U256::from(3) {
        let mut z = y;
        let mut x = y / U256::from(2) + U256::from(1);
        while x < z {
            z = x;
            x = (y / x + x) / U256::from(2);
        }
        z
    } else if !y.is_zero() {
        U256::from(1)
    } else {
        U256::ZERO
    }
}

/// Ensure a value fits a 112-bit reserve slot.
pub fn to_reserve(value: U256) -> Result<U256> {
    if value > MAX_RESERVE {
        return Err(ExchangeError::ArithmeticOverflow);
    }
    Ok(value)
}

/// Encode a reserve as UQ112x112. Never overflows for values within [`MAX_RESERVE`].
pub fn encode(y: U256) -> U256 {
    y << 112
}

/// Divide a UQ112x112 by a plain reserve, returning UQ112x112.
pub fn uqdiv(x: U256, y: U256) -> Result<U256> {
    div(x, y)
}
