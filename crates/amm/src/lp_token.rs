//! Liquidity-share token issued by every pair.

use crate::error::{ExchangeError, Result};
use crate::math;
use crate::permit::PermitAuthorizer;
use crate::types::{Address, Amount, Signature, B256, U256};
use std::collections::HashMap;

/// Fungible claim on a pair's reserves, with permit support.
#[derive(Debug, Clone)]
pub struct LiquidityToken {
    /// Address of the issuing pair.
    address: Address,
    name: String,
    symbol: String,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    permits: PermitAuthorizer,
}

impl LiquidityToken {
    pub const DECIMALS: u8 = 18;

    pub fn new(address: Address, name: &str, symbol: &str, chain_id: u64) -> Self {
        Self {
            address,
            name: name.to_owned(),
            symbol: symbol.to_owned(),
            total_supply: U256::ZERO,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            permits: PermitAuthorizer::new(name, chain_id, address),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, owner: Address) -> Amount {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn nonces(&self, owner: Address) -> U256 {
        self.permits.nonces(owner)
    }

    pub fn domain_separator(&self) -> B256 {
        self.permits.domain_separator()
    }

    pub fn permits(&self) -> &PermitAuthorizer {
        &self.permits
    }

    pub(crate) fn mint(&mut self, to: Address, value: Amount) -> Result<()> {
        self.total_supply = math::add(self.total_supply, value)?;
        let balance = self.balances.entry(to).or_default();
        *balance = math::add(*balance, value)?;
        Ok(())
    }

    pub(crate) fn burn(&mut self, from: Address, value: Amount) -> Result<()> {
        self.debit(from, value)?;
        self.total_supply = math::sub(self.total_supply, value)?;
        Ok(())
    }

    pub fn approve(&mut self, owner: Address, spender: Address, value: Amount) {
        self.allowances.insert((owner, spender), value);
    }

    pub fn transfer(&mut self, from: Address, to: Address, value: Amount) -> Result<()> {
        self.debit(from, value)?;
        let balance = self.balances.entry(to).or_default();
        *balance = math::add(*balance, value)?;
        Ok(())
    }

    /// Move shares using `spender`'s allowance. `U256::MAX` is an infinite allowance.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<()> {
        let allowed = self.allowance(from, spender);
        if allowed != U256::MAX {
            let remaining =
                allowed
                    .checked_sub(value)
                    .ok_or(ExchangeError::InsufficientAllowance {
                        token: self.address,
                        owner: from,
                        spender,
                    })?;
            self.allowances.insert((from, spender), remaining);
        }
        self.transfer(from, to, value)
    }

    /// Approve `spender` through an owner-signed permit instead of a call from the owner.
    pub fn permit(
        &mut self,
        owner: Address,
        spender: Address,
        value: Amount,
        deadline: U256,
        signature: &Signature,
        now: u64,
    ) -> Result<()> {
        self.permits
            .verify_and_consume(owner, spender, value, deadline, signature, now)?;
        self.approve(owner, spender, value);
        Ok(())
    }

    fn debit(&mut self, owner: Address, value: Amount) -> Result<()> {
        let token = self.address;
        let balance = self.balances.entry(owner).or_default();
        *balance = balance
            .checked_sub(value)
            .ok_or(ExchangeError::InsufficientBalance { token, owner })?;
        Ok(())
    }
}
