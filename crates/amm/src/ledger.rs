//! External token ledger interfaces and an in-memory implementation.
//!
//! The exchange never owns token balances itself. Pairs and the router move
//! tokens through [`TokenLedger`] and wrap or unwrap the native asset through
//! [`NativeWrapper`].

use crate::config::FEE_DENOMINATOR;
use crate::error::{ExchangeError, Result};
use crate::math;
use crate::types::{Address, Amount, TokenId, U256};
use std::collections::HashMap;

/// Fungible-token ledger for any number of tokens.
pub trait TokenLedger {
    /// Balance of `owner` in `token`.
    fn balance_of(&self, token: TokenId, owner: Address) -> Amount;

    /// Remaining amount `spender` may move out of `owner`'s balance.
    fn allowance(&self, token: TokenId, owner: Address, spender: Address) -> Amount;

    /// Move `amount` from `from` to `to`, authorised by `from` itself.
    fn transfer(&mut self, token: TokenId, from: Address, to: Address, amount: Amount)
        -> Result<()>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: TokenId,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()>;

    /// Set `spender`'s allowance over `owner`'s balance.
    fn approve(
        &mut self,
        token: TokenId,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<()>;
}

/// Borrow any ledger, sized or already a trait object, as `&mut dyn TokenLedger`.
pub trait AsDynLedger<'a>: TokenLedger + 'a {
    fn as_dyn_ledger(&mut self) -> &mut (dyn TokenLedger + 'a);
}

impl<'a, T: TokenLedger + 'a> AsDynLedger<'a> for T {
    fn as_dyn_ledger(&mut self) -> &mut (dyn TokenLedger + 'a) {
        self
    }
}

impl<'a> AsDynLedger<'a> for dyn TokenLedger + 'a {
    fn as_dyn_ledger(&mut self) -> &mut (dyn TokenLedger + 'a) {
        self
    }
}

/// Native asset and its wrapped ERC-20 representation.
pub trait NativeWrapper {
    /// Token id of the wrapped native asset.
    fn wrapped(&self) -> TokenId;

    /// Native (unwrapped) balance of `owner`.
    fn native_balance(&self, owner: Address) -> Amount;

    /// Send native value.
    fn transfer_native(&mut self, from: Address, to: Address, amount: Amount) -> Result<()>;

    /// Wrap `amount` of `owner`'s native balance.
    fn deposit(&mut self, owner: Address, amount: Amount) -> Result<()>;

    /// Unwrap `amount` of `owner`'s wrapped balance.
    fn withdraw(&mut self, owner: Address, amount: Amount) -> Result<()>;
}

/// Ledger state that can be rolled back to the start of an exchange operation.
pub trait Checkpoint {
    /// Start recording changes.
    fn checkpoint(&mut self);

    /// Keep every change made since [`Checkpoint::checkpoint`].
    fn commit(&mut self);

    /// Undo every change made since [`Checkpoint::checkpoint`].
    fn rollback(&mut self);
}

/// One overwritten entry, with the value it held before.
#[derive(Debug, Clone)]
enum Undo {
    Balance(TokenId, Address, Amount),
    Allowance(TokenId, Address, Address, Amount),
    Native(Address, Amount),
    Supply(TokenId, Amount),
    TransferFee(TokenId, Option<u32>),
}

/// In-memory ledger holding every token, native balances and the wrapper.
///
/// Tokens may be configured to charge a fee on transfer; the fee is burned.
/// Between a checkpoint and its commit every write is journaled, so a
/// rollback costs only as much as the operation touched.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    weth: TokenId,
    balances: HashMap<(TokenId, Address), Amount>,
    allowances: HashMap<(TokenId, Address, Address), Amount>,
    native: HashMap<Address, Amount>,
    supplies: HashMap<TokenId, Amount>,
    transfer_fees: HashMap<TokenId, u32>,
    journal: Option<Vec<Undo>>,
}

impl MemoryLedger {
    /// Create a ledger whose wrapped native asset lives at `weth`.
    pub fn new(weth: TokenId) -> Self {
        Self {
            weth,
            ..Default::default()
        }
    }

    /// Create `amount` of `token` out of thin air for `to`.
    pub fn mint(&mut self, token: TokenId, to: Address, amount: Amount) -> Result<()> {
        let supply = math::add(self.total_supply(token), amount)?;
        self.set_supply(token, supply);
        self.credit(token, to, amount)
    }

    /// Credit native balance to `owner`.
    pub fn fund_native(&mut self, owner: Address, amount: Amount) -> Result<()> {
        let balance = math::add(self.native_balance(owner), amount)?;
        self.set_native(owner, balance);
        Ok(())
    }

    /// Total supply of `token`.
    pub fn total_supply(&self, token: TokenId) -> Amount {
        self.supplies.get(&token).copied().unwrap_or_default()
    }

    /// Charge `fee_bps` on every transfer of `token`.
    pub fn set_transfer_fee_bps(&mut self, token: TokenId, fee_bps: u32) {
        let previous = if fee_bps == 0 {
            self.transfer_fees.remove(&token)
        } else {
            self.transfer_fees.insert(token, fee_bps.min(FEE_DENOMINATOR))
        };
        self.record(Undo::TransferFee(token, previous));
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn set_balance(&mut self, token: TokenId, owner: Address, value: Amount) {
        let previous = self.balances.insert((token, owner), value).unwrap_or_default();
        self.record(Undo::Balance(token, owner, previous));
    }

    fn set_allowance(&mut self, token: TokenId, owner: Address, spender: Address, value: Amount) {
        let previous = self
            .allowances
            .insert((token, owner, spender), value)
            .unwrap_or_default();
        self.record(Undo::Allowance(token, owner, spender, previous));
    }

    fn set_native(&mut self, owner: Address, value: Amount) {
        let previous = self.native.insert(owner, value).unwrap_or_default();
        self.record(Undo::Native(owner, previous));
    }

    fn set_supply(&mut self, token: TokenId, value: Amount) {
        let previous = self.supplies.insert(token, value).unwrap_or_default();
        self.record(Undo::Supply(token, previous));
    }

    fn credit(&mut self, token: TokenId, owner: Address, amount: Amount) -> Result<()> {
        let balance = math::add(self.balance_of(token, owner), amount)?;
        self.set_balance(token, owner, balance);
        Ok(())
    }

    fn debit(&mut self, token: TokenId, owner: Address, amount: Amount) -> Result<()> {
        let balance = self
            .balance_of(token, owner)
            .checked_sub(amount)
            .ok_or(ExchangeError::InsufficientBalance { token, owner })?;
        self.set_balance(token, owner, balance);
        Ok(())
    }

    fn move_tokens(
        &mut self,
        token: TokenId,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        self.debit(token, from, amount)?;
        let fee = match self.transfer_fees.get(&token) {
            Some(&bps) => math::mul_div(amount, U256::from(bps), U256::from(FEE_DENOMINATOR))?,
            None => U256::ZERO,
        };
        if !fee.is_zero() {
            let supply = self.total_supply(token).saturating_sub(fee);
            self.set_supply(token, supply);
        }
        self.credit(token, to, amount - fee)
    }
}

impl Checkpoint for MemoryLedger {
    fn checkpoint(&mut self) {
        self.journal = Some(Vec::new());
    }

    fn commit(&mut self) {
        self.journal = None;
    }

    fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Balance(token, owner, value) => {
                    self.balances.insert((token, owner), value);
                }
                Undo::Allowance(token, owner, spender, value) => {
                    self.allowances.insert((token, owner, spender), value);
                }
                Undo::Native(owner, value) => {
                    self.native.insert(owner, value);
                }
                Undo::Supply(token, value) => {
                    self.supplies.insert(token, value);
                }
                Undo::TransferFee(token, Some(fee_bps)) => {
                    self.transfer_fees.insert(token, fee_bps);
                }
                Undo::TransferFee(token, None) => {
                    self.transfer_fees.remove(&token);
                }
            }
        }
    }
}

impl TokenLedger for MemoryLedger {
    fn balance_of(&self, token: TokenId, owner: Address) -> Amount {
        self.balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    fn allowance(&self, token: TokenId, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        token: TokenId,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        self.move_tokens(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: TokenId,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        let allowed = self.allowance(token, from, spender);
        if allowed != U256::MAX {
            let remaining = allowed
                .checked_sub(amount)
                .ok_or(ExchangeError::InsufficientAllowance {
                    token,
                    owner: from,
                    spender,
                })?;
            self.set_allowance(token, from, spender, remaining);
        }
        self.move_tokens(token, from, to, amount)
    }

    fn approve(
        &mut self,
        token: TokenId,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<()> {
        self.set_allowance(token, owner, spender, amount);
        Ok(())
    }
}

impl NativeWrapper for MemoryLedger {
    fn wrapped(&self) -> TokenId {
        self.weth
    }

    fn native_balance(&self, owner: Address) -> Amount {
        self.native.get(&owner).copied().unwrap_or_default()
    }

    fn transfer_native(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        let balance = self
            .native_balance(from)
            .checked_sub(amount)
            .ok_or(ExchangeError::TransferFailed(format!(
                "native balance of {from} too low"
            )))?;
        self.set_native(from, balance);
        self.fund_native(to, amount)
    }

    fn deposit(&mut self, owner: Address, amount: Amount) -> Result<()> {
        // the wrapper contract custodies the native value
        self.transfer_native(owner, self.weth, amount)?;
        self.mint(self.weth, owner, amount)
    }

    fn withdraw(&mut self, owner: Address, amount: Amount) -> Result<()> {
        self.debit(self.weth, owner, amount)?;
        let supply = math::sub(self.total_supply(self.weth), amount)?;
        self.set_supply(self.weth, supply);
        self.transfer_native(self.weth, owner, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> TokenId {
        Address::repeat_byte(0x01)
    }

    fn weth() -> TokenId {
        Address::repeat_byte(0xEE)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xAA)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xBB)
    }

    #[test]
    fn test_transfer() {
        let mut ledger = MemoryLedger::new(weth());
        ledger.mint(token(), alice(), U256::from(100)).unwrap();

        ledger.transfer(token(), alice(), bob(), U256::from(40)).unwrap();
        assert_eq!(ledger.balance_of(token(), alice()), U256::from(60));
        assert_eq!(ledger.balance_of(token(), bob()), U256::from(40));

        assert_eq!(
            ledger.transfer(token(), alice(), bob(), U256::from(61)),
            Err(ExchangeError::InsufficientBalance {
                token: token(),
                owner: alice()
            })
        );
    }

    #[test]
    fn test_transfer_from_allowance() {
        let mut ledger = MemoryLedger::new(weth());
        ledger.mint(token(), alice(), U256::from(100)).unwrap();
        ledger
            .approve(token(), alice(), bob(), U256::from(50))
            .unwrap();

        ledger
            .transfer_from(token(), bob(), alice(), bob(), U256::from(30))
            .unwrap();
        assert_eq!(ledger.allowance(token(), alice(), bob()), U256::from(20));

        assert!(matches!(
            ledger.transfer_from(token(), bob(), alice(), bob(), U256::from(21)),
            Err(ExchangeError::InsufficientAllowance { .. })
        ));

        // Infinite approval is never decremented
        ledger
            .approve(token(), alice(), bob(), U256::MAX)
            .unwrap();
        ledger
            .transfer_from(token(), bob(), alice(), bob(), U256::from(70))
            .unwrap();
        assert_eq!(ledger.allowance(token(), alice(), bob()), U256::MAX);
    }

    #[test]
    fn test_fee_on_transfer() {
        let mut ledger = MemoryLedger::new(weth());
        ledger.mint(token(), alice(), U256::from(10_000)).unwrap();
        ledger.set_transfer_fee_bps(token(), 100); // 1%

        ledger
            .transfer(token(), alice(), bob(), U256::from(1_000))
            .unwrap();
        assert_eq!(ledger.balance_of(token(), bob()), U256::from(990));
        assert_eq!(ledger.total_supply(token()), U256::from(9_990));
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let mut ledger = MemoryLedger::new(weth());
        ledger.fund_native(alice(), U256::from(10)).unwrap();

        ledger.deposit(alice(), U256::from(6)).unwrap();
        assert_eq!(ledger.native_balance(alice()), U256::from(4));
        assert_eq!(ledger.balance_of(weth(), alice()), U256::from(6));
        assert_eq!(ledger.total_supply(weth()), U256::from(6));

        ledger.withdraw(alice(), U256::from(2)).unwrap();
        assert_eq!(ledger.native_balance(alice()), U256::from(6));
        assert_eq!(ledger.balance_of(weth(), alice()), U256::from(4));

        assert!(ledger.deposit(alice(), U256::from(7)).is_err());
    }

    #[test]
    fn test_rollback_restores_every_write() {
        let mut ledger = MemoryLedger::new(weth());
        ledger.mint(token(), alice(), U256::from(1_000)).unwrap();
        ledger.fund_native(alice(), U256::from(10)).unwrap();

        ledger.checkpoint();
        ledger
            .transfer(token(), alice(), bob(), U256::from(400))
            .unwrap();
        ledger
            .transfer(token(), bob(), alice(), U256::from(100))
            .unwrap();
        ledger
            .approve(token(), alice(), bob(), U256::from(5))
            .unwrap();
        ledger.deposit(alice(), U256::from(3)).unwrap();
        ledger.set_transfer_fee_bps(token(), 100);
        ledger.rollback();

        assert_eq!(ledger.balance_of(token(), alice()), U256::from(1_000));
        assert_eq!(ledger.balance_of(token(), bob()), U256::ZERO);
        assert_eq!(ledger.allowance(token(), alice(), bob()), U256::ZERO);
        assert_eq!(ledger.native_balance(alice()), U256::from(10));
        assert_eq!(ledger.balance_of(weth(), alice()), U256::ZERO);
        assert_eq!(ledger.total_supply(weth()), U256::ZERO);

        // the transfer fee was undone as well
        ledger
            .transfer(token(), alice(), bob(), U256::from(100))
            .unwrap();
        assert_eq!(ledger.balance_of(token(), bob()), U256::from(100));
    }

    #[test]
    fn test_commit_keeps_writes() {
        let mut ledger = MemoryLedger::new(weth());
        ledger.mint(token(), alice(), U256::from(1_000)).unwrap();

        ledger.checkpoint();
        ledger
            .transfer(token(), alice(), bob(), U256::from(400))
            .unwrap();
        ledger.commit();
        ledger.rollback();

        assert_eq!(ledger.balance_of(token(), bob()), U256::from(400));
    }
}
