//! Durable exchange state: the registry with its pairs, plus the token ledger.

use crate::config::ExchangeConfig;
use crate::error::Result;
use crate::factory::Factory;
use crate::ledger::{Checkpoint, TokenLedger};
use crate::pair::{Pair, SwapCallee};
use crate::types::{Address, Amount};

/// Everything an exchange operation may read or mutate.
///
/// Pair operations live here rather than on [`Pair`] callers so the pair and
/// the ledger can be borrowed mutably at the same time.
#[derive(Debug, Clone)]
pub struct ExchangeState<L> {
    factory: Factory,
    ledger: L,
}

impl<L: TokenLedger> ExchangeState<L> {
    pub fn new(factory: Factory, ledger: L) -> Self {
        Self { factory, ledger }
    }

    pub fn config(&self) -> &ExchangeConfig {
        self.factory.config()
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut Factory {
        &mut self.factory
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn pair(&self, address: Address) -> Result<&Pair> {
        self.factory.pair(address)
    }

    pub fn pair_mut(&mut self, address: Address) -> Result<&mut Pair> {
        self.factory.pair_mut(address)
    }

    /// Pair `mint`, consulting the factory's fee switch.
    pub fn mint(&mut self, pair: Address, to: Address, now: u64) -> Result<Amount> {
        let policy = self.factory.fee_switch();
        self.factory
            .pair_mut(pair)?
            .mint(&self.ledger, to, &policy, now)
    }

    /// Pair `burn`, consulting the factory's fee switch.
    pub fn burn(&mut self, pair: Address, to: Address, now: u64) -> Result<(Amount, Amount)> {
        let policy = self.factory.fee_switch();
        self.factory
            .pair_mut(pair)?
            .burn(&mut self.ledger, to, &policy, now)
    }

    /// Pair `swap`, with an optional flash callback.
    pub fn swap(
        &mut self,
        pair: Address,
        amount0_out: Amount,
        amount1_out: Amount,
        to: Address,
        callee: Option<&mut dyn SwapCallee>,
        now: u64,
    ) -> Result<()> {
        self.factory
            .pair_mut(pair)?
            .swap(&mut self.ledger, amount0_out, amount1_out, to, callee, now)
    }

    pub fn skim(&mut self, pair: Address, to: Address) -> Result<()> {
        self.factory.pair_mut(pair)?.skim(&mut self.ledger, to)
    }

    pub fn sync(&mut self, pair: Address, now: u64) -> Result<()> {
        self.factory.pair_mut(pair)?.sync(&self.ledger, now)
    }
}

impl<L: Checkpoint> ExchangeState<L> {
    /// Start journaling the registry, the pairs it hands out and the ledger.
    pub fn checkpoint(&mut self) {
        self.factory.checkpoint();
        self.ledger.checkpoint();
    }

    pub fn commit(&mut self) {
        self.factory.commit();
        self.ledger.commit();
    }

    /// Undo everything since [`Self::checkpoint`].
    pub fn rollback(&mut self) {
        self.factory.rollback();
        self.ledger.rollback();
    }
}
