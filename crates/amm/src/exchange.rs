//! Shared, serialized access to the exchange state.
//!
//! Every mutating call runs as one atomic unit: it takes the write lock,
//! journals what it changes and keeps the changes only if the whole
//! operation succeeds. A rejected operation leaves reserves, supplies,
//! nonces and token balances exactly as they were.

use crate::clock::{Clock, SystemClock};
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, Result};
use crate::factory::Factory;
use crate::ledger::{Checkpoint, TokenLedger};
use crate::pair::SwapCallee;
use crate::state::ExchangeState;
use crate::types::{Address, Amount, Reserves, TokenId, B256, U256};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// The exchange engine: registry, pairs and token ledger behind one lock.
#[derive(Debug)]
pub struct Exchange<L> {
    state: RwLock<ExchangeState<L>>,
    clock: Arc<dyn Clock>,
}

impl<L: TokenLedger + Checkpoint> Exchange<L> {
    /// Create an exchange using the wall clock.
    pub fn new(
        factory_address: Address,
        fee_to_setter: Address,
        config: ExchangeConfig,
        ledger: L,
    ) -> Self {
        Self::with_clock(factory_address, fee_to_setter, config, ledger, Arc::new(SystemClock))
    }

    /// Create an exchange with a custom time source.
    pub fn with_clock(
        factory_address: Address,
        fee_to_setter: Address,
        config: ExchangeConfig,
        ledger: L,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let factory = Factory::new(factory_address, fee_to_setter, config);
        Self {
            state: RwLock::new(ExchangeState::new(factory, ledger)),
            clock,
        }
    }

    /// Current time as seen by the exchange.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Run `op` atomically. `op` receives the working state and the current time.
    pub fn transact<R>(
        &self,
        op: impl FnOnce(&mut ExchangeState<L>, u64) -> Result<R>,
    ) -> Result<R> {
        self.run(None, op)
    }

    /// Like [`Self::transact`], rejecting with `Expired` before touching state
    /// when `deadline` has passed.
    pub fn transact_before<R>(
        &self,
        deadline: U256,
        op: impl FnOnce(&mut ExchangeState<L>, u64) -> Result<R>,
    ) -> Result<R> {
        self.run(Some(deadline), op)
    }

    fn run<R>(
        &self,
        deadline: Option<U256>,
        op: impl FnOnce(&mut ExchangeState<L>, u64) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.write();
        // one reading of the clock serves both the deadline and the operation
        let now = self.clock.now();
        if let Some(deadline) = deadline {
            ensure_deadline(deadline, now)?;
        }

        let mut operation = Operation::begin(&mut *state);
        match op(&mut *operation.state, now) {
            Ok(result) => {
                operation.commit();
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "operation rejected, state rolled back");
                Err(err)
            }
        }
    }

    /// Read a consistent snapshot of the state.
    pub fn read<R>(&self, op: impl FnOnce(&ExchangeState<L>) -> R) -> R {
        op(&self.state.read())
    }

    pub fn config(&self) -> ExchangeConfig {
        self.read(|state| state.config().clone())
    }

    pub fn factory_address(&self) -> Address {
        self.read(|state| state.factory().address())
    }

    // ---------------------------------------------------------------------
    // Factory
    // ---------------------------------------------------------------------

    pub fn create_pair(&self, token_a: TokenId, token_b: TokenId) -> Result<Address> {
        self.transact(|state, _| state.factory_mut().create_pair(token_a, token_b))
    }

    pub fn get_pair(&self, token_a: TokenId, token_b: TokenId) -> Option<Address> {
        self.read(|state| state.factory().get_pair(token_a, token_b))
    }

    pub fn all_pairs(&self, index: usize) -> Option<Address> {
        self.read(|state| state.factory().all_pairs(index))
    }

    pub fn all_pairs_length(&self) -> usize {
        self.read(|state| state.factory().all_pairs_length())
    }

    pub fn fee_to(&self) -> Address {
        self.read(|state| state.factory().fee_to())
    }

    pub fn set_fee_to(&self, caller: Address, fee_to: Address) -> Result<()> {
        self.transact(|state, _| state.factory_mut().set_fee_to(caller, fee_to))
    }

    pub fn set_fee_to_setter(&self, caller: Address, fee_to_setter: Address) -> Result<()> {
        self.transact(|state, _| state.factory_mut().set_fee_to_setter(caller, fee_to_setter))
    }

    // ---------------------------------------------------------------------
    // Pair
    // ---------------------------------------------------------------------

    pub fn get_reserves(&self, pair: Address) -> Result<Reserves> {
        self.read(|state| Ok(state.pair(pair)?.get_reserves()))
    }

    pub fn total_supply(&self, pair: Address) -> Result<Amount> {
        self.read(|state| Ok(state.pair(pair)?.lp().total_supply()))
    }

    pub fn lp_balance_of(&self, pair: Address, owner: Address) -> Result<Amount> {
        self.read(|state| Ok(state.pair(pair)?.lp().balance_of(owner)))
    }

    pub fn lp_nonces(&self, pair: Address, owner: Address) -> Result<U256> {
        self.read(|state| Ok(state.pair(pair)?.lp().nonces(owner)))
    }

    pub fn lp_domain_separator(&self, pair: Address) -> Result<B256> {
        self.read(|state| Ok(state.pair(pair)?.lp().domain_separator()))
    }

    /// Digest `owner` must sign to permit `spender` to move `value` shares of `pair`.
    pub fn permit_digest(
        &self,
        pair: Address,
        owner: Address,
        spender: Address,
        value: Amount,
        deadline: U256,
    ) -> Result<B256> {
        self.read(|state| {
            let lp = state.pair(pair)?.lp();
            Ok(lp
                .permits()
                .digest(owner, spender, value, lp.nonces(owner), deadline))
        })
    }

    pub fn lp_approve(&self, pair: Address, owner: Address, spender: Address, value: Amount) -> Result<()> {
        self.transact(|state, _| {
            state.pair_mut(pair)?.lp_mut().approve(owner, spender, value);
            Ok(())
        })
    }

    pub fn lp_transfer(&self, pair: Address, from: Address, to: Address, value: Amount) -> Result<()> {
        self.transact(|state, _| state.pair_mut(pair)?.lp_mut().transfer(from, to, value))
    }

    pub fn mint(&self, pair: Address, to: Address) -> Result<Amount> {
        self.transact(|state, now| state.mint(pair, to, now))
    }

    pub fn burn(&self, pair: Address, to: Address) -> Result<(Amount, Amount)> {
        self.transact(|state, now| state.burn(pair, to, now))
    }

    /// Direct pair swap. With a callee this is a flash swap.
    pub fn swap(
        &self,
        pair: Address,
        amount0_out: Amount,
        amount1_out: Amount,
        to: Address,
        callee: Option<&mut dyn SwapCallee>,
    ) -> Result<()> {
        self.transact(|state, now| state.swap(pair, amount0_out, amount1_out, to, callee, now))
    }

    pub fn skim(&self, pair: Address, to: Address) -> Result<()> {
        self.transact(|state, _| state.skim(pair, to))
    }

    pub fn sync(&self, pair: Address) -> Result<()> {
        self.transact(|state, now| state.sync(pair, now))
    }
}

/// An open operation on the state. Rolls back on drop unless committed.
struct Operation<'a, L: Checkpoint> {
    state: &'a mut ExchangeState<L>,
    committed: bool,
}

impl<'a, L: Checkpoint> Operation<'a, L> {
    fn begin(state: &'a mut ExchangeState<L>) -> Self {
        state.checkpoint();
        Self {
            state,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.state.commit();
        self.committed = true;
    }
}

impl<L: Checkpoint> Drop for Operation<'_, L> {
    fn drop(&mut self) {
        if !self.committed {
            self.state.rollback();
        }
    }
}

/// Reject with `Expired` once `now` is past `deadline`.
pub fn ensure_deadline(deadline: U256, now: u64) -> Result<()> {
    if U256::from(now) > deadline {
        return Err(ExchangeError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::MemoryLedger;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Moves one second forward every time it is read.
    #[derive(Debug)]
    struct TickingClock(AtomicU64);

    impl Clock for TickingClock {
        fn now(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn token_a() -> TokenId {
        Address::repeat_byte(0x01)
    }

    fn token_b() -> TokenId {
        Address::repeat_byte(0x02)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xAA)
    }

    fn setup() -> (Exchange<MemoryLedger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut ledger = MemoryLedger::new(Address::repeat_byte(0xEE));
        ledger.mint(token_a(), alice(), U256::from(1_000_000)).unwrap();
        ledger.mint(token_b(), alice(), U256::from(1_000_000)).unwrap();
        let exchange = Exchange::with_clock(
            Address::repeat_byte(0xFA),
            Address::repeat_byte(0x5E),
            ExchangeConfig::default(),
            ledger,
            clock.clone(),
        );
        (exchange, clock)
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let (exchange, _) = setup();
        let pair = exchange.create_pair(token_a(), token_b()).unwrap();

        // Deposit, then fail the mint: the deposit must be undone too
        let result = exchange.transact(|state, now| {
            state.ledger_mut().transfer(token_a(), alice(), pair, U256::from(1000))?;
            state.ledger_mut().transfer(token_b(), alice(), pair, U256::from(1000))?;
            state.mint(pair, alice(), now)
        });
        assert_eq!(result, Err(ExchangeError::InsufficientInitialLiquidity));
        exchange.read(|state| {
            assert_eq!(state.ledger().balance_of(token_a(), pair), U256::ZERO);
            assert_eq!(
                state.ledger().balance_of(token_a(), alice()),
                U256::from(1_000_000)
            );
        });
    }

    #[test]
    fn test_successful_transaction_commits() {
        let (exchange, clock) = setup();
        let pair = exchange.create_pair(token_a(), token_b()).unwrap();

        let liquidity = exchange
            .transact(|state, now| {
                state.ledger_mut().transfer(token_a(), alice(), pair, U256::from(4000))?;
                state.ledger_mut().transfer(token_b(), alice(), pair, U256::from(4000))?;
                state.mint(pair, alice(), now)
            })
            .unwrap();
        assert_eq!(liquidity, U256::from(3000));
        assert_eq!(exchange.lp_balance_of(pair, alice()).unwrap(), U256::from(3000));
        assert_eq!(exchange.total_supply(pair).unwrap(), U256::from(4000));
        assert_eq!(
            exchange.get_reserves(pair).unwrap().block_timestamp_last,
            clock.now() as u32
        );
    }

    #[test]
    fn test_deadline() {
        let (exchange, clock) = setup();
        assert_eq!(ensure_deadline(U256::from(10), 10), Ok(()));
        assert_eq!(ensure_deadline(U256::from(9), 10), Err(ExchangeError::Expired));

        clock.set(2_000);
        assert_eq!(
            exchange.transact_before(U256::from(1_999), |state, _| {
                state.factory_mut().create_pair(token_a(), token_b())
            }),
            Err(ExchangeError::Expired)
        );
        assert_eq!(exchange.all_pairs_length(), 0);
    }

    #[test]
    fn test_fee_to_through_exchange() {
        let (exchange, _) = setup();
        let recipient = Address::repeat_byte(0xFE);
        assert_eq!(
            exchange.set_fee_to(alice(), recipient),
            Err(ExchangeError::Forbidden)
        );
        exchange
            .set_fee_to(Address::repeat_byte(0x5E), recipient)
            .unwrap();
        assert_eq!(exchange.fee_to(), recipient);
    }

    #[test]
    fn test_deadline_checked_against_operation_time() {
        let mut ledger = MemoryLedger::new(Address::repeat_byte(0xEE));
        ledger.mint(token_a(), alice(), U256::from(1)).unwrap();
        let exchange = Exchange::with_clock(
            Address::repeat_byte(0xFA),
            Address::repeat_byte(0x5E),
            ExchangeConfig::default(),
            ledger,
            Arc::new(TickingClock(AtomicU64::new(1_000))),
        );

        // the operation runs at the very time the deadline was checked against
        assert_eq!(
            exchange.transact_before(U256::from(1_000), |_, now| Ok(now)),
            Ok(1_000)
        );
        assert_eq!(
            exchange.transact_before(U256::from(1_000), |_, now| Ok(now)),
            Err(ExchangeError::Expired)
        );
    }

    #[test]
    fn test_rollback_forgets_created_pair_and_pair_changes() {
        let (exchange, _) = setup();
        let pair = exchange.create_pair(token_a(), token_b()).unwrap();
        exchange
            .transact(|state, now| {
                state.ledger_mut().transfer(token_a(), alice(), pair, U256::from(4000))?;
                state.ledger_mut().transfer(token_b(), alice(), pair, U256::from(4000))?;
                state.mint(pair, alice(), now)
            })
            .unwrap();

        let token_c = Address::repeat_byte(0x03);
        let result = exchange.transact(|state, now| {
            state.factory_mut().create_pair(token_a(), token_c)?;
            state.ledger_mut().transfer(token_a(), alice(), pair, U256::from(1000))?;
            state.sync(pair, now)?;
            state.mint(pair, alice(), now)
        });
        assert_eq!(result, Err(ExchangeError::InsufficientLiquidityMinted));

        assert_eq!(exchange.all_pairs_length(), 1);
        assert_eq!(exchange.get_pair(token_a(), token_c), None);
        assert_eq!(exchange.get_reserves(pair).unwrap().reserve0, U256::from(4000));
        exchange.read(|state| {
            assert_eq!(state.ledger().balance_of(token_a(), pair), U256::from(4000));
        });
    }

    #[test]
    fn test_panicking_operation_rolls_back() {
        let (exchange, _) = setup();
        let pair = exchange.create_pair(token_a(), token_b()).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            exchange.transact(|state, _| -> Result<()> {
                state.ledger_mut().transfer(token_a(), alice(), pair, U256::from(1000))?;
                panic!("operation aborted");
            })
        }));
        assert!(outcome.is_err());
        exchange.read(|state| {
            assert_eq!(state.ledger().balance_of(token_a(), pair), U256::ZERO);
        });
    }
}
