//! Pair factory and registry.

use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, Result};
use crate::library;
use crate::pair::{FeePolicy, Pair};
use crate::types::{Address, TokenId};
use std::collections::HashMap;
use tracing::info;

/// Protocol-fee switch as configured on the factory.
///
/// The fee is on whenever `fee_to` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSwitch {
    pub fee_to: Address,
}

impl FeePolicy for FeeSwitch {
    fn fee_to(&self) -> Option<Address> {
        (!self.fee_to.is_zero()).then_some(self.fee_to)
    }
}

/// Creates exactly one pair per unordered token pair and indexes it.
#[derive(Debug, Clone)]
pub struct Factory {
    address: Address,
    config: ExchangeConfig,
    fee_to: Address,
    fee_to_setter: Address,
    /// Both orientations of every registered token pair.
    get_pair: HashMap<(TokenId, TokenId), Address>,
    all_pairs: Vec<Address>,
    pairs: HashMap<Address, Pair>,
    journal: Option<FactoryJournal>,
}

/// What a rollback needs: the settings and pair count at the checkpoint, and
/// the first-seen copy of every pair handed out mutably since.
#[derive(Debug, Clone)]
struct FactoryJournal {
    fee_to: Address,
    fee_to_setter: Address,
    pairs_len: usize,
    touched: HashMap<Address, Pair>,
}

impl Factory {
    pub fn new(address: Address, fee_to_setter: Address, config: ExchangeConfig) -> Self {
        Self {
            address,
            config,
            fee_to: Address::ZERO,
            fee_to_setter,
            get_pair: HashMap::new(),
            all_pairs: Vec::new(),
            pairs: HashMap::new(),
            journal: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn fee_to(&self) -> Address {
        self.fee_to
    }

    pub fn fee_to_setter(&self) -> Address {
        self.fee_to_setter
    }

    /// The fee policy pairs consult on mint and burn.
    pub fn fee_switch(&self) -> FeeSwitch {
        FeeSwitch {
            fee_to: self.fee_to,
        }
    }

    /// Create the pair for two tokens and register it under both orderings.
    pub fn create_pair(&mut self, token_a: TokenId, token_b: TokenId) -> Result<Address> {
        let (token0, token1) = library::sort_tokens(token_a, token_b)?;
        if self.get_pair.contains_key(&(token0, token1)) {
            return Err(ExchangeError::PairExists);
        }

        let address = library::pair_for(self.address, token0, token1)?;
        let mut pair = Pair::new(address, self.address, &self.config);
        pair.initialize(token0, token1)?;

        self.pairs.insert(address, pair);
        self.get_pair.insert((token0, token1), address);
        self.get_pair.insert((token1, token0), address);
        self.all_pairs.push(address);

        info!(
            %token0,
            %token1,
            pair = %address,
            index = self.all_pairs.len(),
            "Pair created"
        );
        Ok(address)
    }

    pub fn get_pair(&self, token_a: TokenId, token_b: TokenId) -> Option<Address> {
        self.get_pair.get(&(token_a, token_b)).copied()
    }

    pub fn all_pairs(&self, index: usize) -> Option<Address> {
        self.all_pairs.get(index).copied()
    }

    pub fn all_pairs_length(&self) -> usize {
        self.all_pairs.len()
    }

    /// Get a pair ledger by address.
    pub fn pair(&self, address: Address) -> Result<&Pair> {
        self.pairs
            .get(&address)
            .ok_or(ExchangeError::PairNotFound(address))
    }

    /// Get a mutable pair ledger by address.
    pub fn pair_mut(&mut self, address: Address) -> Result<&mut Pair> {
        let pair = self
            .pairs
            .get_mut(&address)
            .ok_or(ExchangeError::PairNotFound(address))?;
        if let Some(journal) = self.journal.as_mut() {
            journal
                .touched
                .entry(address)
                .or_insert_with(|| pair.clone());
        }
        Ok(pair)
    }

    /// Start recording changes to the registry and to pairs accessed mutably.
    pub fn checkpoint(&mut self) {
        self.journal = Some(FactoryJournal {
            fee_to: self.fee_to,
            fee_to_setter: self.fee_to_setter,
            pairs_len: self.all_pairs.len(),
            touched: HashMap::new(),
        });
    }

    /// Keep every change made since the checkpoint.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Restore touched pairs and settings, and forget pairs created since the checkpoint.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        self.fee_to = journal.fee_to;
        self.fee_to_setter = journal.fee_to_setter;
        self.pairs.extend(journal.touched);

        let created: Vec<Address> = self.all_pairs.drain(journal.pairs_len..).collect();
        for address in created {
            if let Some(pair) = self.pairs.remove(&address) {
                self.get_pair.remove(&(pair.token0(), pair.token1()));
                self.get_pair.remove(&(pair.token1(), pair.token0()));
            }
        }
    }

    pub fn set_fee_to(&mut self, caller: Address, fee_to: Address) -> Result<()> {
        self.ensure_fee_to_setter(caller)?;
        self.fee_to = fee_to;
        info!(%fee_to, "Protocol fee recipient updated");
        Ok(())
    }

    pub fn set_fee_to_setter(&mut self, caller: Address, fee_to_setter: Address) -> Result<()> {
        self.ensure_fee_to_setter(caller)?;
        self.fee_to_setter = fee_to_setter;
        info!(%fee_to_setter, "Fee setter updated");
        Ok(())
    }

    fn ensure_fee_to_setter(&self, caller: Address) -> Result<()> {
        if caller != self.fee_to_setter {
            return Err(ExchangeError::Forbidden);
        }
        Ok(())
    }
}
