//! Off-chain signed approvals (EIP-2612 style permits).
//!
//! A permit is an EIP-712 typed-data signature over
//! `Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)`
//! bound to a domain made of the token name, version `"1"`, the chain id and
//! the verifying contract (the pair). Each owner has a nonce that advances on
//! every consumed permit, so a signature can be used at most once.

use crate::error::{ExchangeError, Result};
use crate::math;
use crate::types::{Address, Signature, B256, U256};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use std::collections::HashMap;
use tracing::debug;

sol! {
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

/// Domain version shared by every liquidity token.
pub const PERMIT_VERSION: &str = "1";

/// Verifies permits and tracks per-owner nonces for one token.
#[derive(Debug, Clone)]
pub struct PermitAuthorizer {
    domain: Eip712Domain,
    nonces: HashMap<Address, U256>,
}

impl PermitAuthorizer {
    pub fn new(name: &str, chain_id: u64, verifying_contract: Address) -> Self {
        let domain = Eip712Domain::new(
            Some(name.to_owned().into()),
            Some(PERMIT_VERSION.into()),
            Some(U256::from(chain_id)),
            Some(verifying_contract),
            None,
        );
        Self {
            domain,
            nonces: HashMap::new(),
        }
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// The EIP-712 domain separator.
    pub fn domain_separator(&self) -> B256 {
        self.domain.separator()
    }

    /// Next nonce expected from `owner`.
    pub fn nonces(&self, owner: Address) -> U256 {
        self.nonces.get(&owner).copied().unwrap_or_default()
    }

    /// The digest a wallet has to sign for this permit.
    pub fn digest(
        &self,
        owner: Address,
        spender: Address,
        value: U256,
        nonce: U256,
        deadline: U256,
    ) -> B256 {
        Permit {
            owner,
            spender,
            value,
            nonce,
            deadline,
        }
        .eip712_signing_hash(&self.domain)
    }

    /// Check a permit against the owner's current nonce and consume it.
    ///
    /// The nonce only advances when verification succeeds; applying the
    /// approval is up to the caller.
    pub fn verify_and_consume(
        &mut self,
        owner: Address,
        spender: Address,
        value: U256,
        deadline: U256,
        signature: &Signature,
        now: u64,
    ) -> Result<()> {
        if U256::from(now) > deadline {
            return Err(ExchangeError::PermitExpired);
        }

        let nonce = self.nonces(owner);
        let digest = self.digest(owner, spender, value, nonce, deadline);
        let recovered = signature
            .recover_address_from_prehash(&digest)
            .map_err(|_| ExchangeError::InvalidSignature)?;
        if recovered.is_zero() || recovered != owner {
            return Err(ExchangeError::InvalidSignature);
        }

        self.nonces.insert(owner, math::add(nonce, U256::from(1))?);
        debug!(%owner, %spender, %value, %nonce, "permit consumed");
        Ok(())
    }
}
