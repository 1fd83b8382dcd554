//! # Pool Registry
//!
//! Creation glue reduced to its engine-facing interface: canonical pair
//! ordering, a deterministic pool key, and duplicate rejection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::BinStepConfig;
use crate::error::{DlmmError, Result};
use crate::pool::Pool;
use crate::token::TokenTag;

/// Deterministic identity of a pool: sha256 over the canonical pair and
/// the step/factor tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolKey([u8; 32]);

impl PoolKey {
    pub fn derive(token_a: &TokenTag, token_b: &TokenTag, bin_step: u16, base_factor: u16) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((token_a.as_bytes().len() as u64).to_le_bytes());
        hasher.update(token_a.as_bytes());
        hasher.update((token_b.as_bytes().len() as u64).to_le_bytes());
        hasher.update(token_b.as_bytes());
        hasher.update(bin_step.to_le_bytes());
        hasher.update(base_factor.to_le_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Tracks created pool keys so a pair/tier can only be created once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    keys: BTreeSet<PoolKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.keys.contains(key)
    }

    /// Creates a pool on the preset config for `(bin_step, base_factor)`.
    ///
    /// The pair must arrive in canonical byte-wise order; identical
    /// tokens are rejected.
    pub fn create_pool(
        &mut self,
        bin_step: u16,
        base_factor: u16,
        active_id: i32,
        token_a: TokenTag,
        token_b: TokenTag,
        now: u64,
    ) -> Result<Pool> {
        let config = BinStepConfig::preset(bin_step, base_factor)?;
        self.create_pool_with_config(config, active_id, token_a, token_b, now)
    }

    pub fn create_pool_with_config(
        &mut self,
        config: BinStepConfig,
        active_id: i32,
        token_a: TokenTag,
        token_b: TokenTag,
        now: u64,
    ) -> Result<Pool> {
        if token_a.as_bytes() >= token_b.as_bytes() {
            return Err(DlmmError::InvalidInput);
        }

        let key = PoolKey::derive(&token_a, &token_b, config.bin_step, config.base_factor);
        if !self.keys.insert(key) {
            return Err(DlmmError::InvalidInput);
        }

        Pool::new(key, config, active_id, token_a, token_b, now)
    }
}
