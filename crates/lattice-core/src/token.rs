//! # Token Identity and Balances
//!
//! Token type parameters are erased at the engine boundary: tokens are
//! keyed by an opaque, byte-wise ordered tag, and amounts move as
//! value-typed balances. The engine never calls token code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DlmmError, Result};

/// Opaque token identifier. Ordering is byte-wise on the tag contents,
/// which makes pair canonicalization stable across hosts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenTag(Vec<u8>);

impl TokenTag {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for TokenTag {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// A value-typed amount of one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub token: TokenTag,
    pub amount: u64,
}

impl Balance {
    pub fn new(token: TokenTag, amount: u64) -> Self {
        Self { token, amount }
    }
}

/// Balances held by the engine, keyed by token tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBag {
    balances: BTreeMap<TokenTag, u64>,
}

impl BalanceBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn amount_of(&self, token: &TokenTag) -> u64 {
        self.balances.get(token).copied().unwrap_or(0)
    }

    pub fn deposit(&mut self, balance: Balance) -> Result<()> {
        let entry = self.balances.entry(balance.token).or_insert(0);
        *entry = entry
            .checked_add(balance.amount)
            .ok_or(DlmmError::AmountOverflow)?;
        Ok(())
    }

    /// Withdraws exactly `amount`, failing if the bag holds less.
    pub fn withdraw(&mut self, token: &TokenTag, amount: u64) -> Result<Balance> {
        if amount == 0 {
            return Ok(Balance::new(token.clone(), 0));
        }
        let held = self.balances.get_mut(token).ok_or(DlmmError::InvalidInput)?;
        *held = held.checked_sub(amount).ok_or(DlmmError::AmountOverflow)?;
        if *held == 0 {
            self.balances.remove(token);
        }
        Ok(Balance::new(token.clone(), amount))
    }
}
