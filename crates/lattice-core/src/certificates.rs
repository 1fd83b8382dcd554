//! # Mutation Certificates
//!
//! Open-position and add-liquidity hand the caller an obligation that
//! must be repaid with exactly the owed balances before the flow ends.
//! Certificates are deliberately neither `Clone` nor serializable, and
//! closing certs must be drained before they can be destroyed.

use crate::error::{DlmmError, Result};
use crate::registry::PoolKey;
use crate::token::TokenTag;

/// Obligation issued by `open_position`.
#[must_use = "an open certificate must be repaid"]
#[derive(Debug)]
pub struct OpenCert {
    pub(crate) pool_id: PoolKey,
    pub(crate) active_included: bool,
}

impl OpenCert {
    pub fn pool_id(&self) -> PoolKey {
        self.pool_id
    }
}

/// Obligation issued by `add_liquidity`, carrying the owed totals.
#[must_use = "an add certificate must be repaid"]
#[derive(Debug)]
pub struct AddCert {
    pub(crate) pool_id: PoolKey,
    pub(crate) total_a: u64,
    pub(crate) total_b: u64,
}

impl AddCert {
    pub fn pool_id(&self) -> PoolKey {
        self.pool_id
    }

    pub fn totals(&self) -> (u64, u64) {
        (self.total_a, self.total_b)
    }
}

/// Reward residue of a closed position, drained one token at a time.
#[must_use = "a close certificate must be drained and destroyed"]
#[derive(Debug)]
pub struct ClosePositionCert {
    pub(crate) pool_id: PoolKey,
    pub(crate) rewards: Vec<(TokenTag, u64)>,
}

impl ClosePositionCert {
    pub fn pool_id(&self) -> PoolKey {
        self.pool_id
    }

    /// Tokens still held by the certificate.
    pub fn remaining(&self) -> usize {
        self.rewards.len()
    }

    pub(crate) fn take(&mut self, token: &TokenTag) -> Option<u64> {
        let index = self.rewards.iter().position(|(t, _)| t == token)?;
        Some(self.rewards.swap_remove(index).1)
    }

    /// Destroys a fully drained certificate.
    pub fn destroy(self) -> Result<()> {
        if self.rewards.is_empty() {
            Ok(())
        } else {
            Err(DlmmError::InvalidInput)
        }
    }
}
