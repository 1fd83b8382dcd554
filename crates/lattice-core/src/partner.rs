//! # Partner Referral
//!
//! The partner registry and claim flow live outside the engine; a swap
//! only needs the referral rate that applies at execution time.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_REF_FEE_RATE;
use crate::error::{DlmmError, Result};

/// A referral window: a share of the LP fee redirected to a partner
/// while `[start_time, end_time)` covers the swap timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    /// Share of the LP fee, in 10^-9 units; at most 100%.
    pub ref_fee_rate: u64,
    pub start_time: u64,
    pub end_time: u64,
}

impl Partner {
    pub fn new(ref_fee_rate: u64, start_time: u64, end_time: u64) -> Result<Self> {
        if ref_fee_rate > MAX_REF_FEE_RATE || start_time >= end_time {
            return Err(DlmmError::InvalidInput);
        }
        Ok(Self {
            ref_fee_rate,
            start_time,
            end_time,
        })
    }

    /// Referral rate applying at `now`; zero outside the window.
    pub fn active_rate_at(&self, now: u64) -> u64 {
        if (self.start_time..self.end_time).contains(&now) {
            self.ref_fee_rate
        } else {
            0
        }
    }
}
