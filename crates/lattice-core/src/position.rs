//! # Position
//!
//! A contiguous run of bin shares plus the growth snapshots that make
//! fee and reward attribution lazy: owed amounts accrue only when a bin
//! is settled against its current accumulators. Positions reference bins
//! by id, never by pointer; the pool resolves them through its store.

use serde::{Deserialize, Serialize};

use lattice_math::amount_from_growth;

use crate::bin::Bin;
use crate::bin_store::check_bin_id;
use crate::constants::MAX_POSITION_WIDTH;
use crate::error::{DlmmError, Result};
use crate::registry::PoolKey;

/// Per-bin share and last-seen growth snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinStat {
    pub bin_id: i32,
    pub liquidity_share: u128,
    pub fee_a_growth: u128,
    pub fee_b_growth: u128,
    pub rewards_growth: Vec<u128>,
}

/// A multi-bin liquidity position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pool_id: PoolKey,
    pub lower_bin_id: i32,
    pub stats: Vec<BinStat>,
    pub fee_owed_a: u64,
    pub fee_owed_b: u64,
    pub rewards_owed: Vec<u64>,
    /// In-flight mutation certificates issued against this position.
    pub flash_count: u8,
}

impl Position {
    pub(crate) fn new(pool_id: PoolKey, lower_bin_id: i32, width: u16) -> Result<Self> {
        if width == 0 || width > MAX_POSITION_WIDTH {
            return Err(DlmmError::PositionWidthInvalid);
        }
        check_bin_id(lower_bin_id)?;
        let upper = lower_bin_id
            .checked_add(width as i32 - 1)
            .ok_or(DlmmError::BinIdRange)?;
        check_bin_id(upper)?;

        let stats = (0..width as i32)
            .map(|offset| BinStat {
                bin_id: lower_bin_id + offset,
                liquidity_share: 0,
                fee_a_growth: 0,
                fee_b_growth: 0,
                rewards_growth: Vec::new(),
            })
            .collect();

        Ok(Self {
            pool_id,
            lower_bin_id,
            stats,
            fee_owed_a: 0,
            fee_owed_b: 0,
            rewards_owed: Vec::new(),
            flash_count: 0,
        })
    }

    pub fn width(&self) -> u16 {
        self.stats.len() as u16
    }

    pub fn upper_bin_id(&self) -> i32 {
        self.lower_bin_id + self.stats.len() as i32 - 1
    }

    pub fn contains(&self, bin_id: i32) -> bool {
        (self.lower_bin_id..=self.upper_bin_id()).contains(&bin_id)
    }

    pub fn stat_index(&self, bin_id: i32) -> Option<usize> {
        if self.contains(bin_id) {
            Some((bin_id - self.lower_bin_id) as usize)
        } else {
            None
        }
    }

    pub fn share_at(&self, bin_id: i32) -> u128 {
        self.stat_index(bin_id)
            .map(|index| self.stats[index].liquidity_share)
            .unwrap_or(0)
    }

    /// Accrues fees and rewards owed by one bin since its snapshot, then
    /// refreshes the snapshot. Growth accumulators are monotonic, so the
    /// wrapping difference is the delta even across an accumulator wrap.
    pub(crate) fn settle_bin(
        &mut self,
        index: usize,
        bin: &Bin,
        reward_slots: usize,
    ) -> Result<()> {
        let stat = &mut self.stats[index];
        debug_assert_eq!(stat.bin_id, bin.id);
        let share = stat.liquidity_share;

        if self.rewards_owed.len() < reward_slots {
            self.rewards_owed.resize(reward_slots, 0);
        }
        if stat.rewards_growth.len() < reward_slots {
            stat.rewards_growth.resize(reward_slots, 0);
        }

        if share > 0 {
            let delta_a = bin.fee_a_growth_global.wrapping_sub(stat.fee_a_growth);
            let delta_b = bin.fee_b_growth_global.wrapping_sub(stat.fee_b_growth);
            self.fee_owed_a = self
                .fee_owed_a
                .checked_add(amount_from_growth(delta_a, share)?)
                .ok_or(DlmmError::AmountOverflow)?;
            self.fee_owed_b = self
                .fee_owed_b
                .checked_add(amount_from_growth(delta_b, share)?)
                .ok_or(DlmmError::AmountOverflow)?;

            for slot in 0..reward_slots {
                let growth = bin.reward_growth(slot);
                let delta = growth.wrapping_sub(stat.rewards_growth[slot]);
                self.rewards_owed[slot] = self.rewards_owed[slot]
                    .checked_add(amount_from_growth(delta, share)?)
                    .ok_or(DlmmError::AmountOverflow)?;
            }
        }

        stat.fee_a_growth = bin.fee_a_growth_global;
        stat.fee_b_growth = bin.fee_b_growth_global;
        for slot in 0..reward_slots {
            stat.rewards_growth[slot] = bin.reward_growth(slot);
        }
        Ok(())
    }

    /// Drains the settled fee balances.
    pub(crate) fn take_fees(&mut self) -> (u64, u64) {
        (
            std::mem::take(&mut self.fee_owed_a),
            std::mem::take(&mut self.fee_owed_b),
        )
    }

    /// Drains one settled reward balance.
    pub(crate) fn take_reward(&mut self, slot: usize) -> u64 {
        self.rewards_owed
            .get_mut(slot)
            .map(std::mem::take)
            .unwrap_or(0)
    }

    /// Whether the position holds no shares and owes nothing; only such
    /// positions may be destroyed.
    pub fn is_clear(&self) -> bool {
        self.stats.iter().all(|stat| stat.liquidity_share == 0)
            && self.fee_owed_a == 0
            && self.fee_owed_b == 0
            && self.rewards_owed.iter().all(|owed| *owed == 0)
    }

    /// Consumes a cleared position. Positions still holding shares, owed
    /// balances or outstanding certificates cannot be destroyed.
    pub fn destroy(self) -> Result<()> {
        if self.flash_count == 0 && self.is_clear() {
            Ok(())
        } else {
            Err(DlmmError::InvalidInput)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenTag;
    use lattice_math::ONE;

    fn key() -> PoolKey {
        PoolKey::derive(&TokenTag::from("a"), &TokenTag::from("b"), 25, 1)
    }

    #[test]
    fn width_bounds() {
        assert!(Position::new(key(), 0, 0).is_err());
        assert!(Position::new(key(), 0, MAX_POSITION_WIDTH + 1).is_err());
        let position = Position::new(key(), -5, 11).unwrap();
        assert_eq!(position.upper_bin_id(), 5);
        assert_eq!(position.width(), 11);
        assert!(position.contains(0));
        assert!(!position.contains(6));
        assert_eq!(position.stat_index(-5), Some(0));
        assert_eq!(position.stat_index(5), Some(10));
    }

    #[test]
    fn range_must_stay_in_bin_bounds() {
        assert_eq!(
            Position::new(key(), 443_630, 10).unwrap_err(),
            DlmmError::BinIdRange
        );
    }

    #[test]
    fn settlement_accrues_growth_deltas() {
        let mut position = Position::new(key(), 0, 1).unwrap();
        let mut bin = Bin::new(0, ONE);
        bin.deposit(0, 1024).unwrap();

        position.stats[0].liquidity_share = bin.liquidity_supply;

        // 64 tokens of fee growth over the full supply divide evenly.
        bin.credit_fee_growth(true, lattice_math::growth_from_amount(64, bin.liquidity_supply).unwrap());
        position.settle_bin(0, &bin, 0).unwrap();
        assert_eq!(position.fee_owed_a, 64);
        assert_eq!(position.fee_owed_b, 0);

        // Settling again without new growth accrues nothing.
        position.settle_bin(0, &bin, 0).unwrap();
        assert_eq!(position.fee_owed_a, 64);

        let (fee_a, fee_b) = position.take_fees();
        assert_eq!((fee_a, fee_b), (64, 0));
        assert!(!position.is_clear()); // share still held
    }

    #[test]
    fn reward_snapshots_follow_slots() {
        let mut position = Position::new(key(), 0, 1).unwrap();
        let mut bin = Bin::new(0, ONE);
        bin.deposit(0, 2).unwrap();
        position.stats[0].liquidity_share = bin.liquidity_supply;

        bin.credit_reward_growth(1, 10u128 << 64);
        position.settle_bin(0, &bin, 2).unwrap();
        assert_eq!(position.rewards_owed, vec![0, 20]);
        assert_eq!(position.take_reward(1), 20);
        assert_eq!(position.take_reward(1), 0);
    }

    #[test]
    fn zero_share_settle_only_refreshes_snapshots() {
        let mut position = Position::new(key(), 0, 1).unwrap();
        let mut bin = Bin::new(0, ONE);
        bin.deposit(0, 5).unwrap();
        bin.credit_fee_growth(false, 7u128 << 64);

        position.settle_bin(0, &bin, 0).unwrap();
        assert_eq!(position.fee_owed_b, 0);
        assert_eq!(position.stats[0].fee_b_growth, bin.fee_b_growth_global);
        assert!(position.is_clear());
    }
}
