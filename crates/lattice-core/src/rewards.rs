//! # Reward Engine
//!
//! Up to five reward tokens emit over time-sliced schedules. Emissions
//! accrue to whichever bin is active at settlement time; emissions that
//! land while the active bin has no liquidity are refunded to the reward
//! manager instead of vanishing.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bin::Bin;
use crate::constants::{
    MAX_REWARD_SLOTS, MIN_REWARD_DURATION, RESERVED_REWARD_SLOTS, REWARD_PERIOD_LENGTH,
    REWARD_PERIOD_REFERENCE,
};
use crate::error::{DlmmError, Result};
use crate::token::{Balance, BalanceBag, TokenTag};

/// One reward token's emission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSlot {
    pub token: TokenTag,
    /// Q64.64 tokens per second, valid at the manager's last update.
    pub emission_rate: u128,
    /// Start-timestamp → signed Q64.64 rate delta. Prefix-summing the
    /// deltas up to a time yields the rate at that time.
    pub period_schedule: BTreeMap<u64, i128>,
    /// Cumulative Q64.64 amount released into bins.
    pub reward_released: U256,
    /// Cumulative whole tokens emitted while no liquidity was active.
    pub reward_refunded: u128,
    /// Portion of `reward_refunded` already returned to the manager.
    pub refund_claimed: u128,
    /// Cumulative whole tokens paid out to positions.
    pub reward_harvested: u128,
}

impl RewardSlot {
    fn new(token: TokenTag) -> Self {
        Self {
            token,
            emission_rate: 0,
            period_schedule: BTreeMap::new(),
            reward_released: U256::ZERO,
            reward_refunded: 0,
            refund_claimed: 0,
            reward_harvested: 0,
        }
    }
}

/// Reward slots, their shared clock, and the emission vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardManager {
    pub slots: Vec<RewardSlot>,
    pub last_updated_time: u64,
    pub vault: BalanceBag,
}

/// Reward epoch of a timestamp, for reporting. `None` before the origin.
pub fn emission_epoch(now: u64) -> Option<u64> {
    now.checked_sub(REWARD_PERIOD_REFERENCE)
        .map(|since| since / REWARD_PERIOD_LENGTH)
}

impl RewardManager {
    pub fn new(now: u64) -> Self {
        Self {
            slots: Vec::new(),
            last_updated_time: now,
            vault: BalanceBag::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_index(&self, token: &TokenTag) -> Option<usize> {
        self.slots.iter().position(|slot| &slot.token == token)
    }

    /// Opens a slot for `token`. The tail slots are reserved for the
    /// privileged reward manager.
    pub fn initialize(&mut self, token: TokenTag, privileged: bool) -> Result<usize> {
        if self.slot_index(&token).is_some() {
            return Err(DlmmError::RewardExists);
        }
        let index = self.slots.len();
        if index >= MAX_REWARD_SLOTS {
            return Err(DlmmError::RewardSlotFull);
        }
        if index >= MAX_REWARD_SLOTS - RESERVED_REWARD_SLOTS && !privileged {
            return Err(DlmmError::OpsBlocked);
        }
        self.slots.push(RewardSlot::new(token));
        Ok(index)
    }

    /// Schedules `amount` to emit linearly over `[start, end)` and banks
    /// it in the vault. Callers settle to `now` first so a start at `now`
    /// merges straight into the live rate.
    pub fn add_reward(
        &mut self,
        token: &TokenTag,
        amount: u64,
        start: Option<u64>,
        end: u64,
        now: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(DlmmError::InvalidInput);
        }
        let index = self.slot_index(token).ok_or(DlmmError::RewardMissing)?;

        let start = start.unwrap_or(now).max(now);
        let duration = end
            .checked_sub(start)
            .ok_or(DlmmError::RewardDurationTooShort)?;
        if duration < MIN_REWARD_DURATION {
            return Err(DlmmError::RewardDurationTooShort);
        }

        let rate = ((amount as u128) << 64) / duration as u128;
        if rate > u128::MAX / 2 {
            return Err(DlmmError::AmountOverflow);
        }

        let slot = &mut self.slots[index];
        if start <= self.last_updated_time {
            slot.emission_rate = slot
                .emission_rate
                .checked_add(rate)
                .ok_or(DlmmError::AmountOverflow)?;
        } else {
            add_delta(&mut slot.period_schedule, start, rate as i128)?;
        }
        add_delta(&mut slot.period_schedule, end, -(rate as i128))?;

        self.vault.deposit(Balance::new(token.clone(), amount))?;

        debug!(
            token = ?token,
            amount,
            start,
            end,
            epoch = ?emission_epoch(start),
            "reward scheduled"
        );
        Ok(())
    }

    /// Advances every slot from the last update to `now`, crediting the
    /// released amounts to `active_bin` (when it has supply) or to the
    /// refund tally (when it does not).
    pub fn settle(&mut self, active_bin: Option<&mut Bin>, now: u64) -> Result<()> {
        if now <= self.last_updated_time {
            return Ok(());
        }
        let from = self.last_updated_time;

        let active_liquidity = active_bin
            .as_ref()
            .map(|bin| bin.liquidity_supply)
            .unwrap_or(0);
        let mut bin = active_bin;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let mut t = from;
            let mut rate = slot.emission_rate;
            let mut released = U256::ZERO;

            let boundaries: Vec<u64> = slot
                .period_schedule
                .range((Excluded(from), Included(now)))
                .map(|(ts, _)| *ts)
                .collect();

            for ts in boundaries {
                released += U256::from(rate) * U256::from(ts - t);
                let delta = slot
                    .period_schedule
                    .remove(&ts)
                    .expect("boundary collected above");
                rate = apply_rate_delta(rate, delta)?;
                t = ts;
            }
            released += U256::from(rate) * U256::from(now - t);
            slot.emission_rate = rate;

            if released.is_zero() {
                continue;
            }

            if active_liquidity > 0 {
                let growth: u128 = ((released << 64u32) / U256::from(active_liquidity))
                    .try_into()
                    .map_err(|_| DlmmError::AmountOverflow)?;
                bin.as_deref_mut()
                    .expect("liquidity implies a bin")
                    .credit_reward_growth(index, growth);
                slot.reward_released = slot
                    .reward_released
                    .checked_add(released)
                    .ok_or(DlmmError::AmountOverflow)?;
            } else {
                let refunded: u128 = (released >> 64u32)
                    .try_into()
                    .map_err(|_| DlmmError::AmountOverflow)?;
                slot.reward_refunded = slot
                    .reward_refunded
                    .checked_add(refunded)
                    .ok_or(DlmmError::AmountOverflow)?;
            }
        }

        self.last_updated_time = now;
        Ok(())
    }

    /// Pays `amount` of a settled reward out of the vault to a position.
    pub fn harvest(&mut self, token: &TokenTag, amount: u64) -> Result<Balance> {
        let index = self.slot_index(token).ok_or(DlmmError::RewardMissing)?;
        let balance = self.vault.withdraw(token, amount)?;
        self.slots[index].reward_harvested = self.slots[index]
            .reward_harvested
            .checked_add(amount as u128)
            .ok_or(DlmmError::AmountOverflow)?;
        Ok(balance)
    }

    /// Returns emissions that landed on empty liquidity to the manager.
    pub fn withdraw_refunded(&mut self, token: &TokenTag) -> Result<Balance> {
        let index = self.slot_index(token).ok_or(DlmmError::RewardMissing)?;
        let slot = &mut self.slots[index];
        let pending = slot.reward_refunded - slot.refund_claimed;
        let amount = u64::try_from(pending).map_err(|_| DlmmError::AmountOverflow)?;
        slot.refund_claimed = slot.reward_refunded;
        self.vault.withdraw(token, amount)
    }
}

fn add_delta(schedule: &mut BTreeMap<u64, i128>, at: u64, delta: i128) -> Result<()> {
    let entry = schedule.entry(at).or_insert(0);
    *entry = entry.checked_add(delta).ok_or(DlmmError::AmountOverflow)?;
    if *entry == 0 {
        schedule.remove(&at);
    }
    Ok(())
}

fn apply_rate_delta(rate: u128, delta: i128) -> Result<u128> {
    let signed = i128::try_from(rate).map_err(|_| DlmmError::AmountOverflow)?;
    let next = signed.checked_add(delta).ok_or(DlmmError::AmountOverflow)?;
    u128::try_from(next).map_err(|_| DlmmError::AmountOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_math::ONE;

    const T0: u64 = REWARD_PERIOD_REFERENCE;

    fn manager_with_weekly_emission() -> (RewardManager, TokenTag) {
        let token = TokenTag::from("reward");
        let mut manager = RewardManager::new(T0);
        manager.initialize(token.clone(), false).unwrap();
        manager
            .add_reward(&token, 604_800, Some(T0), T0 + 604_800, T0)
            .unwrap();
        (manager, token)
    }

    #[test]
    fn slot_limits_and_reservation() {
        let mut manager = RewardManager::new(0);
        for i in 0..3 {
            manager
                .initialize(TokenTag::from(format!("t{i}").as_str()), false)
                .unwrap();
        }
        assert_eq!(
            manager.initialize(TokenTag::from("t3"), false),
            Err(DlmmError::OpsBlocked)
        );
        manager.initialize(TokenTag::from("t3"), true).unwrap();
        manager.initialize(TokenTag::from("t4"), true).unwrap();
        assert_eq!(
            manager.initialize(TokenTag::from("t5"), true),
            Err(DlmmError::RewardSlotFull)
        );
        assert_eq!(
            manager.initialize(TokenTag::from("t0"), true),
            Err(DlmmError::RewardExists)
        );
    }

    #[test]
    fn weekly_amount_yields_unit_rate() {
        let (manager, _) = manager_with_weekly_emission();
        assert_eq!(manager.slots[0].emission_rate, 1u128 << 64);
        // The closing delta sits at the end of the window.
        assert_eq!(
            manager.slots[0].period_schedule.get(&(T0 + 604_800)),
            Some(&-((1i128) << 64))
        );
    }

    #[test]
    fn short_durations_rejected() {
        let token = TokenTag::from("r");
        let mut manager = RewardManager::new(0);
        manager.initialize(token.clone(), false).unwrap();
        assert_eq!(
            manager.add_reward(&token, 100, Some(10), 10 + MIN_REWARD_DURATION - 1, 0),
            Err(DlmmError::RewardDurationTooShort)
        );
        assert_eq!(
            manager.add_reward(&token, 100, Some(100), 50, 0),
            Err(DlmmError::RewardDurationTooShort)
        );
    }

    #[test]
    fn refund_then_release() {
        let (mut manager, _) = manager_with_weekly_emission();

        // First five seconds: no active liquidity, emissions are refunded.
        manager.settle(None, T0 + 5).unwrap();
        assert_eq!(manager.slots[0].reward_refunded, 5);
        assert_eq!(manager.slots[0].reward_released, U256::ZERO);

        // Next five seconds: one unit of liquidity is active.
        let mut bin = Bin::new(0, ONE);
        bin.deposit(0, 1).unwrap();
        assert_eq!(bin.liquidity_supply, 1u128 << 64);
        manager.settle(Some(&mut bin), T0 + 10).unwrap();

        assert_eq!(manager.slots[0].reward_refunded, 5);
        assert_eq!(manager.slots[0].reward_released, U256::from(5u128 << 64));
        // growth = released * 2^64 / liquidity = 5 << 64 in Q64.64.
        assert_eq!(bin.reward_growth(0), 5u128 << 64);
    }

    #[test]
    fn emission_stops_at_window_end() {
        let (mut manager, _) = manager_with_weekly_emission();
        let mut bin = Bin::new(0, ONE);
        bin.deposit(0, 1).unwrap();

        manager.settle(Some(&mut bin), T0 + 604_800 + 1000).unwrap();
        assert_eq!(manager.slots[0].emission_rate, 0);
        assert!(manager.slots[0].period_schedule.is_empty());
        // Exactly the scheduled amount was released.
        assert_eq!(
            manager.slots[0].reward_released,
            U256::from(604_800u128 << 64)
        );
    }

    #[test]
    fn deferred_start_applies_at_boundary() {
        let token = TokenTag::from("r");
        let mut manager = RewardManager::new(0);
        manager.initialize(token.clone(), false).unwrap();
        manager
            .add_reward(&token, 7200, Some(1000), 1000 + 7200, 0)
            .unwrap();
        assert_eq!(manager.slots[0].emission_rate, 0);

        let mut bin = Bin::new(0, ONE);
        bin.deposit(0, 1).unwrap();
        // 500s before the start emit nothing; 100s after emit at 1/s.
        manager.settle(Some(&mut bin), 1100).unwrap();
        assert_eq!(manager.slots[0].emission_rate, 1u128 << 64);
        assert_eq!(
            manager.slots[0].reward_released,
            U256::from(100u128 << 64)
        );
    }

    #[test]
    fn refunds_withdraw_once() {
        let (mut manager, token) = manager_with_weekly_emission();
        manager.settle(None, T0 + 100).unwrap();

        let refund = manager.withdraw_refunded(&token).unwrap();
        assert_eq!(refund.amount, 100);
        let again = manager.withdraw_refunded(&token).unwrap();
        assert_eq!(again.amount, 0);
        assert_eq!(manager.vault.amount_of(&token), 604_800 - 100);
    }

    #[test]
    fn harvest_tracks_totals() {
        let (mut manager, token) = manager_with_weekly_emission();
        let paid = manager.harvest(&token, 250).unwrap();
        assert_eq!(paid.amount, 250);
        assert_eq!(manager.slots[0].reward_harvested, 250);
        assert_eq!(
            manager.harvest(&TokenTag::from("other"), 1),
            Err(DlmmError::RewardMissing)
        );
    }

    #[test]
    fn epochs_anchor_at_reference() {
        assert_eq!(emission_epoch(REWARD_PERIOD_REFERENCE), Some(0));
        assert_eq!(
            emission_epoch(REWARD_PERIOD_REFERENCE + REWARD_PERIOD_LENGTH),
            Some(1)
        );
        assert_eq!(emission_epoch(0), None);
    }
}
