//! # Pool
//!
//! Orchestrates swaps over the bin store, position lifecycle, reward
//! settlement and the protocol fee sinks. Swaps are planned against an
//! immutable snapshot and applied only when the whole traversal
//! succeeds, so a failed call never leaves a half-swapped store.

use serde::{Deserialize, Serialize};
use tracing::debug;

use lattice_math::{
    amount_out_from_in, fee_inclusive, growth_from_amount, liquidity_from_amounts, mul_div,
    price_math, Rounding, FEE_PRECISION,
};

use crate::bin::{Bin, BinSwapOutcome};
use crate::bin_store::{check_bin_id, BinStore};
use crate::certificates::{AddCert, ClosePositionCert, OpenCert};
use crate::config::{BinStepConfig, VariableParameters};
use crate::error::{DlmmError, Result};
use crate::position::Position;
use crate::registry::PoolKey;
use crate::rewards::RewardManager;
use crate::token::{Balance, TokenTag};

/// One bin's contribution to a swap. `amount_in` is gross of fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinSwap {
    pub bin_id: i32,
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee: u64,
    pub var_fee_rate: u64,
}

/// Full swap breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee: u64,
    pub protocol_fee: u64,
    pub ref_fee: u64,
    pub steps: Vec<BinSwap>,
}

impl SwapResult {
    fn update(&mut self, step: BinSwap) {
        self.amount_in += step.amount_in;
        self.amount_out += step.amount_out;
        self.fee += step.fee;
        self.steps.push(step);
    }
}

/// Operations that can be disabled per pool. The reserved kinds exist in
/// the wire encoding but are rejected at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    CollectFee,
    CollectReward,
    AddReward,
    Reserved0,
    Reserved1,
    Reserved2,
}

impl OperationKind {
    fn bit(self) -> Result<u16> {
        let shift = match self {
            OperationKind::Swap => 0,
            OperationKind::AddLiquidity => 1,
            OperationKind::RemoveLiquidity => 2,
            OperationKind::CollectFee => 3,
            OperationKind::CollectReward => 4,
            OperationKind::AddReward => 5,
            OperationKind::Reserved0 | OperationKind::Reserved1 | OperationKind::Reserved2 => {
                return Err(DlmmError::InvalidInput)
            }
        };
        Ok(1 << shift)
    }
}

/// Per-operation disable bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(u16);

impl Permissions {
    pub fn allows(&self, kind: OperationKind) -> bool {
        match kind.bit() {
            Ok(bit) => self.0 & bit == 0,
            Err(_) => false,
        }
    }

    fn set(&mut self, kind: OperationKind, disabled: bool) -> Result<()> {
        let bit = kind.bit()?;
        if disabled {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
        Ok(())
    }
}

/// Projected holdings of a position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub amount_a: u64,
    pub amount_b: u64,
    pub fee_a: u64,
    pub fee_b: u64,
    pub rewards: Vec<u64>,
}

/// A planned one-bin mutation, applied only after the full traversal
/// has been computed.
#[derive(Debug, Clone)]
struct PlannedStep {
    bin_id: i32,
    outcome: BinSwapOutcome,
    lp_fee_growth: u128,
}

#[derive(Debug, Clone)]
struct SwapPlan {
    result: SwapResult,
    active_id: i32,
    v_parameters: VariableParameters,
    mutations: Vec<PlannedStep>,
}

/// One pool instance. The host runtime serializes all mutating calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolKey,
    pub token_a: TokenTag,
    pub token_b: TokenTag,
    pub active_id: i32,
    pub base_fee_rate: u64,
    pub v_parameters: VariableParameters,
    pub bins: BinStore,
    pub rewards: RewardManager,
    pub protocol_fee_a: u64,
    pub protocol_fee_b: u64,
    pub paused: bool,
    pub permissions: Permissions,
    /// Open/add certificates outstanding; swaps fail while nonzero.
    pub active_open_positions: u32,
}

impl Pool {
    pub(crate) fn new(
        id: PoolKey,
        config: BinStepConfig,
        active_id: i32,
        token_a: TokenTag,
        token_b: TokenTag,
        now: u64,
    ) -> Result<Self> {
        check_bin_id(active_id)?;
        let base_fee_rate = config.initial_base_fee_rate();
        if base_fee_rate >= FEE_PRECISION {
            return Err(DlmmError::FeeRateInvalid);
        }
        Ok(Self {
            id,
            token_a,
            token_b,
            active_id,
            base_fee_rate,
            v_parameters: VariableParameters::new(config, active_id, now),
            bins: BinStore::new(),
            rewards: RewardManager::new(now),
            protocol_fee_a: 0,
            protocol_fee_b: 0,
            paused: false,
            permissions: Permissions::default(),
            active_open_positions: 0,
        })
    }

    pub fn bin_step(&self) -> u16 {
        self.v_parameters.bin_step_config.bin_step
    }

    // ========================================================================
    // Swaps
    // ========================================================================

    pub fn swap_exact_in(
        &mut self,
        amount_in: u64,
        a2b: bool,
        now: u64,
        partner: Option<&crate::partner::Partner>,
    ) -> Result<SwapResult> {
        self.swap(amount_in, a2b, true, now, partner)
    }

    pub fn swap_exact_out(
        &mut self,
        amount_out: u64,
        a2b: bool,
        now: u64,
        partner: Option<&crate::partner::Partner>,
    ) -> Result<SwapResult> {
        self.swap(amount_out, a2b, false, now, partner)
    }

    /// Quotes a swap without touching pool state.
    pub fn preview_swap(
        &self,
        amount: u64,
        a2b: bool,
        by_amount_in: bool,
        now: u64,
        partner: Option<&crate::partner::Partner>,
    ) -> Result<SwapResult> {
        if amount == 0 {
            return Err(DlmmError::AmountZero);
        }
        let mut v_parameters = self.v_parameters.clone();
        v_parameters.update_references(self.active_id, now)?;
        let partner_rate = partner.map(|p| p.active_rate_at(now)).unwrap_or(0);
        let plan = self.plan_swap(v_parameters, amount, a2b, by_amount_in, partner_rate)?;
        Ok(plan.result)
    }

    fn swap(
        &mut self,
        amount: u64,
        a2b: bool,
        by_amount_in: bool,
        now: u64,
        partner: Option<&crate::partner::Partner>,
    ) -> Result<SwapResult> {
        self.ensure_unlocked(OperationKind::Swap)?;
        if self.active_open_positions > 0 {
            return Err(DlmmError::OpsBlocked);
        }
        if amount == 0 {
            return Err(DlmmError::AmountZero);
        }

        self.settle_rewards(now)?;
        self.v_parameters.update_references(self.active_id, now)?;

        let partner_rate = partner.map(|p| p.active_rate_at(now)).unwrap_or(0);
        let plan = self.plan_swap(
            self.v_parameters.clone(),
            amount,
            a2b,
            by_amount_in,
            partner_rate,
        )?;
        self.apply_swap_plan(&plan, a2b)?;

        self.active_id = plan.active_id;
        self.v_parameters = plan.v_parameters;
        self.v_parameters.finish_swap(now);

        debug!(
            a2b,
            by_amount_in,
            amount_in = plan.result.amount_in,
            amount_out = plan.result.amount_out,
            fee = plan.result.fee,
            steps = plan.result.steps.len(),
            active_id = self.active_id,
            "swap settled"
        );
        Ok(plan.result)
    }

    /// Walks the bin set in swap direction against an immutable store.
    fn plan_swap(
        &self,
        mut v_parameters: VariableParameters,
        amount: u64,
        a2b: bool,
        by_amount_in: bool,
        partner_rate: u64,
    ) -> Result<SwapPlan> {
        let protocol_fee_rate = v_parameters.bin_step_config.protocol_fee_rate;

        let mut current = if a2b {
            self.bins.floor_at(self.active_id)
        } else {
            self.bins.ceil_at(self.active_id)
        };

        let mut active_id = self.active_id;
        let mut remaining = amount;
        let mut result = SwapResult::default();
        let mut mutations: Vec<PlannedStep> = Vec::new();

        while remaining > 0 {
            let bin_id = current.ok_or(DlmmError::BinMissing)?;
            active_id = bin_id;
            v_parameters.update_volatility_accumulator(active_id)?;
            let (fee_rate, var_fee_rate) = v_parameters.total_fee_rate(self.base_fee_rate)?;

            let bin = self.bins.get(bin_id).expect("seek returned an occupied bin");
            let outcome = if by_amount_in {
                bin.compute_swap_exact_in(remaining, a2b, fee_rate, protocol_fee_rate)?
            } else {
                bin.compute_swap_exact_out(remaining, a2b, fee_rate, protocol_fee_rate)?
            };

            if outcome.amount_in > 0 || outcome.amount_out > 0 {
                // The receiving side must be able to absorb the net input.
                let net_in = outcome.amount_in - outcome.fee;
                let receiving = if a2b { bin.amount_a } else { bin.amount_b };
                receiving.checked_add(net_in).ok_or(DlmmError::AmountOverflow)?;

                let ref_fee = if partner_rate > 0 {
                    let cut = mul_div(
                        outcome.fee as u128,
                        partner_rate as u128,
                        FEE_PRECISION as u128,
                        Rounding::Down,
                    )? as u64;
                    // The referral comes out of the LP share, never the
                    // protocol's.
                    cut.min(outcome.fee - outcome.protocol_fee)
                } else {
                    0
                };
                let lp_fee = outcome.fee - outcome.protocol_fee - ref_fee;
                let lp_fee_growth = if lp_fee > 0 && bin.liquidity_supply > 0 {
                    growth_from_amount(lp_fee, bin.liquidity_supply)?
                } else {
                    0
                };

                mutations.push(PlannedStep {
                    bin_id,
                    outcome,
                    lp_fee_growth,
                });
                result.protocol_fee += outcome.protocol_fee;
                result.ref_fee += ref_fee;
                result.update(BinSwap {
                    bin_id,
                    amount_in: outcome.amount_in,
                    amount_out: outcome.amount_out,
                    fee: outcome.fee,
                    var_fee_rate,
                });

                remaining -= if by_amount_in {
                    outcome.amount_in
                } else {
                    outcome.amount_out
                };
            }

            if remaining == 0 {
                break;
            }
            current = if a2b {
                self.bins.next_below(bin_id)
            } else {
                self.bins.next_above(bin_id)
            };
        }

        if result.amount_in == 0 || result.amount_out == 0 {
            return Err(DlmmError::AmountZero);
        }

        Ok(SwapPlan {
            result,
            active_id,
            v_parameters,
            mutations,
        })
    }

    fn apply_swap_plan(&mut self, plan: &SwapPlan, a2b: bool) -> Result<()> {
        for step in &plan.mutations {
            let bin = self
                .bins
                .get_mut(step.bin_id)
                .expect("planned bins stay present");
            bin.apply_swap(&step.outcome, a2b)?;
            if step.lp_fee_growth > 0 {
                bin.credit_fee_growth(a2b, step.lp_fee_growth);
            }
            let sink = if a2b {
                &mut self.protocol_fee_a
            } else {
                &mut self.protocol_fee_b
            };
            *sink = sink
                .checked_add(step.outcome.protocol_fee)
                .ok_or(DlmmError::AmountOverflow)?;
        }
        Ok(())
    }

    // ========================================================================
    // Position lifecycle
    // ========================================================================

    /// Opens an empty position and issues the certificate that must be
    /// repaid once the position is funded.
    pub fn open_position(
        &mut self,
        lower_bin_id: i32,
        width: u16,
        active_included: bool,
    ) -> Result<(Position, OpenCert)> {
        self.ensure_unlocked(OperationKind::AddLiquidity)?;
        let mut position = Position::new(self.id, lower_bin_id, width)?;
        position.flash_count = 1;
        self.active_open_positions = self
            .active_open_positions
            .checked_add(1)
            .ok_or(DlmmError::InvalidInput)?;
        let cert = OpenCert {
            pool_id: self.id,
            active_included,
        };
        Ok((position, cert))
    }

    /// Deposits into the position's bins and issues the owed-amount
    /// certificate. Bins above the active id take only token A, bins
    /// below only token B; deposits into the active bin pay a
    /// composition fee on whatever portion crosses the price.
    pub fn add_liquidity(
        &mut self,
        position: &mut Position,
        bin_ids: &[i32],
        amounts_a: &[u64],
        amounts_b: &[u64],
        now: u64,
    ) -> Result<AddCert> {
        self.ensure_unlocked(OperationKind::AddLiquidity)?;
        self.check_position(position)?;
        if bin_ids.is_empty()
            || bin_ids.len() != amounts_a.len()
            || bin_ids.len() != amounts_b.len()
        {
            return Err(DlmmError::InvalidInput);
        }

        // Validate before any mutation.
        let mut total_a: u64 = 0;
        let mut total_b: u64 = 0;
        for (index, &bin_id) in bin_ids.iter().enumerate() {
            check_bin_id(bin_id)?;
            if !position.contains(bin_id) {
                return Err(DlmmError::InvalidInput);
            }
            let (amount_a, amount_b) = (amounts_a[index], amounts_b[index]);
            if bin_id > self.active_id && amount_b != 0 {
                return Err(DlmmError::InvalidInput);
            }
            if bin_id < self.active_id && amount_a != 0 {
                return Err(DlmmError::InvalidInput);
            }
            total_a = total_a.checked_add(amount_a).ok_or(DlmmError::AmountOverflow)?;
            total_b = total_b.checked_add(amount_b).ok_or(DlmmError::AmountOverflow)?;
        }
        if total_a == 0 && total_b == 0 {
            return Err(DlmmError::AmountZero);
        }

        self.settle_rewards(now)?;
        self.settle_position(position)?;

        let (fee_rate, _) = self.v_parameters.total_fee_rate(self.base_fee_rate)?;
        let protocol_fee_rate = self.v_parameters.bin_step_config.protocol_fee_rate;
        let bin_step = self.bin_step();
        let reward_slots = self.rewards.slot_count();

        for (index, &bin_id) in bin_ids.iter().enumerate() {
            let (mut amount_a, mut amount_b) = (amounts_a[index], amounts_b[index]);
            if amount_a == 0 && amount_b == 0 {
                continue;
            }

            let is_active = bin_id == self.active_id;
            let bin = self.bins.get_or_insert_with(bin_id, || {
                let price = price_math::price_from_id(bin_id, bin_step)?;
                Ok(Bin::new(bin_id, price))
            })?;

            if is_active {
                let (fee_a, fee_b) = active_bin_composition_fees(bin, amount_a, amount_b, fee_rate)?;
                if fee_a > 0 {
                    let protocol = fee_inclusive(fee_a, protocol_fee_rate)?;
                    let lp_fee = fee_a - protocol;
                    if lp_fee > 0 {
                        bin.credit_fee_growth(true, growth_from_amount(lp_fee, bin.liquidity_supply)?);
                    }
                    self.protocol_fee_a = self
                        .protocol_fee_a
                        .checked_add(protocol)
                        .ok_or(DlmmError::AmountOverflow)?;
                    amount_a -= fee_a;
                }
                if fee_b > 0 {
                    let protocol = fee_inclusive(fee_b, protocol_fee_rate)?;
                    let lp_fee = fee_b - protocol;
                    if lp_fee > 0 {
                        bin.credit_fee_growth(false, growth_from_amount(lp_fee, bin.liquidity_supply)?);
                    }
                    self.protocol_fee_b = self
                        .protocol_fee_b
                        .checked_add(protocol)
                        .ok_or(DlmmError::AmountOverflow)?;
                    amount_b -= fee_b;
                }
            }

            let stat_index = position
                .stat_index(bin_id)
                .expect("membership validated above");
            // Re-snapshot after the composition-fee credit so the new
            // shares do not claim it.
            let bin = self.bins.get(bin_id).expect("created above");
            position.settle_bin(stat_index, bin, reward_slots)?;

            let bin = self.bins.get_mut(bin_id).expect("created above");
            let minted = bin.deposit(amount_a, amount_b)?;
            position.stats[stat_index].liquidity_share = position.stats[stat_index]
                .liquidity_share
                .checked_add(minted)
                .ok_or(DlmmError::LiquidityOverflow)?;
        }

        position.flash_count = position
            .flash_count
            .checked_add(1)
            .ok_or(DlmmError::InvalidInput)?;
        self.active_open_positions = self
            .active_open_positions
            .checked_add(1)
            .ok_or(DlmmError::InvalidInput)?;

        debug!(total_a, total_b, bins = bin_ids.len(), "liquidity staged");
        Ok(AddCert {
            pool_id: self.id,
            total_a,
            total_b,
        })
    }

    /// Settles an open certificate. An `active_included` open requires
    /// the active bin to be funded by now.
    pub fn repay_open(
        &mut self,
        position: &mut Position,
        cert: OpenCert,
        balance_a: Balance,
        balance_b: Balance,
    ) -> Result<()> {
        if cert.pool_id != self.id {
            return Err(DlmmError::PositionMismatch);
        }
        self.check_position(position)?;
        self.check_pair(&balance_a, &balance_b)?;
        if balance_a.amount != 0 || balance_b.amount != 0 {
            return Err(DlmmError::CertAmountMismatch);
        }
        if cert.active_included && position.share_at(self.active_id) == 0 {
            return Err(DlmmError::ActiveIdExpected);
        }
        self.release_flash(position)
    }

    /// Settles an add certificate; the balances must equal the owed
    /// totals exactly.
    pub fn repay_add(
        &mut self,
        position: &mut Position,
        cert: AddCert,
        balance_a: Balance,
        balance_b: Balance,
    ) -> Result<()> {
        if cert.pool_id != self.id {
            return Err(DlmmError::PositionMismatch);
        }
        self.check_position(position)?;
        self.check_pair(&balance_a, &balance_b)?;
        if balance_a.amount != cert.total_a || balance_b.amount != cert.total_b {
            return Err(DlmmError::CertAmountMismatch);
        }
        self.release_flash(position)
    }

    /// Burns shares across the listed bins and pays out the inventory.
    pub fn remove_liquidity(
        &mut self,
        position: &mut Position,
        bin_ids: &[i32],
        shares: &[u128],
        now: u64,
    ) -> Result<(Balance, Balance)> {
        self.ensure_unlocked(OperationKind::RemoveLiquidity)?;
        self.check_position(position)?;
        self.ensure_no_flash(position)?;
        if bin_ids.is_empty() || bin_ids.len() != shares.len() {
            return Err(DlmmError::InvalidInput);
        }
        for (index, &bin_id) in bin_ids.iter().enumerate() {
            if bin_ids[..index].contains(&bin_id) {
                return Err(DlmmError::InvalidInput);
            }
            if position.share_at(bin_id) < shares[index] {
                return Err(DlmmError::LiquidityUnderflow);
            }
            if shares[index] > 0 && !self.bins.contains(bin_id) {
                return Err(DlmmError::BinMissing);
            }
        }

        self.settle_rewards(now)?;
        self.settle_position(position)?;

        let mut total_a: u64 = 0;
        let mut total_b: u64 = 0;
        for (index, &bin_id) in bin_ids.iter().enumerate() {
            let share = shares[index];
            if share == 0 {
                continue;
            }
            let bin = self.bins.get_mut(bin_id).expect("validated above");
            let (out_a, out_b) = bin.withdraw(share)?;
            if bin.is_empty() {
                self.bins.remove(bin_id)?;
            }
            let stat_index = position.stat_index(bin_id).expect("validated above");
            position.stats[stat_index].liquidity_share -= share;
            total_a = total_a.checked_add(out_a).ok_or(DlmmError::AmountOverflow)?;
            total_b = total_b.checked_add(out_b).ok_or(DlmmError::AmountOverflow)?;
        }

        debug!(total_a, total_b, bins = bin_ids.len(), "liquidity removed");
        Ok((
            Balance::new(self.token_a.clone(), total_a),
            Balance::new(self.token_b.clone(), total_b),
        ))
    }

    /// Removes a basis-point share of every bin held inside `[min_id,
    /// max_id]`.
    pub fn remove_by_percent(
        &mut self,
        position: &mut Position,
        min_id: i32,
        max_id: i32,
        percent_bp: u16,
        now: u64,
    ) -> Result<(Balance, Balance)> {
        if percent_bp == 0 || percent_bp > 10_000 || min_id > max_id {
            return Err(DlmmError::InvalidInput);
        }

        let mut bin_ids = Vec::new();
        let mut shares = Vec::new();
        for stat in &position.stats {
            if stat.bin_id < min_id || stat.bin_id > max_id || stat.liquidity_share == 0 {
                continue;
            }
            let share = mul_div(
                stat.liquidity_share,
                percent_bp as u128,
                10_000,
                Rounding::Down,
            )?;
            if share > 0 {
                bin_ids.push(stat.bin_id);
                shares.push(share);
            }
        }
        if bin_ids.is_empty() {
            return Err(DlmmError::AmountZero);
        }
        self.remove_liquidity(position, &bin_ids, &shares, now)
    }

    /// Settles and drains the position's fee balances.
    pub fn collect_fees(&mut self, position: &mut Position, now: u64) -> Result<(Balance, Balance)> {
        self.ensure_unlocked(OperationKind::CollectFee)?;
        self.check_position(position)?;
        self.ensure_no_flash(position)?;

        self.settle_rewards(now)?;
        self.settle_position(position)?;

        let (fee_a, fee_b) = position.take_fees();
        Ok((
            Balance::new(self.token_a.clone(), fee_a),
            Balance::new(self.token_b.clone(), fee_b),
        ))
    }

    /// Settles and pays out one reward token from the vault.
    pub fn collect_reward(
        &mut self,
        position: &mut Position,
        token: &TokenTag,
        now: u64,
    ) -> Result<Balance> {
        self.ensure_unlocked(OperationKind::CollectReward)?;
        self.check_position(position)?;
        self.ensure_no_flash(position)?;
        let slot = self
            .rewards
            .slot_index(token)
            .ok_or(DlmmError::RewardMissing)?;

        self.settle_rewards(now)?;
        self.settle_position(position)?;

        let amount = position.take_reward(slot);
        self.rewards.harvest(token, amount)
    }

    /// Removes everything, folds fees into the returned balances, and
    /// moves rewards into a certificate drained one token at a time.
    /// The cleared position is destroyed by its own `destroy`.
    pub fn close_position(
        &mut self,
        position: &mut Position,
        now: u64,
    ) -> Result<(ClosePositionCert, Balance, Balance)> {
        self.ensure_unlocked(OperationKind::RemoveLiquidity)?;
        self.check_position(position)?;
        self.ensure_no_flash(position)?;

        self.settle_rewards(now)?;
        self.settle_position(position)?;

        let mut total_a: u64 = 0;
        let mut total_b: u64 = 0;
        for index in 0..position.stats.len() {
            let share = position.stats[index].liquidity_share;
            if share == 0 {
                continue;
            }
            let bin_id = position.stats[index].bin_id;
            let bin = self.bins.get_mut(bin_id).ok_or(DlmmError::BinMissing)?;
            let (out_a, out_b) = bin.withdraw(share)?;
            if bin.is_empty() {
                self.bins.remove(bin_id)?;
            }
            position.stats[index].liquidity_share = 0;
            total_a = total_a.checked_add(out_a).ok_or(DlmmError::AmountOverflow)?;
            total_b = total_b.checked_add(out_b).ok_or(DlmmError::AmountOverflow)?;
        }

        let (fee_a, fee_b) = position.take_fees();
        total_a = total_a.checked_add(fee_a).ok_or(DlmmError::AmountOverflow)?;
        total_b = total_b.checked_add(fee_b).ok_or(DlmmError::AmountOverflow)?;

        let mut rewards = Vec::new();
        for slot in 0..self.rewards.slot_count() {
            let amount = position.take_reward(slot);
            if amount > 0 {
                rewards.push((self.rewards.slots[slot].token.clone(), amount));
            }
        }

        debug!(total_a, total_b, rewards = rewards.len(), "position closed");
        Ok((
            ClosePositionCert {
                pool_id: self.id,
                rewards,
            },
            Balance::new(self.token_a.clone(), total_a),
            Balance::new(self.token_b.clone(), total_b),
        ))
    }

    /// Pays one reward token out of a close certificate.
    pub fn take_close_reward(
        &mut self,
        cert: &mut ClosePositionCert,
        token: &TokenTag,
    ) -> Result<Balance> {
        if cert.pool_id != self.id {
            return Err(DlmmError::PositionMismatch);
        }
        let amount = cert.take(token).ok_or(DlmmError::RewardMissing)?;
        self.rewards.harvest(token, amount)
    }

    /// Settles the position and reports its current holdings.
    pub fn refresh_position_info(
        &mut self,
        position: &mut Position,
        now: u64,
    ) -> Result<PositionInfo> {
        self.check_position(position)?;
        self.settle_rewards(now)?;
        self.settle_position(position)?;
        self.project_position(position, self.active_id)
    }

    /// What-if projection of the position as if `expected_active_id`
    /// were the active bin: bins above it are valued all-in-A, bins
    /// below all-in-B. Mutates nothing.
    pub fn refresh_position_info_v2(
        &self,
        position: &Position,
        expected_active_id: i32,
    ) -> Result<PositionInfo> {
        self.check_position(position)?;
        check_bin_id(expected_active_id)?;
        self.project_position(position, expected_active_id)
    }

    fn project_position(&self, position: &Position, active_id: i32) -> Result<PositionInfo> {
        let mut info = PositionInfo {
            fee_a: position.fee_owed_a,
            fee_b: position.fee_owed_b,
            rewards: position.rewards_owed.clone(),
            ..Default::default()
        };

        for stat in &position.stats {
            if stat.liquidity_share == 0 {
                continue;
            }
            let bin = self.bins.get(stat.bin_id).ok_or(DlmmError::BinMissing)?;
            let (held_a, held_b) = lattice_math::amounts_from_liquidity(
                bin.amount_a,
                bin.amount_b,
                stat.liquidity_share,
                bin.liquidity_supply,
            )?;

            let (amount_a, amount_b) = if stat.bin_id > active_id {
                let converted = amount_out_from_in(held_b, bin.price, false)?;
                (
                    held_a.checked_add(converted).ok_or(DlmmError::AmountOverflow)?,
                    0,
                )
            } else if stat.bin_id < active_id {
                let converted = amount_out_from_in(held_a, bin.price, true)?;
                (
                    0,
                    held_b.checked_add(converted).ok_or(DlmmError::AmountOverflow)?,
                )
            } else {
                (held_a, held_b)
            };

            info.amount_a = info
                .amount_a
                .checked_add(amount_a)
                .ok_or(DlmmError::AmountOverflow)?;
            info.amount_b = info
                .amount_b
                .checked_add(amount_b)
                .ok_or(DlmmError::AmountOverflow)?;
        }
        Ok(info)
    }

    // ========================================================================
    // Rewards
    // ========================================================================

    pub fn initialize_reward(
        &mut self,
        token: TokenTag,
        privileged: bool,
        now: u64,
    ) -> Result<usize> {
        self.settle_rewards(now)?;
        self.rewards.initialize(token, privileged)
    }

    pub fn add_reward(
        &mut self,
        token: &TokenTag,
        amount: u64,
        start: Option<u64>,
        end: u64,
        now: u64,
    ) -> Result<()> {
        self.ensure_unlocked(OperationKind::AddReward)?;
        self.settle_rewards(now)?;
        self.rewards.add_reward(token, amount, start, end, now)
    }

    /// Returns emissions that accrued while the active bin was empty.
    pub fn withdraw_refunded_reward(&mut self, token: &TokenTag, now: u64) -> Result<Balance> {
        self.settle_rewards(now)?;
        self.rewards.withdraw_refunded(token)
    }

    // ========================================================================
    // Admin
    // ========================================================================

    pub fn update_base_fee_rate(&mut self, base_fee_rate: u64) -> Result<()> {
        if base_fee_rate >= FEE_PRECISION {
            return Err(DlmmError::FeeRateInvalid);
        }
        self.base_fee_rate = base_fee_rate;
        debug!(base_fee_rate, "base fee updated");
        Ok(())
    }

    pub fn collect_protocol_fees(&mut self) -> (Balance, Balance) {
        let fee_a = std::mem::take(&mut self.protocol_fee_a);
        let fee_b = std::mem::take(&mut self.protocol_fee_b);
        (
            Balance::new(self.token_a.clone(), fee_a),
            Balance::new(self.token_b.clone(), fee_b),
        )
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn unpause(&mut self) {
        self.paused = false;
    }

    /// Disables or re-enables one operation kind; reserved kinds are
    /// rejected.
    pub fn set_permission(&mut self, kind: OperationKind, disabled: bool) -> Result<()> {
        self.permissions.set(kind, disabled)
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn ensure_unlocked(&self, kind: OperationKind) -> Result<()> {
        if self.paused || !self.permissions.allows(kind) {
            return Err(DlmmError::OpsBlocked);
        }
        Ok(())
    }

    fn check_position(&self, position: &Position) -> Result<()> {
        if position.pool_id != self.id {
            return Err(DlmmError::PositionMismatch);
        }
        Ok(())
    }

    fn check_pair(&self, balance_a: &Balance, balance_b: &Balance) -> Result<()> {
        if balance_a.token != self.token_a || balance_b.token != self.token_b {
            return Err(DlmmError::InvalidInput);
        }
        Ok(())
    }

    fn ensure_no_flash(&self, position: &Position) -> Result<()> {
        if position.flash_count > 0 {
            return Err(DlmmError::OpsBlocked);
        }
        Ok(())
    }

    fn release_flash(&mut self, position: &mut Position) -> Result<()> {
        position.flash_count = position
            .flash_count
            .checked_sub(1)
            .ok_or(DlmmError::InvalidInput)?;
        self.active_open_positions = self
            .active_open_positions
            .checked_sub(1)
            .ok_or(DlmmError::InvalidInput)?;
        Ok(())
    }

    fn settle_rewards(&mut self, now: u64) -> Result<()> {
        let active = self.bins.get_mut(self.active_id);
        self.rewards.settle(active, now)
    }

    fn settle_position(&mut self, position: &mut Position) -> Result<()> {
        let reward_slots = self.rewards.slot_count();
        for index in 0..position.stats.len() {
            let bin_id = position.stats[index].bin_id;
            if let Some(bin) = self.bins.get(bin_id) {
                position.settle_bin(index, bin, reward_slots)?;
            }
        }
        Ok(())
    }
}

/// Composition fees for a deposit into the active bin.
///
/// The deposit is compared against the bin's current composition; the
/// side exceeding its proportional share is the portion that crosses the
/// price and pays the fee. An empty active bin has no composition to
/// cross and charges nothing.
fn active_bin_composition_fees(
    bin: &Bin,
    amount_a: u64,
    amount_b: u64,
    fee_rate: u64,
) -> Result<(u64, u64)> {
    if bin.liquidity_supply == 0 {
        return Ok((0, 0));
    }
    let in_liquidity = liquidity_from_amounts(amount_a, amount_b, bin.price)
        .map_err(|_| DlmmError::LiquidityOverflow)?;
    if in_liquidity == 0 {
        return Ok((0, 0));
    }

    let bin_a_liquidity = liquidity_from_amounts(bin.amount_a, 0, bin.price)
        .map_err(|_| DlmmError::LiquidityOverflow)?;
    let deposit_a_liquidity = liquidity_from_amounts(amount_a, 0, bin.price)
        .map_err(|_| DlmmError::LiquidityOverflow)?;

    let target_a_liquidity = mul_div(
        in_liquidity,
        bin_a_liquidity,
        bin.liquidity_supply,
        Rounding::Down,
    )?;

    if deposit_a_liquidity > target_a_liquidity {
        let excess = (deposit_a_liquidity - target_a_liquidity) / bin.price;
        let excess = u64::try_from(excess).map_err(|_| DlmmError::AmountOverflow)?;
        let fee = lattice_math::composition_fee(excess, fee_rate)?;
        Ok((fee, 0))
    } else {
        let target_b_liquidity = in_liquidity - target_a_liquidity;
        let deposit_b_liquidity = (amount_b as u128) << 64;
        if deposit_b_liquidity > target_b_liquidity {
            let excess = ((deposit_b_liquidity - target_b_liquidity) >> 64) as u64;
            let fee = lattice_math::composition_fee(excess, fee_rate)?;
            Ok((0, fee))
        } else {
            Ok((0, 0))
        }
    }
}
