//! # Bin
//!
//! A single price point: a two-asset inventory, the share supply minted
//! against it, and the fee/reward growth accumulators positions settle
//! from. Swap steps are computed against an immutable bin and applied
//! separately so a failed traversal never leaves a half-swapped store.

use serde::{Deserialize, Serialize};

use lattice_math::{
    amount_in_from_out, amount_out_from_in, fee_exclusive, fee_inclusive, liquidity_from_amounts,
    amounts_from_liquidity,
};

use crate::error::{DlmmError, Result};

/// One bin of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub id: i32,
    /// Q64.64 price, fixed for the bin's lifetime.
    pub price: u128,
    pub amount_a: u64,
    pub amount_b: u64,
    /// Total shares outstanding, in constant-sum Q64.64 units.
    pub liquidity_supply: u128,
    /// Q64.64 fee-per-share accumulators, monotonic.
    pub fee_a_growth_global: u128,
    pub fee_b_growth_global: u128,
    /// One Q64.64 accumulator per initialized reward slot.
    pub rewards_growth_global: Vec<u128>,
}

/// Amounts moved by one bin of a swap. `amount_in` is gross of fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinSwapOutcome {
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee: u64,
    pub protocol_fee: u64,
}

impl Bin {
    pub fn new(id: i32, price: u128) -> Self {
        Self {
            id,
            price,
            amount_a: 0,
            amount_b: 0,
            liquidity_supply: 0,
            fee_a_growth_global: 0,
            fee_b_growth_global: 0,
            rewards_growth_global: Vec::new(),
        }
    }

    /// Inventory available on the output side of a swap direction.
    pub fn available_out(&self, a2b: bool) -> u64 {
        if a2b {
            self.amount_b
        } else {
            self.amount_a
        }
    }

    pub fn is_empty(&self) -> bool {
        self.liquidity_supply == 0
    }

    /// One-bin exact-in step against the current inventory.
    ///
    /// When the net input would over-drain the bin, the step is re-priced
    /// from the drainable output: the input becomes what that output
    /// costs, and the fee is recovered on top of it so the returned fee
    /// stays consistent with the returned (gross) input.
    pub fn compute_swap_exact_in(
        &self,
        amount_in: u64,
        a2b: bool,
        fee_rate: u64,
        protocol_fee_rate: u64,
    ) -> Result<BinSwapOutcome> {
        let available = self.available_out(a2b);
        if available == 0 {
            return Ok(BinSwapOutcome::default());
        }

        let fee = fee_inclusive(amount_in, fee_rate)?;
        let net_in = amount_in - fee;
        let amount_out = amount_out_from_in(net_in, self.price, a2b)?;

        let (amount_in, amount_out, fee) = if amount_out <= available {
            (amount_in, amount_out, fee)
        } else {
            let in_without_fee = amount_in_from_out(available, self.price, a2b)?;
            let fee = fee_exclusive(in_without_fee, fee_rate)?;
            let in_with_fee = in_without_fee
                .checked_add(fee)
                .ok_or(DlmmError::AmountOverflow)?;
            if in_with_fee > amount_in {
                return Err(DlmmError::InvalidInput);
            }
            (in_with_fee, available, fee)
        };

        let protocol_fee = fee_inclusive(fee, protocol_fee_rate)?;
        Ok(BinSwapOutcome {
            amount_in,
            amount_out,
            fee,
            protocol_fee,
        })
    }

    /// One-bin exact-out step; the desired output is clamped to the
    /// drainable inventory and the fee recovered on top of the input.
    pub fn compute_swap_exact_out(
        &self,
        amount_out: u64,
        a2b: bool,
        fee_rate: u64,
        protocol_fee_rate: u64,
    ) -> Result<BinSwapOutcome> {
        let available = self.available_out(a2b);
        if available == 0 {
            return Ok(BinSwapOutcome::default());
        }

        let allowed_out = available.min(amount_out);
        let in_without_fee = amount_in_from_out(allowed_out, self.price, a2b)?;
        let fee = fee_exclusive(in_without_fee, fee_rate)?;
        let in_with_fee = in_without_fee
            .checked_add(fee)
            .ok_or(DlmmError::AmountOverflow)?;
        let protocol_fee = fee_inclusive(fee, protocol_fee_rate)?;

        Ok(BinSwapOutcome {
            amount_in: in_with_fee,
            amount_out: allowed_out,
            fee,
            protocol_fee,
        })
    }

    /// Applies a computed step: the net input joins the inventory, the
    /// output leaves it. Fees never enter bin inventory.
    pub fn apply_swap(&mut self, outcome: &BinSwapOutcome, a2b: bool) -> Result<()> {
        let net_in = outcome.amount_in - outcome.fee;
        if a2b {
            self.amount_a = self
                .amount_a
                .checked_add(net_in)
                .ok_or(DlmmError::AmountOverflow)?;
            self.amount_b = self
                .amount_b
                .checked_sub(outcome.amount_out)
                .ok_or(DlmmError::AmountOverflow)?;
        } else {
            self.amount_b = self
                .amount_b
                .checked_add(net_in)
                .ok_or(DlmmError::AmountOverflow)?;
            self.amount_a = self
                .amount_a
                .checked_sub(outcome.amount_out)
                .ok_or(DlmmError::AmountOverflow)?;
        }
        Ok(())
    }

    /// Mints shares for a deposit at the bin price.
    pub fn deposit(&mut self, amount_a: u64, amount_b: u64) -> Result<u128> {
        let delta = liquidity_from_amounts(amount_a, amount_b, self.price)
            .map_err(|_| DlmmError::LiquidityOverflow)?;
        self.amount_a = self
            .amount_a
            .checked_add(amount_a)
            .ok_or(DlmmError::AmountOverflow)?;
        self.amount_b = self
            .amount_b
            .checked_add(amount_b)
            .ok_or(DlmmError::AmountOverflow)?;
        self.liquidity_supply = self
            .liquidity_supply
            .checked_add(delta)
            .ok_or(DlmmError::LiquidityOverflow)?;
        Ok(delta)
    }

    /// Burns shares, paying out the proportional inventory (floored).
    pub fn withdraw(&mut self, share: u128) -> Result<(u64, u64)> {
        if share > self.liquidity_supply {
            return Err(DlmmError::LiquidityUnderflow);
        }
        let (out_a, out_b) =
            amounts_from_liquidity(self.amount_a, self.amount_b, share, self.liquidity_supply)?;
        self.amount_a -= out_a;
        self.amount_b -= out_b;
        self.liquidity_supply -= share;
        Ok((out_a, out_b))
    }

    pub fn credit_fee_growth(&mut self, a_side: bool, growth: u128) {
        if a_side {
            self.fee_a_growth_global = self.fee_a_growth_global.wrapping_add(growth);
        } else {
            self.fee_b_growth_global = self.fee_b_growth_global.wrapping_add(growth);
        }
    }

    /// Reward accumulator for a slot; bins created before the slot was
    /// initialized report zero.
    pub fn reward_growth(&self, slot: usize) -> u128 {
        self.rewards_growth_global.get(slot).copied().unwrap_or(0)
    }

    pub fn credit_reward_growth(&mut self, slot: usize, growth: u128) {
        if self.rewards_growth_global.len() <= slot {
            self.rewards_growth_global.resize(slot + 1, 0);
        }
        self.rewards_growth_global[slot] = self.rewards_growth_global[slot].wrapping_add(growth);
    }
}
