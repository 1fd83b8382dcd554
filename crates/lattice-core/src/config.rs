//! # Fee Configuration and Dynamic-Fee State
//!
//! `BinStepConfig` carries the immutable per-step parameters;
//! `VariableParameters` is the volatility state machine that turns bin
//! crossings into a variable fee surcharge.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BASIS_POINT_MAX, FEE_PRECISION, MAX_BIN_STEP, MAX_FEE_RATE, MAX_PROTOCOL_FEE_RATE,
};
use crate::error::{DlmmError, Result};

/// Immutable configuration for one bin-step tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinStepConfig {
    /// Price ratio between adjacent bins, in ten-thousandths.
    pub bin_step: u16,
    /// Scales the initial base fee for this tier.
    pub base_factor: u16,
    /// Seconds below which reference updates are filtered out.
    pub filter_period: u16,
    /// Seconds past which accumulated volatility fully decays.
    pub decay_period: u16,
    /// Retained share of the accumulator on partial decay, in bps.
    pub reduction_factor: u16,
    /// Scales the squared volatility term of the variable fee.
    pub variable_fee_control: u32,
    /// Upper bound on the volatility accumulator.
    pub max_volatility_accumulator: u32,
    /// Protocol share of every fee, in 10^-9 units.
    pub protocol_fee_rate: u64,
}

impl BinStepConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bin_step: u16,
        base_factor: u16,
        filter_period: u16,
        decay_period: u16,
        reduction_factor: u16,
        variable_fee_control: u32,
        max_volatility_accumulator: u32,
        protocol_fee_rate: u64,
    ) -> Result<Self> {
        let config = Self {
            bin_step,
            base_factor,
            filter_period,
            decay_period,
            reduction_factor,
            variable_fee_control,
            max_volatility_accumulator,
            protocol_fee_rate,
        };
        config.validate()?;
        Ok(config)
    }

    /// Standard dynamic-fee parameters for a step tier.
    ///
    /// Tighter steps see more crossings per unit of price movement, so
    /// they decay faster and cap the accumulator lower.
    pub fn preset(bin_step: u16, base_factor: u16) -> Result<Self> {
        let (filter_period, decay_period, reduction_factor) = if bin_step <= 10 {
            (10, 120, 5000)
        } else if bin_step <= 100 {
            (30, 600, 5000)
        } else {
            (120, 1200, 5000)
        };
        Self::new(
            bin_step,
            base_factor,
            filter_period,
            decay_period,
            reduction_factor,
            40_000,
            350_000,
            100_000_000,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.bin_step == 0 || self.bin_step > MAX_BIN_STEP {
            return Err(DlmmError::InvalidInput);
        }
        if self.reduction_factor as u32 > BASIS_POINT_MAX {
            return Err(DlmmError::InvalidInput);
        }
        if self.protocol_fee_rate > MAX_PROTOCOL_FEE_RATE {
            return Err(DlmmError::FeeRateInvalid);
        }
        Ok(())
    }

    /// Initial base fee rate for a pool on this tier, in 10^-9 units.
    pub fn initial_base_fee_rate(&self) -> u64 {
        (self.base_factor as u64) * (self.bin_step as u64) * 10
    }
}

/// Volatility state advanced once per swap and on every bin crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableParameters {
    pub volatility_accumulator: u32,
    pub volatility_reference: u32,
    pub index_reference: i32,
    pub last_update_timestamp: u64,
    pub bin_step_config: BinStepConfig,
}

impl VariableParameters {
    pub fn new(bin_step_config: BinStepConfig, index_reference: i32, now: u64) -> Self {
        Self {
            volatility_accumulator: 0,
            volatility_reference: 0,
            index_reference,
            last_update_timestamp: now,
            bin_step_config,
        }
    }

    /// Pre-swap reference update.
    ///
    /// Once `filter_period` has elapsed the index reference snaps to the
    /// active bin and the accumulated volatility either decays by
    /// `reduction_factor` or, past `decay_period`, resets entirely.
    pub fn update_references(&mut self, active_id: i32, now: u64) -> Result<()> {
        let last = self.last_update_timestamp;
        if now <= last {
            return Ok(());
        }

        let elapsed = now - last;
        let config = &self.bin_step_config;

        if elapsed >= config.filter_period as u64 {
            self.index_reference = active_id;

            if elapsed < config.decay_period as u64 {
                let scaled = (self.volatility_accumulator as u64)
                    .checked_mul(config.reduction_factor as u64)
                    .ok_or(DlmmError::AmountOverflow)?
                    / BASIS_POINT_MAX as u64;
                self.volatility_reference = scaled as u32;
            } else {
                self.volatility_reference = 0;
            }
        }

        Ok(())
    }

    /// Folds an active-id move into the accumulator, capped by config.
    pub fn update_volatility_accumulator(&mut self, active_id: i32) -> Result<()> {
        let config = &self.bin_step_config;
        let delta_id = (self.index_reference as i64 - active_id as i64).unsigned_abs();

        let accumulator = (self.volatility_reference as u64)
            .checked_add(
                delta_id
                    .checked_mul(BASIS_POINT_MAX as u64)
                    .ok_or(DlmmError::AmountOverflow)?,
            )
            .ok_or(DlmmError::AmountOverflow)?;

        self.volatility_accumulator = accumulator.min(config.max_volatility_accumulator as u64) as u32;
        Ok(())
    }

    /// Variable fee rate for the current accumulator, in 10^-9 units.
    ///
    /// `rate = ceil(control * (accumulator * bin_step)^2 / 10^11)`.
    pub fn variable_fee_rate(&self) -> Result<u64> {
        let config = &self.bin_step_config;
        if config.variable_fee_control == 0 {
            return Ok(0);
        }

        let combined = (self.volatility_accumulator as u128)
            .checked_mul(config.bin_step as u128)
            .ok_or(DlmmError::AmountOverflow)?;
        let square = combined.checked_mul(combined).ok_or(DlmmError::AmountOverflow)?;
        let v_fee = (config.variable_fee_control as u128)
            .checked_mul(square)
            .ok_or(DlmmError::AmountOverflow)?;

        let scaled = v_fee
            .checked_add(99_999_999_999)
            .ok_or(DlmmError::AmountOverflow)?
            / 100_000_000_000;
        Ok(scaled as u64)
    }

    /// Total fee rate: base plus variable, capped at 10%.
    pub fn total_fee_rate(&self, base_fee_rate: u64) -> Result<(u64, u64)> {
        let variable = self.variable_fee_rate()?;
        let total = (base_fee_rate as u128)
            .checked_add(variable as u128)
            .ok_or(DlmmError::FeeRateInvalid)?;
        let capped = total.min(MAX_FEE_RATE as u128) as u64;
        Ok((capped, variable))
    }

    /// Marks the swap finished at `now`.
    pub fn finish_swap(&mut self, now: u64) {
        self.last_update_timestamp = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BinStepConfig {
        BinStepConfig::new(25, 1, 60, 600, 9000, 0, 1_000_000, 30_000).unwrap()
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(BinStepConfig::new(0, 1, 60, 600, 9000, 0, 1, 0).is_err());
        assert!(BinStepConfig::new(1001, 1, 60, 600, 9000, 0, 1, 0).is_err());
        assert_eq!(
            BinStepConfig::new(25, 1, 60, 600, 9000, 0, 1, 300_000_001),
            Err(DlmmError::FeeRateInvalid)
        );
    }

    #[test]
    fn initial_base_fee_scales_with_factor() {
        assert_eq!(config().initial_base_fee_rate(), 250);
        let wide = BinStepConfig::preset(100, 20).unwrap();
        assert_eq!(wide.initial_base_fee_rate(), 20_000);
    }

    #[test]
    fn references_filter_and_decay() {
        let mut params = VariableParameters::new(config(), 0, 1000);
        params.volatility_accumulator = 10_000;

        // Below the filter period nothing moves.
        params.update_references(5, 1030).unwrap();
        assert_eq!(params.index_reference, 0);
        assert_eq!(params.volatility_reference, 0);

        // Between filter and decay the accumulator is scaled down.
        params.update_references(5, 1100).unwrap();
        assert_eq!(params.index_reference, 5);
        assert_eq!(params.volatility_reference, 9000);

        // Past the decay period the reference resets.
        params.volatility_accumulator = 10_000;
        params.last_update_timestamp = 1100;
        params.update_references(7, 2000).unwrap();
        assert_eq!(params.index_reference, 7);
        assert_eq!(params.volatility_reference, 0);
    }

    #[test]
    fn accumulator_tracks_crossings_and_caps() {
        let mut params = VariableParameters::new(config(), 0, 0);
        params.update_volatility_accumulator(3).unwrap();
        assert_eq!(params.volatility_accumulator, 30_000);

        params.volatility_reference = 5000;
        params.update_volatility_accumulator(-2).unwrap();
        assert_eq!(params.volatility_accumulator, 25_000);

        params.update_volatility_accumulator(500).unwrap();
        assert_eq!(params.volatility_accumulator, 1_000_000);
    }

    #[test]
    fn variable_fee_is_quadratic_in_volatility() {
        let config = BinStepConfig::new(25, 1, 60, 600, 9000, 40_000, 1_000_000, 0).unwrap();
        let mut params = VariableParameters::new(config, 0, 0);
        assert_eq!(params.variable_fee_rate().unwrap(), 0);

        params.volatility_accumulator = 10_000;
        // ceil(40_000 * (10_000 * 25)^2 / 1e11) = 25_000
        assert_eq!(params.variable_fee_rate().unwrap(), 25_000);

        let (total, variable) = params.total_fee_rate(FEE_PRECISION / 2).unwrap();
        assert_eq!(variable, 25_000);
        assert_eq!(total, MAX_FEE_RATE);
    }
}
