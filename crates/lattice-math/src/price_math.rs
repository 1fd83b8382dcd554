//! # Price Math
//!
//! Bin-id to price conversion. A bin's price is `(1 + bin_step/10000)^id`
//! in Q64.64, computed by binary exponentiation over the 19 exponent bits
//! the id range can occupy.

use crate::{MathError, MathResult, BASIS_POINT_MAX};

/// Number of fractional bits in the Q64.64 representation.
pub const SCALE_OFFSET: u8 = 64;

/// 1.0 in Q64.64.
pub const ONE: u128 = 1u128 << SCALE_OFFSET;

/// Smallest valid bin id.
pub const MIN_BIN_ID: i32 = -443_636;

/// Largest valid bin id.
pub const MAX_BIN_ID: i32 = 443_636;

/// Exponent magnitude bound: 2^19 exceeds every valid bin id.
const MAX_EXPONENTIAL: u32 = 0x80000;

/// Raises a Q64.64 `base` to an integer power by binary exponentiation.
///
/// Bases at or above 1.0 are inverted first (`u128::MAX / base`) so that
/// every squaring stays below 2^128; the inversion flag folds the final
/// reciprocal back in. Negative exponents reuse the same flag.
pub fn pow(base: u128, exp: i32) -> MathResult<u128> {
    let mut invert = exp.is_negative();

    if exp == 0 {
        return Ok(ONE);
    }

    let exp = exp.unsigned_abs();
    if exp >= MAX_EXPONENTIAL {
        return Err(MathError::ExponentOutOfRange);
    }

    let mut squared_base = base;
    let mut result = ONE;

    if squared_base >= result {
        squared_base = u128::MAX
            .checked_div(squared_base)
            .ok_or(MathError::DivisionByZero)?;
        invert = !invert;
    }

    for bit in 0..19u32 {
        if exp & (1 << bit) != 0 {
            result = result
                .checked_mul(squared_base)
                .ok_or(MathError::Overflow)?
                >> SCALE_OFFSET;
        }
        if bit < 18 {
            squared_base = squared_base
                .checked_mul(squared_base)
                .ok_or(MathError::Overflow)?
                >> SCALE_OFFSET;
        }
    }

    if result == 0 {
        return Err(MathError::ZeroResult);
    }

    if invert {
        result = u128::MAX
            .checked_div(result)
            .ok_or(MathError::DivisionByZero)?;
    }

    Ok(result)
}

/// Q64.64 price of the bin at `id` for the given step.
///
/// `price = (1 + bin_step/10000)^id`. The id must already be validated
/// against [`MIN_BIN_ID`]/[`MAX_BIN_ID`] by the caller.
pub fn price_from_id(id: i32, bin_step: u16) -> MathResult<u128> {
    let bps = ((bin_step as u128) << SCALE_OFFSET) / BASIS_POINT_MAX as u128;
    let base = ONE + bps;
    pow(base, id)
}

/// Whether `id` lies in the supported bin range.
pub fn is_valid_bin_id(id: i32) -> bool {
    (MIN_BIN_ID..=MAX_BIN_ID).contains(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow_identities() {
        assert_eq!(pow(ONE, 1).unwrap(), ONE);
        assert_eq!(pow(ONE, 0).unwrap(), ONE);
        assert_eq!(pow(ONE + 1000, 0).unwrap(), ONE);
    }

    #[test]
    fn price_at_id_zero_is_one() {
        assert_eq!(price_from_id(0, 25).unwrap(), ONE);
        assert_eq!(price_from_id(0, 1).unwrap(), ONE);
        assert_eq!(price_from_id(0, 1000).unwrap(), ONE);
    }

    #[test]
    fn price_is_monotonic_in_id() {
        let mut last = price_from_id(-50, 25).unwrap();
        for id in -49..=50 {
            let price = price_from_id(id, 25).unwrap();
            assert!(price > last, "price not increasing at id {id}");
            last = price;
        }
    }

    #[test]
    fn one_step_matches_ratio() {
        // (1 + 25/10000) in Q64.64
        let expected = ONE + ((25u128 << SCALE_OFFSET) / 10_000);
        assert_eq!(price_from_id(1, 25).unwrap(), expected);
    }

    #[test]
    fn inversion_identity() {
        // The full id range is only reachable at bin_step 1; larger steps
        // overflow Q64.64 long before the id bound.
        for id in [1, 10, 100, 1000, 10_000, 100_000, MAX_BIN_ID] {
            let up = price_from_id(id, 1).unwrap();
            let down = price_from_id(-id, 1).unwrap();
            // up * down should be ~ 2^128, i.e. (up * down) >> 64 ~ ONE.
            let product = crate::full_math::mul_shr(up, down, SCALE_OFFSET).unwrap();
            let diff = product.abs_diff(ONE);
            // The reciprocal trick concentrates truncation error at the
            // extremes; hold it below 2^-44 relative.
            assert!(diff <= 1 << 20, "id {id}: product off by {diff}");
        }
    }

    #[test]
    fn extreme_ids_stay_in_range() {
        assert!(price_from_id(MAX_BIN_ID, 1).is_ok());
        assert!(price_from_id(MIN_BIN_ID, 1).unwrap() > 0);
    }

    #[test]
    fn exponent_bound_enforced() {
        assert_eq!(pow(ONE + 1, 0x80000), Err(MathError::ExponentOutOfRange));
        assert_eq!(pow(ONE + 1, -0x80000), Err(MathError::ExponentOutOfRange));
    }
}
