//! # Full-Precision Math
//!
//! 256-bit intermediates for products of 128-bit operands.

use ruint::aliases::U256;

use crate::{MathError, MathResult, Rounding};

/// Computes `(x * y) / denominator` with the requested rounding strategy,
/// widening through 256 bits so the product cannot overflow.
pub fn mul_div(x: u128, y: u128, denominator: u128, rounding: Rounding) -> MathResult<u128> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }

    let x = U256::from(x);
    let y = U256::from(y);
    let denominator = U256::from(denominator);

    let prod = x.checked_mul(y).ok_or(MathError::Overflow)?;

    let quotient = match rounding {
        Rounding::Up => prod.div_ceil(denominator),
        Rounding::Down => {
            let (quotient, _) = prod.div_rem(denominator);
            quotient
        }
    };

    quotient.try_into().map_err(|_| MathError::Overflow)
}

/// `(x * y) >> shift`, widened through 256 bits.
pub fn mul_shr(x: u128, y: u128, shift: u8) -> MathResult<u128> {
    let prod = U256::from(x)
        .checked_mul(U256::from(y))
        .ok_or(MathError::Overflow)?;
    (prod >> shift).try_into().map_err(|_| MathError::Overflow)
}
