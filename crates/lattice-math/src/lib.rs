//! # Lattice Math
//!
//! Pure math for the lattice DLMM engine: Q64.64 fixed-point price
//! formation, full-precision mul/div, and the per-bin swap, fee and
//! growth conversions. This crate holds no state and performs no I/O;
//! every function is deterministic over its arguments.

pub mod dlmm_math;
pub mod full_math;
pub mod price_math;

use thiserror::Error;

/// Fee rates are expressed in billionths (10^-9).
pub const FEE_PRECISION: u64 = 1_000_000_000;

/// Hard cap on any total fee rate: 10%.
pub const MAX_FEE_RATE: u64 = 100_000_000;

/// Basis-point denominator (10,000 = 100%).
pub const BASIS_POINT_MAX: u32 = 10_000;

/// Rounding mode for full-precision division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Up,
    Down,
}

/// Errors raised by the math layer. The engine maps these onto its own
/// error kinds at the call site, where the operand context is known.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("intermediate value exceeds 128 bits")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("price argument is zero")]
    PriceZero,

    #[error("fee rate exceeds precision")]
    FeeRateExceeded,

    #[error("exponentiation collapsed to zero")]
    ZeroResult,

    #[error("exponent out of range")]
    ExponentOutOfRange,
}

/// Result type for math operations.
pub type MathResult<T> = Result<T, MathError>;

pub use dlmm_math::{
    amount_from_growth, amount_in_from_out, amount_out_from_in, amounts_from_liquidity,
    composition_fee, fee_exclusive, fee_inclusive, growth_from_amount, liquidity_from_amounts,
};
pub use full_math::mul_div;
pub use price_math::{pow, price_from_id, ONE, MAX_BIN_ID, MIN_BIN_ID, SCALE_OFFSET};
