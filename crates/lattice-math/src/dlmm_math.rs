//! # DLMM Math
//!
//! Per-bin swap amounts, fee splits, composition fees and growth
//! conversions. Rounding is contractual throughout: anything owed to the
//! pool rounds up, anything owed from the pool rounds down.

use ruint::aliases::U256;

use crate::{
    full_math::mul_div, price_math::ONE, MathError, MathResult, Rounding, FEE_PRECISION,
    MAX_FEE_RATE,
};

/// `1 << 128` as a U256 constant.
const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

/// Output obtained for `amount_in` at a bin price, rounded down.
///
/// `a2b` sells token A into the bin: `out = floor(in * price / 2^64)`.
/// The reverse direction divides by the price instead.
pub fn amount_out_from_in(amount_in: u64, price: u128, a2b: bool) -> MathResult<u64> {
    if price == 0 {
        return Err(MathError::PriceZero);
    }
    if amount_in == 0 {
        return Ok(0);
    }
    let r = if a2b {
        mul_div(amount_in as u128, price, ONE, Rounding::Down)?
    } else {
        mul_div(amount_in as u128, ONE, price, Rounding::Down)?
    };
    if r > u64::MAX as u128 {
        return Err(MathError::Overflow);
    }
    Ok(r as u64)
}

/// Input required to obtain `amount_out` at a bin price, rounded up.
pub fn amount_in_from_out(amount_out: u64, price: u128, a2b: bool) -> MathResult<u64> {
    if price == 0 {
        return Err(MathError::PriceZero);
    }
    if amount_out == 0 {
        return Ok(0);
    }
    let r = if a2b {
        mul_div(amount_out as u128, ONE, price, Rounding::Up)?
    } else {
        mul_div(amount_out as u128, price, ONE, Rounding::Up)?
    };
    if r > u64::MAX as u128 {
        return Err(MathError::Overflow);
    }
    Ok(r as u64)
}

/// Fee contained in a gross amount: `ceil(amount * rate / 10^9)`.
pub fn fee_inclusive(amount: u64, fee_rate: u64) -> MathResult<u64> {
    if amount == 0 || fee_rate == 0 {
        return Ok(0);
    }
    if fee_rate > FEE_PRECISION {
        return Err(MathError::FeeRateExceeded);
    }
    let r = mul_div(
        amount as u128,
        fee_rate as u128,
        FEE_PRECISION as u128,
        Rounding::Up,
    )?;
    Ok(r as u64)
}

/// Fee to add on top of a net amount: `ceil(amount * rate / (10^9 - rate))`.
pub fn fee_exclusive(amount: u64, fee_rate: u64) -> MathResult<u64> {
    if amount == 0 || fee_rate == 0 {
        return Ok(0);
    }
    if fee_rate >= FEE_PRECISION {
        return Err(MathError::FeeRateExceeded);
    }
    let denominator = FEE_PRECISION as u128 - fee_rate as u128;
    let r = mul_div(amount as u128, fee_rate as u128, denominator, Rounding::Up)?;
    if r > u64::MAX as u128 {
        return Err(MathError::Overflow);
    }
    Ok(r as u64)
}

/// Fee charged on the portion of an active-bin deposit that crosses the
/// price: `floor(amount * rate * (10^9 + rate) / 10^18)`.
///
/// The quadratic term compensates for the fee itself being part of the
/// crossing amount. Rates above 10% are rejected, which also keeps the
/// result strictly below `amount`.
pub fn composition_fee(amount: u64, fee_rate: u64) -> MathResult<u64> {
    if amount == 0 || fee_rate == 0 {
        return Ok(0);
    }
    if fee_rate > MAX_FEE_RATE {
        return Err(MathError::FeeRateExceeded);
    }
    let numerator = U256::from(amount)
        .checked_mul(U256::from(fee_rate))
        .ok_or(MathError::Overflow)?
        .checked_mul(U256::from(FEE_PRECISION + fee_rate))
        .ok_or(MathError::Overflow)?;
    let denominator = U256::from(FEE_PRECISION)
        .checked_mul(U256::from(FEE_PRECISION))
        .ok_or(MathError::Overflow)?;
    let fee: u128 = (numerator / denominator)
        .try_into()
        .map_err(|_| MathError::Overflow)?;
    if fee >= amount as u128 {
        return Err(MathError::Overflow);
    }
    Ok(fee as u64)
}

/// Constant-sum liquidity for a pair of amounts at a bin price:
/// `price * amount_a + (amount_b << 64)`, exact in Q64.64.
pub fn liquidity_from_amounts(amount_a: u64, amount_b: u64, price: u128) -> MathResult<u128> {
    let from_a = U256::from(price)
        .checked_mul(U256::from(amount_a))
        .ok_or(MathError::Overflow)?;
    let from_b = U256::from(amount_b) << 64;
    let total = from_a.checked_add(from_b).ok_or(MathError::Overflow)?;
    total.try_into().map_err(|_| MathError::Overflow)
}

/// Proportional share of a bin's inventory for a liquidity delta,
/// rounded down on both sides.
pub fn amounts_from_liquidity(
    amount_a: u64,
    amount_b: u64,
    liquidity_delta: u128,
    liquidity_supply: u128,
) -> MathResult<(u64, u64)> {
    if liquidity_supply == 0 {
        return Err(MathError::DivisionByZero);
    }
    let out_a = mul_div(
        amount_a as u128,
        liquidity_delta,
        liquidity_supply,
        Rounding::Down,
    )?;
    let out_b = mul_div(
        amount_b as u128,
        liquidity_delta,
        liquidity_supply,
        Rounding::Down,
    )?;
    if out_a > u64::MAX as u128 || out_b > u64::MAX as u128 {
        return Err(MathError::Overflow);
    }
    Ok((out_a as u64, out_b as u64))
}

/// Q64.64 growth per unit of liquidity contributed by `amount`:
/// `floor(amount * 2^128 / liquidity)`.
pub fn growth_from_amount(amount: u64, liquidity: u128) -> MathResult<u128> {
    if liquidity == 0 {
        return Err(MathError::DivisionByZero);
    }
    let result = U256::from(amount)
        .checked_mul(Q128)
        .ok_or(MathError::Overflow)?
        .checked_div(U256::from(liquidity))
        .ok_or(MathError::DivisionByZero)?;
    result.try_into().map_err(|_| MathError::Overflow)
}

/// Amount owed for a growth delta over a share: `floor(delta * share / 2^128)`.
pub fn amount_from_growth(growth_delta: u128, liquidity: u128) -> MathResult<u64> {
    let result = U256::from(growth_delta)
        .checked_mul(U256::from(liquidity))
        .ok_or(MathError::Overflow)?
        / Q128;
    result.try_into().map_err(|_| MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_in_vectors() {
        assert_eq!(amount_in_from_out(0, 1 << 64, true).unwrap(), 0);
        assert_eq!(amount_in_from_out(1_000_000, 1 << 64, true).unwrap(), 1_000_000);
        assert_eq!(amount_in_from_out(1_000_000, (1 << 64) - 1, true).unwrap(), 1_000_001);
        assert_eq!(amount_in_from_out(1_000_000, (1 << 64) + 1, true).unwrap(), 1_000_000);
        assert_eq!(amount_in_from_out(1_000_000, 2 << 64, true).unwrap(), 500_000);
        assert_eq!(amount_in_from_out(1_000_000, (2 << 64) - 1, true).unwrap(), 500_001);
        assert_eq!(
            amount_in_from_out(1_000_000, (u64::MAX / 2) as u128, true).unwrap(),
            2_000_001
        );
        assert_eq!(
            amount_in_from_out(1_000_000, (u64::MAX / 3) as u128, true).unwrap(),
            3_000_001
        );
        assert_eq!(
            amount_in_from_out(
                1_000_000_000_000,
                (133_333_333 << 64) + ((u64::MAX / 3) as u128),
                true
            )
            .unwrap(),
            7_501
        );

        assert_eq!(amount_in_from_out(1_000_000, 1 << 64, false).unwrap(), 1_000_000);
        assert_eq!(amount_in_from_out(1_000_000, (1 << 64) + 1, false).unwrap(), 1_000_001);
        assert_eq!(amount_in_from_out(1_000_000, (1 << 64) - 1, false).unwrap(), 1_000_000);
        assert_eq!(amount_in_from_out(1_000_000, 2 << 64, false).unwrap(), 2_000_000);
        assert_eq!(
            amount_in_from_out(1_000_000, (u64::MAX / 2) as u128, false).unwrap(),
            500_000
        );
        assert_eq!(
            amount_in_from_out(1_000_000, (u64::MAX / 3) as u128, false).unwrap(),
            333_334
        );
        assert_eq!(
            amount_in_from_out(
                1_000_000,
                (133_333_333 << 64) + ((u64::MAX / 3) as u128),
                false
            )
            .unwrap(),
            133_333_333_333_334
        );
    }

    #[test]
    fn amount_out_vectors() {
        assert_eq!(amount_out_from_in(0, 1 << 64, true).unwrap(), 0);
        assert_eq!(amount_out_from_in(1_000_000, 1 << 64, true).unwrap(), 1_000_000);
        assert_eq!(amount_out_from_in(1_000_000, (1 << 64) - 1, true).unwrap(), 999_999);
        assert_eq!(amount_out_from_in(1_000_000, (1 << 64) + 1, true).unwrap(), 1_000_000);
        assert_eq!(amount_out_from_in(1_000_000, 2 << 64, true).unwrap(), 2_000_000);
        assert_eq!(amount_out_from_in(1_000_000, (2 << 64) - 1, true).unwrap(), 1_999_999);
        assert_eq!(
            amount_out_from_in(1_000_000, (u64::MAX / 2) as u128, true).unwrap(),
            499_999
        );
        assert_eq!(
            amount_out_from_in(1_000_000, (u64::MAX / 3) as u128, true).unwrap(),
            333_333
        );
        assert_eq!(
            amount_out_from_in(
                1_000_000,
                (133_333_333 << 64) + ((u64::MAX / 3) as u128),
                true
            )
            .unwrap(),
            133_333_333_333_333
        );

        assert_eq!(amount_out_from_in(1_000_000, 1 << 64, false).unwrap(), 1_000_000);
        assert_eq!(amount_out_from_in(1_000_000, (1 << 64) + 1, false).unwrap(), 999_999);
        assert_eq!(amount_out_from_in(1_000_000, (1 << 64) - 1, false).unwrap(), 1_000_000);
        assert_eq!(amount_out_from_in(1_000_000, 2 << 64, false).unwrap(), 500_000);
        assert_eq!(amount_out_from_in(1_000_000, (2 << 64) - 1, false).unwrap(), 500_000);
        assert_eq!(
            amount_out_from_in(1_000_000, (u64::MAX / 2) as u128, false).unwrap(),
            2_000_000
        );
        assert_eq!(
            amount_out_from_in(1_000_000, (u64::MAX / 3) as u128, false).unwrap(),
            3_000_000
        );
        assert_eq!(
            amount_out_from_in(
                1_000_000_000_000,
                (133_333_333 << 64) + ((u64::MAX / 3) as u128),
                false
            )
            .unwrap(),
            7_500
        );
    }

    #[test]
    fn round_trip_bounds_input() {
        // in_from_out(x) is the least input that yields >= x out.
        for (x, price) in [
            (1_000_000u64, (1u128 << 64) - 1),
            (777_777, (2 << 64) - 123),
            (5, (u64::MAX / 3) as u128),
        ] {
            for a2b in [true, false] {
                let input = amount_in_from_out(x, price, a2b).unwrap();
                let out = amount_out_from_in(input, price, a2b).unwrap();
                assert!(out >= x, "x={x} price={price} a2b={a2b}");
            }
        }
    }

    #[test]
    fn fee_inclusive_ceils() {
        assert_eq!(fee_inclusive(200_000, 30_000).unwrap(), 6);
        assert_eq!(fee_inclusive(0, 30_000).unwrap(), 0);
        assert_eq!(fee_inclusive(1, 1).unwrap(), 1);
        assert_eq!(fee_inclusive(1_000_000_000, 1).unwrap(), 1);
        assert!(fee_inclusive(1, FEE_PRECISION + 1).is_err());
    }

    #[test]
    fn fee_exclusive_recovers_gross() {
        // net + fee_exclusive(net) carries at least fee_inclusive of the gross.
        for (net, rate) in [(199_994u64, 30_000u64), (1_000, 100_000_000), (1, 1)] {
            let fee = fee_exclusive(net, rate).unwrap();
            let gross = net + fee;
            assert!(fee >= fee_inclusive(gross, rate).unwrap().saturating_sub(1));
        }
        assert!(fee_exclusive(1, FEE_PRECISION).is_err());
    }

    #[test]
    fn composition_fee_linear_plus_quadratic() {
        // 50 at 10%: floor(50 * 1e8 * 1.1e9 / 1e18) = 5
        assert_eq!(composition_fee(50, 100_000_000).unwrap(), 5);
        assert_eq!(composition_fee(0, 100_000_000).unwrap(), 0);
        assert_eq!(composition_fee(1_000_000, 0).unwrap(), 0);
        // 10% of 1e6 plus the quadratic correction
        assert_eq!(composition_fee(1_000_000, 100_000_000).unwrap(), 110_000);
        assert!(composition_fee(1, MAX_FEE_RATE + 1).is_err());
    }

    #[test]
    fn liquidity_round_trips_amounts() {
        let price = 1u128 << 64;
        let liquidity = liquidity_from_amounts(1_000_000, 500_000, price).unwrap();
        assert_eq!(liquidity, (1_000_000u128 << 64) + (500_000u128 << 64));

        let (a, b) = amounts_from_liquidity(1_000_000, 500_000, liquidity / 2, liquidity).unwrap();
        assert_eq!(a, 500_000);
        assert_eq!(b, 250_000);
    }

    #[test]
    fn liquidity_overflow_rejected() {
        // Huge price times a full inventory does not fit 128 bits.
        assert!(liquidity_from_amounts(u64::MAX, 0, u128::MAX / 2).is_err());
    }

    #[test]
    fn growth_conversions_invert_within_floor() {
        let liquidity = 1u128 << 64;
        let growth = growth_from_amount(1000, liquidity).unwrap();
        assert_eq!(growth, 1000u128 << 64);
        assert_eq!(amount_from_growth(growth, liquidity).unwrap(), 1000);

        // Odd liquidity: the floor may shave at most one unit.
        let liquidity = (1u128 << 64) + 12345;
        let growth = growth_from_amount(1000, liquidity).unwrap();
        let recovered = amount_from_growth(growth, liquidity).unwrap();
        assert!(recovered == 1000 || recovered == 999);
    }

    #[test]
    fn growth_rejects_zero_liquidity() {
        assert_eq!(growth_from_amount(1, 0), Err(MathError::DivisionByZero));
    }
}
