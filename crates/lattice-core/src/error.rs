//! # Engine Errors
//!
//! Every fallible operation returns one of these kinds. Errors are fatal
//! to the calling operation; nothing is retried internally and partial
//! success is never observable.

use lattice_math::MathError;
use thiserror::Error;

/// Engine error kinds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlmmError {
    #[error("bin not found")]
    BinMissing,

    #[error("bin id outside the supported range")]
    BinIdRange,

    #[error("liquidity exceeds 128 bits")]
    LiquidityOverflow,

    #[error("amount exceeds the representable range")]
    AmountOverflow,

    #[error("removal exceeds the share held")]
    LiquidityUnderflow,

    #[error("price is zero")]
    PriceZero,

    #[error("swap produced a zero amount")]
    AmountZero,

    #[error("fee rate out of bounds")]
    FeeRateInvalid,

    #[error("all reward slots are in use")]
    RewardSlotFull,

    #[error("reward already initialized for this token")]
    RewardExists,

    #[error("no reward slot for this token")]
    RewardMissing,

    #[error("reward period shorter than the minimum duration")]
    RewardDurationTooShort,

    #[error("position width out of bounds")]
    PositionWidthInvalid,

    #[error("position does not belong to this pool")]
    PositionMismatch,

    #[error("repaid amounts do not match the certificate")]
    CertAmountMismatch,

    #[error("active bin required but not funded")]
    ActiveIdExpected,

    #[error("operation blocked")]
    OpsBlocked,

    #[error("invalid input data")]
    InvalidInput,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DlmmError>;

impl From<MathError> for DlmmError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::PriceZero => DlmmError::PriceZero,
            MathError::ZeroResult => DlmmError::PriceZero,
            MathError::FeeRateExceeded => DlmmError::FeeRateInvalid,
            MathError::ExponentOutOfRange => DlmmError::BinIdRange,
            MathError::Overflow | MathError::DivisionByZero => DlmmError::AmountOverflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_errors_map_by_context() {
        assert_eq!(DlmmError::from(MathError::PriceZero), DlmmError::PriceZero);
        assert_eq!(
            DlmmError::from(MathError::FeeRateExceeded),
            DlmmError::FeeRateInvalid
        );
        assert_eq!(DlmmError::from(MathError::Overflow), DlmmError::AmountOverflow);
    }

    #[test]
    fn errors_render_messages() {
        assert_eq!(format!("{}", DlmmError::BinMissing), "bin not found");
        assert_eq!(
            format!("{}", DlmmError::CertAmountMismatch),
            "repaid amounts do not match the certificate"
        );
    }
}
