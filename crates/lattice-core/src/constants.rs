//! # Engine Constants
//!
//! Bounds and precisions for bins, fees, positions and rewards.

pub use lattice_math::{BASIS_POINT_MAX, FEE_PRECISION, MAX_FEE_RATE};
pub use lattice_math::{MAX_BIN_ID, MIN_BIN_ID, ONE, SCALE_OFFSET};

// ============================================================================
// Bin store
// ============================================================================

/// Bins per group; one group load covers up to 16 adjacent bins per swap.
pub const BIN_GROUP_SIZE: u32 = 16;

/// Offset applied to a bin id so scores are non-negative and id-ordered.
pub const SCORE_OFFSET: i32 = 443_636;

// ============================================================================
// Fees
// ============================================================================

/// Protocol share of swap fees is capped at 30%.
pub const MAX_PROTOCOL_FEE_RATE: u64 = 300_000_000;

/// Partner referral share of the LP fee is capped at 100%.
pub const MAX_REF_FEE_RATE: u64 = FEE_PRECISION;

/// Largest supported price step between adjacent bins, in basis points.
pub const MAX_BIN_STEP: u16 = 1000;

// ============================================================================
// Positions
// ============================================================================

/// A position spans at most this many contiguous bins.
pub const MAX_POSITION_WIDTH: u16 = 1000;

// ============================================================================
// Rewards
// ============================================================================

/// Reward slots per pool.
pub const MAX_REWARD_SLOTS: usize = 5;

/// Tail slots reserved for the reward manager.
pub const RESERVED_REWARD_SLOTS: usize = 2;

/// Shortest accepted emission window, in seconds.
pub const MIN_REWARD_DURATION: u64 = 3600;

/// Epoch origin for reward reporting.
pub const REWARD_PERIOD_REFERENCE: u64 = 1_757_332_800;

/// Length of one reward epoch, in seconds (one week).
pub const REWARD_PERIOD_LENGTH: u64 = 604_800;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_consistent() {
        assert!(MAX_FEE_RATE < FEE_PRECISION);
        assert!(MAX_PROTOCOL_FEE_RATE < FEE_PRECISION);
        assert_eq!(SCORE_OFFSET, MAX_BIN_ID);
        assert_eq!(MIN_BIN_ID, -MAX_BIN_ID);
        assert!(RESERVED_REWARD_SLOTS < MAX_REWARD_SLOTS);
        assert_eq!(REWARD_PERIOD_LENGTH, 7 * 24 * 3600);
    }
}
