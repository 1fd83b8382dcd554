//! # Lattice Core
//!
//! The pricing, liquidity and accounting engine of a dynamic liquidity
//! market maker. Discrete price bins hold two-asset inventories; swaps
//! traverse bins in price order; multi-bin positions earn fees and
//! rewards through per-bin growth accumulators.
//!
//! Every pool instance executes serially: a call runs to completion or
//! fails without observable partial effects. The host runtime owns
//! persistence, access control and event plumbing.

pub mod bin;
pub mod bin_store;
pub mod certificates;
pub mod config;
pub mod constants;
pub mod error;
pub mod partner;
pub mod pool;
pub mod position;
pub mod registry;
pub mod rewards;
pub mod token;

pub use bin::{Bin, BinSwapOutcome};
pub use bin_store::BinStore;
pub use certificates::{AddCert, ClosePositionCert, OpenCert};
pub use config::{BinStepConfig, VariableParameters};
pub use error::{DlmmError, Result};
pub use partner::Partner;
pub use pool::{BinSwap, OperationKind, Permissions, Pool, PositionInfo, SwapResult};
pub use position::{BinStat, Position};
pub use registry::{PoolKey, Registry};
pub use rewards::{RewardManager, RewardSlot};
pub use token::{Balance, BalanceBag, TokenTag};
