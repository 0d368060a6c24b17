//! Smart order routing over Balancer pools.
//!
//! Given a snapshot of pools and a quote request, [`get_best_swaps`] splits
//! the trade over direct and two hop paths so that the marginal prices of
//! all used paths are equal, and returns the resulting swaps with amounts
//! computed by the on-chain pool math.

#[cfg(test)]
macro_rules! bfp {
    ($s:expr) => {
        $s.parse::<crate::swap::fixed_point::Bfp>().unwrap()
    };
}

pub mod bmath;
pub mod config;
pub mod direct;
pub mod error;
pub mod format;
mod metrics;
pub mod optimizer;
pub mod paths;
pub mod pools;
pub mod router;
pub mod simulation;
pub mod swap;

pub use self::{
    config::Config,
    error::Error,
    format::{Swap, SwapInfo},
    pools::{Pool, Snapshot},
    router::{QuoteRequest, get_best_swaps, get_best_swaps_direct},
};

use serde::{Deserialize, Serialize};

/// Which side of a trade is fixed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapKind {
    /// The amount in is fixed and the amount out maximized.
    ExactIn,
    /// The amount out is fixed and the amount in minimized.
    ExactOut,
}
