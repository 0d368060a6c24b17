//! Turns an allocation into the swap steps of a batch swap, with raw integer
//! amounts, and prices them with the on-chain pool math.

use {
    crate::{
        SwapKind,
        error::Error,
        optimizer::Allocation,
        paths::Path,
        pools::{PairMath, Pool},
        simulation::SimulationContext,
        swap::error::Error as MathError,
    },
    number::conversions::f64_to_raw,
    primitive_types::{H160, H256, U256},
    serde::Serialize,
    serde_with::{DisplayFromStr, serde_as},
    std::collections::HashMap,
};

/// One pool interaction of a batch swap. Only the first step of every path
/// carries an amount, the others consume the previous step's result.
#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub pool_id: H256,
    pub token_in: H160,
    pub token_out: H160,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: U256,
    pub token_in_decimals: u8,
    pub token_out_decimals: u8,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub token_in: H160,
    pub token_out: H160,
    /// Steps in execution order.
    pub swaps: Vec<Swap>,
    /// Raw amount of the fixed side of the trade.
    #[serde_as(as = "DisplayFromStr")]
    pub swap_amount: U256,
    /// Raw amount out for exact in and amount in for exact out trades.
    #[serde_as(as = "DisplayFromStr")]
    pub return_amount: U256,
    /// The return amount net of the estimated gas cost of all hops.
    #[serde_as(as = "DisplayFromStr")]
    pub return_amount_considering_fees: U256,
    /// Marginal price of the best path after its trade, in token units.
    pub market_sp: f64,
}

impl SwapInfo {
    /// Result for trades that cannot be routed.
    pub fn empty(token_in: H160, token_out: H160) -> Self {
        Self {
            token_in,
            token_out,
            swaps: Vec::new(),
            swap_amount: U256::zero(),
            return_amount: U256::zero(),
            return_amount_considering_fees: U256::zero(),
            market_sp: 0.,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }
}

/// Formats `allocation` as swap steps. `total` is the raw amount of the
/// fixed side and `cost_per_pool` the gas cost of one hop in units of the
/// return token.
pub fn format_swaps(
    allocation: &Allocation,
    pools: &[Pool],
    kind: SwapKind,
    total: U256,
    cost_per_pool: f64,
    now: u64,
) -> Result<SwapInfo, Error> {
    let Some(first_path) = allocation.paths.first() else {
        return Err(Error::InvalidAmount("nothing to format".to_owned()));
    };
    let (token_in, token_out) = (first_path.token_in(), first_path.token_out());
    let (fixed_decimals, return_decimals) = decimals(first_path, kind);

    let raw = split_raw(&allocation.amounts, total, fixed_decimals)?;
    let routes = allocation
        .paths
        .iter()
        .zip(&allocation.amounts)
        .zip(raw)
        .filter(|(_, raw)| !raw.is_zero())
        .map(|((path, amount), raw)| (path, *amount, raw))
        .collect::<Vec<_>>();
    let Some(&(market_path, market_amount, _)) = routes.first() else {
        return Ok(SwapInfo::empty(token_in, token_out));
    };

    let pools = pools
        .iter()
        .map(|pool| (pool.id(), pool))
        .collect::<HashMap<_, _>>();
    let mut context = SimulationContext::new(now);
    let mut swaps = Vec::new();
    let mut return_amount = U256::zero();
    let mut hops = 0;
    for (path, _, amount) in &routes {
        let result = simulate(&mut context, &pools, path, kind, *amount)?;
        return_amount = return_amount
            .checked_add(result)
            .ok_or(MathError::AddOverflow)?;
        hops += path.hops.len();
        swaps.extend(steps(path, kind, *amount));
    }

    let cost = f64_to_raw(cost_per_pool * hops as f64, return_decimals)
        .map_err(|err| Error::InvalidAmount(format!("{err:#}")))?;
    let return_amount_considering_fees = match kind {
        SwapKind::ExactIn => return_amount.saturating_sub(cost),
        SwapKind::ExactOut => return_amount.saturating_add(cost),
    };

    Ok(SwapInfo {
        token_in,
        token_out,
        swaps,
        swap_amount: total,
        return_amount,
        return_amount_considering_fees,
        market_sp: market_path.spot_price_after_swap(kind, market_amount),
    })
}

/// Decimals of the fixed and of the returned side of the trade.
fn decimals(path: &Path, kind: SwapKind) -> (u8, u8) {
    let decimals_in = path.hops[0].decimals_in;
    let decimals_out = path.hops[path.hops.len() - 1].decimals_out;
    match kind {
        SwapKind::ExactIn => (decimals_in, decimals_out),
        SwapKind::ExactOut => (decimals_out, decimals_in),
    }
}

/// Rounds the amounts down to raw integers and reconciles the rounding dust
/// on the first non-zero amount so that they add up to `total`. An excess
/// larger than that amount is taken from the following ones.
fn split_raw(amounts: &[f64], total: U256, decimals: u8) -> Result<Vec<U256>, Error> {
    let mut raw = amounts
        .iter()
        .map(|amount| f64_to_raw(amount.max(0.), decimals))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|err| Error::InvalidAmount(format!("{err:#}")))?;
    let sum = raw
        .iter()
        .try_fold(U256::zero(), |sum, amount| sum.checked_add(*amount))
        .ok_or(MathError::AddOverflow)?;
    let target = raw
        .iter()
        .position(|amount| !amount.is_zero())
        .or_else(|| amounts.iter().position(|amount| *amount > 0.));
    let Some(target) = target else {
        return Ok(raw);
    };
    if total >= sum {
        raw[target] = raw[target]
            .checked_add(total - sum)
            .ok_or(MathError::AddOverflow)?;
    } else {
        let mut excess = sum - total;
        for amount in &mut raw[target..] {
            let taken = excess.min(*amount);
            *amount -= taken;
            excess -= taken;
        }
    }
    Ok(raw)
}

/// Steps of one path. Exact out batch swaps are given from the last hop
/// backwards, so the step carrying the amount always comes first.
fn steps(path: &Path, kind: SwapKind, amount: U256) -> Vec<Swap> {
    let step = |index: usize, amount: U256| {
        let hop = &path.hops[index];
        Swap {
            pool_id: hop.pool_id,
            token_in: hop.token_in,
            token_out: hop.token_out,
            amount,
            token_in_decimals: hop.decimals_in,
            token_out_decimals: hop.decimals_out,
        }
    };
    let order = match kind {
        SwapKind::ExactIn => (0..path.hops.len()).collect::<Vec<_>>(),
        SwapKind::ExactOut => (0..path.hops.len()).rev().collect(),
    };
    order
        .into_iter()
        .enumerate()
        .map(|(position, index)| {
            step(index, if position == 0 { amount } else { U256::zero() })
        })
        .collect()
}

/// Executes a path in the simulation and returns its raw result.
fn simulate(
    context: &mut SimulationContext,
    pools: &HashMap<H256, &Pool>,
    path: &Path,
    kind: SwapKind,
    amount: U256,
) -> Result<U256, Error> {
    let hops = match kind {
        SwapKind::ExactIn => path.hops.iter().collect::<Vec<_>>(),
        SwapKind::ExactOut => path.hops.iter().rev().collect(),
    };
    hops.into_iter().try_fold(amount, |amount, hop| {
        let pool = pools
            .get(&hop.pool_id)
            .ok_or_else(|| Error::invalid_pool(format!("{:?}", hop.pool_id), "not in snapshot"))?;
        context.execute(pool, hop.token_in, hop.token_out, kind, amount)
    })
}
