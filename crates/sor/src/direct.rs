//! Legacy router for weighted pools on `BONE` integer math.
//!
//! The spot price of every route is linearized in the traded amount,
//! `sp(a) = sp * (1 + s * a)`, which makes the amount a route takes at a
//! given price a piecewise linear function. The router collects the prices
//! at which the set of best routes can change, finds the two consecutive
//! ones bracketing the requested amount and interpolates between them.

use {
    crate::{
        Config,
        SwapKind,
        bmath::{self, BONE, bdiv, bmul},
        error::Error,
        metrics,
        optimizer::Allocation,
        paths::{Path, candidate_paths},
        pools::{PairType, Pool, WeightedPool},
    },
    bigdecimal::BigDecimal,
    itertools::Itertools,
    num::{BigInt, Zero},
    number::conversions::{decimal_to_raw, f64_to_raw, u256_to_big_int},
    primitive_types::{H160, H256},
    std::{collections::HashMap, sync::LazyLock},
};

/// Share of a balance a single swap may take.
static MAX_RATIO: LazyLock<BigInt> =
    LazyLock::new(|| BigInt::from(3) * BigInt::from(10).pow(17));

fn to_bone(value: &BigDecimal) -> Result<BigInt, Error> {
    decimal_to_raw(value, 18)
        .map(|raw| u256_to_big_int(&raw))
        .map_err(|err| Error::InvalidAmount(format!("{err:#}")))
}

/// A weighted pool projected on one trading direction, in `BONE` units.
#[derive(Clone, Debug)]
struct WeightedHop {
    balance_in: BigInt,
    weight_in: BigInt,
    balance_out: BigInt,
    weight_out: BigInt,
    swap_fee: BigInt,
}

impl WeightedHop {
    fn new(pool: &WeightedPool, token_in: H160, token_out: H160) -> Result<Self, Error> {
        let common = &pool.common;
        let weight = |index: usize| {
            common.tokens[index]
                .weight
                .clone()
                .ok_or_else(|| Error::MissingField {
                    pool: format!("{:?}", common.id),
                    field: "weight",
                })
        };
        let total_weight = (0..common.tokens.len())
            .map(weight)
            .sum::<Result<BigDecimal, _>>()?;
        let (index_in, index_out) = (common.index_of(token_in)?, common.index_of(token_out)?);
        Ok(Self {
            balance_in: to_bone(&common.tokens[index_in].balance)?,
            weight_in: to_bone(&(weight(index_in)? / &total_weight))?,
            balance_out: to_bone(&common.tokens[index_out].balance)?,
            weight_out: to_bone(&(weight(index_out)? / &total_weight))?,
            swap_fee: to_bone(&common.swap_fee)?,
        })
    }

    fn out_given_in(&self, amount: &BigInt) -> Result<BigInt, Error> {
        Ok(bmath::calc_out_given_in(
            &self.balance_in,
            &self.weight_in,
            &self.balance_out,
            &self.weight_out,
            amount,
            &self.swap_fee,
        )?)
    }

    fn in_given_out(&self, amount: &BigInt) -> Result<BigInt, Error> {
        Ok(bmath::calc_in_given_out(
            &self.balance_in,
            &self.weight_in,
            &self.balance_out,
            &self.weight_out,
            amount,
            &self.swap_fee,
        )?)
    }

    fn spot_price(&self) -> Result<BigInt, Error> {
        Ok(bmath::calc_spot_price(
            &self.balance_in,
            &self.weight_in,
            &self.balance_out,
            &self.weight_out,
            &self.swap_fee,
        )?)
    }

    fn slippage(&self, kind: SwapKind) -> Result<BigInt, Error> {
        Ok(match kind {
            SwapKind::ExactIn => bmath::calc_slippage_exact_in(
                &self.balance_in,
                &self.weight_in,
                &self.weight_out,
                &self.swap_fee,
            )?,
            SwapKind::ExactOut => bmath::calc_slippage_exact_out(
                &self.weight_in,
                &self.balance_out,
                &self.weight_out,
                &self.swap_fee,
            )?,
        })
    }

    fn limit(&self, kind: SwapKind) -> BigInt {
        match kind {
            SwapKind::ExactIn => bmul(&self.balance_in, &MAX_RATIO),
            SwapKind::ExactOut => bmul(&self.balance_out, &MAX_RATIO),
        }
    }
}

/// One or two weighted hops with their linearized price.
#[derive(Clone, Debug)]
struct Route {
    path: Path,
    hops: Vec<WeightedHop>,
    spot_price: BigInt,
    slippage: BigInt,
    limit: BigInt,
}

impl Route {
    /// Returns `None` for paths that are not made of weighted token pairs.
    fn new(
        path: Path,
        pools: &HashMap<H256, &Pool>,
        kind: SwapKind,
    ) -> Result<Option<Self>, Error> {
        let mut hops = Vec::with_capacity(path.hops.len());
        for hop in &path.hops {
            let (Some(Pool::Weighted(pool)), PairType::TokenToToken) =
                (pools.get(&hop.pool_id).copied(), hop.pair_type)
            else {
                return Ok(None);
            };
            hops.push(WeightedHop::new(pool, hop.token_in, hop.token_out)?);
        }

        let (spot_price, slippage, limit) = match hops.as_slice() {
            [hop] => (hop.spot_price()?, hop.slippage(kind)?, hop.limit(kind)),
            [first, second] => {
                let (first_price, second_price) = (first.spot_price()?, second.spot_price()?);
                let (first_slippage, second_slippage) =
                    (first.slippage(kind)?, second.slippage(kind)?);
                let slippage = match kind {
                    SwapKind::ExactIn => {
                        bmath::calc_path_slippage(&first_slippage, &first_price, &second_slippage)?
                    }
                    SwapKind::ExactOut => second_slippage + bmul(&first_slippage, &second_price),
                };
                let limit = match kind {
                    SwapKind::ExactIn => {
                        let second_cap = second.limit(kind);
                        if second_cap < first.balance_out {
                            first.limit(kind).min(first.in_given_out(&second_cap)?)
                        } else {
                            first.limit(kind)
                        }
                    }
                    SwapKind::ExactOut => {
                        let first_cap = first.limit(kind);
                        second.limit(kind).min(second.out_given_in(&first_cap)?)
                    }
                };
                (bmul(&first_price, &second_price), slippage, limit)
            }
            _ => return Ok(None),
        };
        Ok(Some(Self {
            path,
            hops,
            spot_price,
            slippage,
            limit,
        }))
    }

    /// Linearized price after trading `amount`.
    fn price_at(&self, amount: &BigInt) -> BigInt {
        bmul(&self.spot_price, &(&*BONE + bmul(&self.slippage, amount)))
    }

    /// Amount that moves the linearized price up to `price`, capped at the
    /// limit.
    fn amount_at(&self, price: &BigInt) -> Result<BigInt, Error> {
        if *price <= self.spot_price {
            return Ok(BigInt::zero());
        }
        if self.slippage.is_zero() {
            return Ok(self.limit.clone());
        }
        let amount = bdiv(&(bdiv(price, &self.spot_price)? - &*BONE), &self.slippage)?;
        Ok(amount.min(self.limit.clone()))
    }

    /// Exact amount out for exact in and amount in for exact out trades.
    fn swap(&self, kind: SwapKind, amount: &BigInt) -> Result<BigInt, Error> {
        match kind {
            SwapKind::ExactIn => self
                .hops
                .iter()
                .try_fold(amount.clone(), |amount, hop| hop.out_given_in(&amount)),
            SwapKind::ExactOut => self
                .hops
                .iter()
                .rev()
                .try_fold(amount.clone(), |amount, hop| hop.in_given_out(&amount)),
        }
    }
}

/// Prices at which the amounts of the routes change slope or the routes'
/// ranking by amount can change: spot prices, limit prices and the
/// intersections of two routes' price lines.
fn prices_of_interest(routes: &[Route]) -> Result<Vec<BigInt>, Error> {
    let mut prices = Vec::new();
    for route in routes {
        prices.push(route.spot_price.clone());
        prices.push(route.price_at(&route.limit));
    }
    for (a, b) in routes.iter().tuple_combinations() {
        let denominator = bmul(&a.spot_price, &a.slippage) - bmul(&b.spot_price, &b.slippage);
        if denominator.is_zero() {
            continue;
        }
        let amount = bdiv(&(&b.spot_price - &a.spot_price), &denominator)?;
        if amount > BigInt::zero() && amount < a.limit.clone().min(b.limit.clone()) {
            prices.push(a.price_at(&amount));
        }
    }
    prices.sort();
    prices.dedup();
    Ok(prices)
}

/// Routes taking the most at `price` that fit into `max_pools`, with their
/// amounts, largest first.
fn best_routes(
    routes: &[Route],
    price: &BigInt,
    max_pools: usize,
) -> Result<Vec<(usize, BigInt)>, Error> {
    let amounts = routes
        .iter()
        .map(|route| route.amount_at(price))
        .collect::<Result<Vec<_>, _>>()?;
    let mut pools = 0;
    let mut selected = Vec::new();
    for index in (0..routes.len()).sorted_by(|a, b| amounts[*b].cmp(&amounts[*a])) {
        let count = routes[index].hops.len();
        if amounts[index].is_zero() || pools + count > max_pools {
            continue;
        }
        pools += count;
        selected.push((index, amounts[index].clone()));
    }
    Ok(selected)
}

/// Splits `total` over at most `max_pools` pools. Returns `None` if the
/// routes cannot take `total`.
fn split(
    routes: &[Route],
    prices: &[BigInt],
    total: &BigInt,
    max_pools: usize,
) -> Result<Option<Vec<(usize, BigInt)>>, Error> {
    let mut lower: Option<&BigInt> = None;
    for price in prices {
        let upper = best_routes(routes, price, max_pools)?;
        let upper_sum = upper.iter().map(|(_, amount)| amount).sum::<BigInt>();
        if upper_sum < *total {
            lower = Some(price);
            continue;
        }

        let lower_amounts = match lower {
            Some(lower) => upper
                .iter()
                .map(|(index, _)| routes[*index].amount_at(lower))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![BigInt::zero(); upper.len()],
        };
        let lower_sum = lower_amounts.iter().sum::<BigInt>();
        let fraction = if upper_sum > lower_sum {
            bdiv(&(total - &lower_sum), &(&upper_sum - &lower_sum))?
                .clamp(BigInt::zero(), BONE.clone())
        } else {
            BONE.clone()
        };
        let mut amounts = upper
            .into_iter()
            .zip(lower_amounts)
            .map(|((index, upper), lower)| {
                let amount = &lower + bmul(&(upper - &lower), &fraction);
                (index, amount)
            })
            .collect::<Vec<_>>();
        let dust = total - amounts.iter().map(|(_, amount)| amount).sum::<BigInt>();
        if let Some((_, first)) = amounts.first_mut() {
            *first += dust;
        }
        amounts.retain(|(_, amount)| *amount > BigInt::zero());
        return Ok(Some(amounts));
    }
    Ok(None)
}

/// Routes `total` over weighted pools. Tries an increasing number of pools
/// and stops at the first that does not improve the return net of
/// `cost_per_pool`, given in units of the returned token. Returns an empty
/// allocation if the pools cannot take `total`.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    pools: &[Pool],
    token_in: H160,
    token_out: H160,
    kind: SwapKind,
    total: &BigDecimal,
    max_pools: usize,
    cost_per_pool: f64,
    hop_tokens: &[H160],
    config: &Config,
) -> Result<Allocation, Error> {
    let by_id = pools
        .iter()
        .map(|pool| (pool.id(), pool))
        .collect::<HashMap<_, _>>();
    let mut routes = Vec::new();
    for path in candidate_paths(pools, token_in, token_out, kind, hop_tokens, config)? {
        if let Some(route) = Route::new(path, &by_id, kind)? {
            routes.push(route);
        }
    }
    let prices = prices_of_interest(&routes)?;
    let total = to_bone(total)?;
    let cost_per_pool = f64_to_raw(cost_per_pool, 18)
        .map(|raw| u256_to_big_int(&raw))
        .map_err(|err| Error::InvalidAmount(format!("{err:#}")))?;

    let mut best: Option<(Vec<(usize, BigInt)>, BigInt, BigInt)> = None;
    for count in 1..=max_pools {
        let Some(amounts) = split(&routes, &prices, &total, count)? else {
            continue;
        };
        let mut result = BigInt::zero();
        let mut hops = 0;
        for (index, amount) in &amounts {
            result += routes[*index].swap(kind, amount)?;
            hops += routes[*index].hops.len();
        }
        let cost = &cost_per_pool * BigInt::from(hops);
        let net = match kind {
            SwapKind::ExactIn => &result - cost,
            SwapKind::ExactOut => &result + cost,
        };
        let improves = match &best {
            None => true,
            Some((_, _, best_net)) => match kind {
                SwapKind::ExactIn => net > *best_net,
                SwapKind::ExactOut => net < *best_net,
            },
        };
        tracing::debug!(pools = count, %result, %net, improves, "evaluated direct split");
        if !improves {
            break;
        }
        best = Some((amounts, result, net));
    }

    let Some((amounts, result, _)) = best else {
        metrics::insufficient_liquidity(kind, routes.len());
        return Ok(Allocation::default());
    };
    Ok(Allocation {
        paths: amounts
            .iter()
            .map(|(index, _)| routes[*index].path.clone())
            .collect(),
        amounts: amounts
            .iter()
            .map(|(_, amount)| bmath::to_f64(amount))
            .collect(),
        total_return: bmath::to_f64(&result),
    })
}
