//! Splits a trade over candidate paths. For a growing number of paths the
//! amounts are moved with Newton steps until all used paths have the same
//! marginal price, and the best split net of gas costs is kept.

use {
    crate::{
        Config,
        SwapKind,
        metrics::{self, Computation},
        paths::Path,
        pools::PairMath,
    },
    itertools::Itertools,
};

/// Amounts below this are priced with the spot price instead of the
/// effective price of the trade.
const DUST: f64 = 1e-10;

/// Lower bound for path derivatives. Constant price paths have a zero
/// derivative, with which a path would take all of the trade.
const MIN_DERIVATIVE: f64 = 1e-15;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Allocation {
    pub paths: Vec<Path>,
    /// Amount of the fixed side routed through each path.
    pub amounts: Vec<f64>,
    /// Amount out for exact in and amount in for exact out trades.
    pub total_return: f64,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of pool hops, which is what gas costs scale with.
    pub fn pool_count(&self) -> usize {
        self.paths.iter().map(|path| path.hops.len()).sum()
    }
}

/// Finds the best split of `total` over `paths` using at most `max_pools`
/// pools. Returns an empty allocation if the paths cannot absorb `total`.
///
/// The largest limits only decide how many paths are needed and how much a
/// newly added path starts with. Which paths take the amounts is chosen
/// among all candidates.
pub fn optimize(
    mut paths: Vec<Path>,
    kind: SwapKind,
    total: f64,
    max_pools: usize,
    cost_per_pool: f64,
    config: &Config,
) -> Allocation {
    paths.sort_by(|a, b| b.limit.total_cmp(&a.limit));

    let seed = seed_amounts(&paths, total).filter(|amounts| amounts.len() <= max_pools);
    let Some(mut amounts) = seed else {
        metrics::insufficient_liquidity(kind, paths.len());
        return Allocation::default();
    };

    let initial_paths = amounts.len();
    let mut best = Allocation::default();
    let mut best_net = 0.;
    for count in initial_paths..=paths.len().min(max_pools) {
        if count != initial_paths {
            let new_amount = (total / count as f64).min(paths[count - 1].limit);
            for amount in &mut amounts {
                *amount *= 1. - new_amount / total;
            }
            amounts.push(new_amount);
        }

        let Some((selected, sorted)) = best_paths(&paths, kind, &amounts) else {
            break;
        };
        amounts = equalize_prices(&selected, kind, total, sorted, config);
        let total_return = selected
            .iter()
            .zip(&amounts)
            .map(|(path, amount)| path.bounded_swap(kind, *amount))
            .sum::<f64>();
        let allocation = Allocation {
            paths: selected.into_iter().cloned().collect(),
            amounts: amounts.clone(),
            total_return,
        };

        let cost = cost_per_pool * allocation.pool_count() as f64;
        let net = match kind {
            SwapKind::ExactIn => total_return - cost,
            SwapKind::ExactOut => total_return + cost,
        };
        let improves = allocation.pool_count() <= max_pools
            && (best.is_empty()
                || match kind {
                    SwapKind::ExactIn => net > best_net,
                    SwapKind::ExactOut => net < best_net,
                });
        tracing::debug!(paths = count, total_return, net, improves, "evaluated split");
        if !improves {
            break;
        }
        best = allocation;
        best_net = net;
    }
    best
}

/// Fills paths in order of their limits until they can take `total`.
fn seed_amounts(paths: &[Path], total: f64) -> Option<Vec<f64>> {
    let mut amounts = Vec::new();
    let mut sum = 0.;
    for path in paths {
        amounts.push(path.limit);
        sum += path.limit;
        if sum >= total {
            if let Some(last) = amounts.last_mut() {
                *last -= sum - total;
            }
            return Some(amounts);
        }
    }
    None
}

/// Assigns the largest amounts first, each to the path with the best
/// effective price among the unused paths able to take it. Returns the
/// chosen paths with their amounts, largest first.
fn best_paths<'a>(
    paths: &'a [Path],
    kind: SwapKind,
    amounts: &[f64],
) -> Option<(Vec<&'a Path>, Vec<f64>)> {
    let sorted = amounts
        .iter()
        .copied()
        .sorted_by(|a, b| b.total_cmp(a))
        .collect::<Vec<_>>();
    let mut used = vec![false; paths.len()];
    let mut selected = Vec::with_capacity(sorted.len());
    for amount in &sorted {
        let mut best = None;
        let mut best_price = f64::INFINITY;
        for (index, path) in paths.iter().enumerate() {
            if used[index] || path.limit < *amount {
                continue;
            }
            let price = effective_price(path, kind, *amount);
            // ties go to the later path
            if price <= best_price {
                best = Some(index);
                best_price = price;
            }
        }
        let index = best?;
        used[index] = true;
        selected.push(&paths[index]);
    }
    Some((selected, sorted))
}

/// Amount in per amount out of a trade of `amount` through `path`.
fn effective_price(path: &Path, kind: SwapKind, amount: f64) -> f64 {
    if amount < DUST {
        return path.spot_price();
    }
    if path.limit == amount {
        return f64::INFINITY;
    }
    let result = path.swap(kind, amount);
    match kind {
        SwapKind::ExactIn => amount / result,
        SwapKind::ExactOut => result / amount,
    }
}

/// Moves the amounts until the marginal prices of all paths strictly inside
/// their bounds agree within the configured tolerance.
fn equalize_prices(
    paths: &[&Path],
    kind: SwapKind,
    total: f64,
    mut amounts: Vec<f64>,
    config: &Config,
) -> Vec<f64> {
    let mut price_error = 1.;
    let mut iterations = 0;
    while price_error > config.price_error_tolerance {
        if iterations == config.max_equalization_iterations {
            metrics::non_convergence(Computation::PriceEqualization, iterations);
            break;
        }
        price_error = approximation_step(paths, kind, total, &mut amounts, iterations == 0);
        iterations += 1;
    }
    tracing::trace!(iterations, price_error, ?amounts, "equalized prices");
    amounts
}

/// One Newton step towards the derivative weighted average price followed
/// by redistributing whatever left the `[0, limit]` bounds. Returns the
/// remaining relative price spread.
fn approximation_step(
    paths: &[&Path],
    kind: SwapKind,
    total: f64,
    amounts: &mut [f64],
    first: bool,
) -> f64 {
    let limits = paths.iter().map(|path| path.limit).collect::<Vec<_>>();
    let inside = |amount: f64, limit: f64| amount > 0. && amount < limit;

    let mut inverse_derivatives = vec![0.; paths.len()];
    let mut weighted_prices = 0.;
    let mut weights = 0.;
    let mut prices = vec![f64::NAN; paths.len()];
    for (index, path) in paths.iter().enumerate() {
        let amount = amounts[index];
        let viable = if first {
            amount >= 0. && amount <= limits[index]
        } else {
            inside(amount, limits[index])
        };
        if !viable {
            continue;
        }
        let (price, derivative) = path.price_and_derivative(kind, amount);
        if !price.is_finite() {
            continue;
        }
        let inverse = 1. / derivative.max(MIN_DERIVATIVE);
        prices[index] = price;
        inverse_derivatives[index] = inverse;
        weighted_prices += price * inverse;
        weights += inverse;
    }
    if weights == 0. {
        return 0.;
    }

    let target = weighted_prices / weights;
    for index in 0..paths.len() {
        if inverse_derivatives[index] > 0. {
            amounts[index] += (target - prices[index]) * inverse_derivatives[index];
        }
    }

    redistribute(amounts, &limits, &mut inverse_derivatives);

    let error = total - amounts.iter().sum::<f64>();
    if let Some(index) = (0..paths.len()).find(|&index| inverse_derivatives[index] > 0.) {
        if inside(amounts[index] + error, limits[index]) {
            amounts[index] += error;
        }
    }

    let (min, max) = paths
        .iter()
        .enumerate()
        .filter(|&(index, _)| inside(amounts[index], limits[index]))
        .map(|(index, path)| path.spot_price_after_swap(kind, amounts[index]))
        .filter(|price| price.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), price| {
            (min.min(price), max.max(price))
        });
    if min < max { (max - min) / min } else { 0. }
}

/// Clamps amounts into `[0, limit]` and spreads the clamped excess or
/// deficit over the paths still inside their bounds, weighted by their
/// inverse derivatives. Paths leaving their bounds stop receiving amounts.
fn redistribute(amounts: &mut [f64], limits: &[f64], inverse_derivatives: &mut [f64]) {
    let out_of_bounds =
        |amounts: &[f64]| amounts.iter().zip(limits).any(|(a, l)| *a < 0. || *a > *l);
    // Every pass removes at least one path from the receivers.
    for _ in 0..=amounts.len() {
        if !out_of_bounds(amounts) {
            return;
        }
        let mut delta = 0.;
        for index in 0..amounts.len() {
            if amounts[index] <= 0. {
                delta += amounts[index];
                amounts[index] = 0.;
                inverse_derivatives[index] = 0.;
            } else if amounts[index] >= limits[index] {
                delta += amounts[index] - limits[index];
                amounts[index] = limits[index];
                inverse_derivatives[index] = 0.;
            }
        }

        let weights = inverse_derivatives.iter().sum::<f64>();
        if weights > 0. {
            for index in 0..amounts.len() {
                amounts[index] += delta * inverse_derivatives[index] / weights;
            }
            continue;
        }

        // No path is left inside its bounds: fill the remaining room or
        // take back proportionally to the amounts.
        let shares = if delta > 0. {
            limits
                .iter()
                .zip(amounts.iter())
                .map(|(limit, amount)| limit - amount)
                .collect::<Vec<_>>()
        } else {
            amounts.to_vec()
        };
        let sum = shares.iter().sum::<f64>();
        if sum > 0. {
            for index in 0..amounts.len() {
                amounts[index] += delta * shares[index] / sum;
            }
        }
        return;
    }
}
