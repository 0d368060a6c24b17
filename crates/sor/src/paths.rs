//! Candidate paths from the token in to the token out and the composition
//! of the per pool pricing functions along them.

use {
    crate::{
        Config,
        SwapKind,
        error::Error,
        pools::{PairMath, Pool, PoolPairData},
    },
    itertools::Itertools,
    primitive_types::{H160, H256},
    std::collections::HashSet,
};

/// A sequence of one or two pools connecting the token in to the token out.
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    pub hops: Vec<PoolPairData>,
    /// Largest amount the whole path can swap, for the kind it was built
    /// for.
    pub limit: f64,
}

impl Path {
    pub fn new(hops: Vec<PoolPairData>, kind: SwapKind) -> Self {
        let mut path = Self { hops, limit: 0. };
        path.limit = path.limit_amount(kind);
        path
    }

    pub fn pool_ids(&self) -> Vec<H256> {
        self.hops.iter().map(|hop| hop.pool_id).collect()
    }

    pub fn token_in(&self) -> H160 {
        self.hops[0].token_in
    }

    pub fn token_out(&self) -> H160 {
        self.hops[self.hops.len() - 1].token_out
    }

    /// Swap result of the path that refuses amounts above the limit: no
    /// output for exact in and an infinite input for exact out trades.
    pub fn bounded_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        if amount > self.limit {
            return match kind {
                SwapKind::ExactIn => 0.,
                SwapKind::ExactOut => f64::INFINITY,
            };
        }
        if amount <= 0. {
            return 0.;
        }
        self.swap(kind, amount)
    }

    /// Spot price after swap and its derivative for the whole path.
    pub fn price_and_derivative(&self, kind: SwapKind, amount: f64) -> (f64, f64) {
        match kind {
            SwapKind::ExactIn => {
                let mut hops = self.hops.iter();
                let Some(first) = hops.next() else {
                    return (f64::INFINITY, 0.);
                };
                let mut price = first.spot_price_after_swap(kind, amount);
                let mut derivative = first.derivative_spot_price_after_swap(kind, amount);
                let mut amount = first.output_given_input(amount);
                for hop in hops {
                    let hop_price = hop.spot_price_after_swap(kind, amount);
                    // d(amount)/d(input) is 1/price of the hops before
                    derivative = derivative * hop_price
                        + hop.derivative_spot_price_after_swap(kind, amount);
                    price *= hop_price;
                    amount = hop.output_given_input(amount);
                }
                (price, derivative)
            }
            SwapKind::ExactOut => {
                let mut hops = self.hops.iter().rev();
                let Some(last) = hops.next() else {
                    return (f64::INFINITY, 0.);
                };
                let mut price = last.spot_price_after_swap(kind, amount);
                let mut derivative = last.derivative_spot_price_after_swap(kind, amount);
                let mut amount = last.input_given_output(amount);
                for hop in hops {
                    let hop_price = hop.spot_price_after_swap(kind, amount);
                    // d(amount)/d(output) is the price of the hops after
                    derivative = hop.derivative_spot_price_after_swap(kind, amount) * price * price
                        + hop_price * derivative;
                    price *= hop_price;
                    amount = hop.input_given_output(amount);
                }
                (price, derivative)
            }
        }
    }
}

impl PairMath for Path {
    fn output_given_input(&self, amount: f64) -> f64 {
        self.hops
            .iter()
            .fold(amount, |amount, hop| hop.output_given_input(amount))
    }

    fn input_given_output(&self, amount: f64) -> f64 {
        self.hops
            .iter()
            .rev()
            .fold(amount, |amount, hop| hop.input_given_output(amount))
    }

    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        self.price_and_derivative(kind, amount).0
    }

    fn derivative_spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        self.price_and_derivative(kind, amount).1
    }

    /// Every hop's limit translated to the path's fixed side. Exact in caps
    /// are pulled back through the hops before, exact out caps pushed
    /// forward through the hops after.
    fn limit_amount(&self, kind: SwapKind) -> f64 {
        (0..self.hops.len())
            .map(|k| {
                let cap = self.hops[k].limit_amount(kind);
                match kind {
                    SwapKind::ExactIn => self.hops[..k]
                        .iter()
                        .rev()
                        .fold(cap, |amount, hop| hop.input_given_output(amount)),
                    SwapKind::ExactOut => self.hops[k + 1..]
                        .iter()
                        .fold(cap, |amount, hop| hop.output_given_input(amount)),
                }
            })
            .fold(f64::INFINITY, f64::min)
    }
}

/// Builds all direct and two hop paths between the tokens. Hops go through
/// `hop_tokens`, or through any intermediate token if none are given. Pools
/// that cannot price a pair they list are skipped.
pub fn candidate_paths(
    pools: &[Pool],
    token_in: H160,
    token_out: H160,
    kind: SwapKind,
    hop_tokens: &[H160],
    config: &Config,
) -> Result<Vec<Path>, Error> {
    let pair = |pool: &Pool, from: H160, to: H160| -> Result<Option<PoolPairData>, Error> {
        match pool.pair_data(from, to, config) {
            Err(Error::Unsupported(reason)) => {
                tracing::debug!(pool = ?pool.id(), reason, "skipping pair");
                Ok(None)
            }
            result => result,
        }
    };

    let mut paths = Vec::new();
    for pool in pools {
        if let Some(hop) = pair(pool, token_in, token_out)? {
            paths.push(Path::new(vec![hop], kind));
        }
    }

    let intermediates = pools
        .iter()
        .filter(|pool| pool.trades(token_in))
        .flat_map(|pool| {
            pool.common()
                .tokens
                .iter()
                .map(|token| token.address)
                .chain([pool.address()])
        })
        .filter(|token| *token != token_in && *token != token_out)
        .filter(|token| hop_tokens.is_empty() || hop_tokens.contains(token))
        .unique()
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    for middle in intermediates {
        for first in pools {
            let Some(first_hop) = pair(first, token_in, middle)? else {
                continue;
            };
            for second in pools.iter().filter(|pool| pool.id() != first.id()) {
                let Some(second_hop) = pair(second, middle, token_out)? else {
                    continue;
                };
                if seen.insert((first.id(), middle, second.id())) {
                    paths.push(Path::new(vec![first_hop.clone(), second_hop], kind));
                }
            }
        }
    }

    tracing::debug!(
        ?token_in,
        ?token_out,
        paths = paths.len(),
        "built candidate paths"
    );
    Ok(paths)
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::pools::{
            CommonPoolState,
            PairModel,
            PairType,
            PoolType,
            Token,
            WeightedPair,
            WeightedPool,
            tests::assert_close,
        },
        bigdecimal::BigDecimal,
        std::str::FromStr,
    };

    pub fn weighted_pool(id: u64, tokens: &[(u64, &str)], fee: &str) -> Pool {
        let weight = BigDecimal::from(1) / BigDecimal::from(tokens.len() as u64);
        Pool::Weighted(WeightedPool {
            common: CommonPoolState {
                id: H256::from_low_u64_be(id),
                address: H160::from_low_u64_be(0x1000 + id),
                swap_fee: BigDecimal::from_str(fee).unwrap(),
                total_shares: BigDecimal::from(1000),
                tokens: tokens
                    .iter()
                    .map(|(address, balance)| Token {
                        address: H160::from_low_u64_be(*address),
                        balance: BigDecimal::from_str(balance).unwrap(),
                        decimals: 18,
                        weight: Some(weight.clone()),
                        price_rate: None,
                    })
                    .collect(),
            },
        })
    }

    fn hop(id: u64, balance_in: f64, balance_out: f64) -> PoolPairData {
        PoolPairData {
            pool_id: H256::from_low_u64_be(id),
            pool_type: PoolType::Weighted,
            token_in: H160::from_low_u64_be(id),
            token_out: H160::from_low_u64_be(id + 1),
            decimals_in: 18,
            decimals_out: 18,
            pair_type: PairType::TokenToToken,
            model: PairModel::Weighted(WeightedPair {
                pair_type: PairType::TokenToToken,
                balance_in,
                balance_out,
                weight_in: 0.4,
                weight_out: 0.6,
                swap_fee: 0.002,
            }),
        }
    }

    #[test]
    fn composed_prices_match_finite_differences() {
        let path = Path::new(vec![hop(1, 300., 500.), hop(2, 800., 200.)], SwapKind::ExactIn);
        let h = 1e-5;
        let a = 12.;

        let marginal_out =
            (path.output_given_input(a + h) - path.output_given_input(a - h)) / (2. * h);
        let (price, derivative) = path.price_and_derivative(SwapKind::ExactIn, a);
        assert_close(price, 1. / marginal_out, 1e-6);
        let slope = (path.spot_price_after_swap(SwapKind::ExactIn, a + h)
            - path.spot_price_after_swap(SwapKind::ExactIn, a - h))
            / (2. * h);
        assert_close(derivative, slope, 1e-5);

        let marginal_in =
            (path.input_given_output(a + h) - path.input_given_output(a - h)) / (2. * h);
        let (price, derivative) = path.price_and_derivative(SwapKind::ExactOut, a);
        assert_close(price, marginal_in, 1e-6);
        let slope = (path.spot_price_after_swap(SwapKind::ExactOut, a + h)
            - path.spot_price_after_swap(SwapKind::ExactOut, a - h))
            / (2. * h);
        assert_close(derivative, slope, 1e-5);
    }

    #[test]
    fn limits_are_the_tightest_hop() {
        let path = Path::new(vec![hop(1, 300., 500.), hop(2, 20., 200.)], SwapKind::ExactIn);
        let first = hop(1, 300., 500.);
        // the second hop only takes 6 in, which the first hop outputs for
        // much less than its own cap of 90
        assert_close(path.limit, first.input_given_output(6.), 1e-12);
        assert!(path.limit < 90.);
        assert_eq!(path.bounded_swap(SwapKind::ExactIn, path.limit * 1.01), 0.);

        let path = Path::new(vec![hop(1, 300., 500.), hop(2, 20., 200.)], SwapKind::ExactOut);
        assert_close(path.limit, 60., 1e-12);
        assert_eq!(path.bounded_swap(SwapKind::ExactOut, 61.), f64::INFINITY);
    }

    #[test]
    fn builds_direct_and_two_hop_paths() {
        let (a, b, c) = (1, 2, 3);
        let pools = vec![
            weighted_pool(1, &[(a, "100"), (b, "100")], "0.003"),
            weighted_pool(2, &[(b, "100"), (c, "100")], "0.003"),
            weighted_pool(3, &[(a, "100"), (c, "100")], "0.003"),
            weighted_pool(4, &[(a, "100"), (b, "100"), (c, "100")], "0.003"),
        ];
        let (token_in, token_out) = (H160::from_low_u64_be(a), H160::from_low_u64_be(c));
        let paths = candidate_paths(
            &pools,
            token_in,
            token_out,
            SwapKind::ExactIn,
            &[],
            &Config::default(),
        )
        .unwrap();
        let ids = paths
            .iter()
            .map(|path| {
                path.pool_ids()
                    .iter()
                    .map(|id| id.to_low_u64_be())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![vec![3], vec![4], vec![1, 2], vec![1, 4], vec![4, 2]]
        );
        for path in &paths {
            assert_eq!(path.token_in(), token_in);
            assert_eq!(path.token_out(), token_out);
        }

        let restricted = candidate_paths(
            &pools,
            token_in,
            token_out,
            SwapKind::ExactIn,
            &[H160::from_low_u64_be(9)],
            &Config::default(),
        )
        .unwrap();
        assert_eq!(restricted.len(), 2);
    }
}
