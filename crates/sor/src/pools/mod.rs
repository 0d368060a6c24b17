//! Pool snapshots and the per pool type pricing engines.
//!
//! A [`Pool`] is projected onto a trading direction as [`PoolPairData`],
//! which prices trades in token units with `f64` math for the route search
//! ([`PairMath`]). The same pools execute swaps on raw integer balances with
//! the on-chain math to produce the final amounts ([`Pool::execute`]).

use {
    crate::{
        Config,
        SwapKind,
        error::Error,
        metrics::{self, Computation},
        simulation::PoolBalances,
    },
    primitive_types::{H160, H256, U256},
    serde::Deserialize,
};

pub mod common;
pub mod element;
pub mod linear;
pub mod stable;
pub mod weighted;

pub use self::{
    common::{BPT_DECIMALS, CommonPoolState, Token},
    element::{ElementPair, ElementPool},
    linear::{LinearPair, LinearPairKind, LinearPool},
    stable::{StablePair, StablePool},
    weighted::{WeightedPair, WeightedPool},
};

/// Pool snapshot as consumed by the router, tagged by `poolType`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "poolType")]
pub enum Pool {
    Weighted(WeightedPool),
    Stable(StablePool),
    MetaStable(StablePool),
    Linear(LinearPool),
    Element(ElementPool),
}

/// The pools a quote is computed over.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Snapshot {
    pub pools: Vec<Pool>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum PoolType {
    Weighted,
    Stable,
    MetaStable,
    Linear,
    Element,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PairType {
    TokenToToken,
    TokenToBpt,
    BptToToken,
}

/// Positions of a pair's tokens in the pool, `None` standing for the pool's
/// own share token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PairIndices {
    pub token_in: Option<usize>,
    pub token_out: Option<usize>,
}

impl PairIndices {
    pub fn pair_type(&self) -> PairType {
        match (self.token_in, self.token_out) {
            (None, _) => PairType::BptToToken,
            (_, None) => PairType::TokenToBpt,
            _ => PairType::TokenToToken,
        }
    }
}

impl Pool {
    pub fn common(&self) -> &CommonPoolState {
        match self {
            Pool::Weighted(pool) => &pool.common,
            Pool::Stable(pool) | Pool::MetaStable(pool) => &pool.common,
            Pool::Linear(pool) => &pool.common,
            Pool::Element(pool) => &pool.common,
        }
    }

    pub fn id(&self) -> H256 {
        self.common().id
    }

    /// Address of the pool, which is also its share token.
    pub fn address(&self) -> H160 {
        self.common().address
    }

    pub fn pool_type(&self) -> PoolType {
        match self {
            Pool::Weighted(_) => PoolType::Weighted,
            Pool::Stable(_) => PoolType::Stable,
            Pool::MetaStable(_) => PoolType::MetaStable,
            Pool::Linear(_) => PoolType::Linear,
            Pool::Element(_) => PoolType::Element,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Pool::Weighted(pool) => pool.validate(),
            Pool::Stable(pool) | Pool::MetaStable(pool) => pool.validate(),
            Pool::Linear(pool) => pool.validate(),
            Pool::Element(pool) => pool.validate(),
        }
    }

    /// Whether `token` can be traded with this pool, including its share
    /// token.
    pub fn trades(&self, token: H160) -> bool {
        token == self.address() || self.common().token_index(token).is_some()
    }

    pub fn pair_indices(&self, token_in: H160, token_out: H160) -> Option<PairIndices> {
        if token_in == token_out {
            return None;
        }
        let common = self.common();
        let position = |token: H160| {
            if token == common.address {
                Some(None)
            } else {
                common.token_index(token).map(Some)
            }
        };
        Some(PairIndices {
            token_in: position(token_in)?,
            token_out: position(token_out)?,
        })
    }

    /// Projects the pool onto a trading direction. Returns `None` if the
    /// pool does not offer the pair, e.g. joins and exits while they are
    /// disabled.
    pub fn pair_data(
        &self,
        token_in: H160,
        token_out: H160,
        config: &Config,
    ) -> Result<Option<PoolPairData>, Error> {
        let Some(indices) = self.pair_indices(token_in, token_out) else {
            return Ok(None);
        };
        let model = match self {
            Pool::Weighted(pool) => pool.pair(indices, config)?.map(PairModel::Weighted),
            Pool::Stable(pool) => pool.pair(indices, config, false)?.map(PairModel::Stable),
            Pool::MetaStable(pool) => pool.pair(indices, config, true)?.map(PairModel::Stable),
            Pool::Linear(pool) => pool.pair(indices)?.map(PairModel::Linear),
            Pool::Element(pool) => pool
                .pair(indices, config.current_timestamp)?
                .map(PairModel::Element),
        };
        let Some(model) = model else {
            return Ok(None);
        };
        let decimals = |index: Option<usize>| {
            index.map_or(BPT_DECIMALS, |index| self.common().tokens[index].decimals)
        };
        Ok(Some(PoolPairData {
            pool_id: self.id(),
            pool_type: self.pool_type(),
            token_in,
            token_out,
            decimals_in: decimals(indices.token_in),
            decimals_out: decimals(indices.token_out),
            pair_type: indices.pair_type(),
            model,
        }))
    }

    /// Raw balances of the snapshot, the starting point of a simulation.
    pub fn initial_balances(&self) -> Result<PoolBalances, Error> {
        let (balances, total_shares) = self.common().raw_balances()?;
        Ok(PoolBalances {
            balances,
            total_shares,
        })
    }

    /// Executes a swap on `balances` with the on-chain math and updates them.
    /// Returns the amount out for exact in swaps and the amount in for exact
    /// out swaps.
    pub fn execute(
        &self,
        balances: &mut PoolBalances,
        token_in: H160,
        token_out: H160,
        kind: SwapKind,
        amount: U256,
        now: u64,
    ) -> Result<U256, Error> {
        let indices = self.pair_indices(token_in, token_out).ok_or_else(|| {
            match [token_in, token_out]
                .into_iter()
                .find(|token| !self.trades(*token))
            {
                Some(token) => Error::TokenNotInPool {
                    pool: format!("{:?}", self.id()),
                    token,
                },
                None => self.common().invalid("token swapped for itself"),
            }
        })?;
        let computed = match self {
            Pool::Weighted(pool) => pool.execute(balances, indices, kind, amount)?,
            Pool::Stable(pool) => pool.execute(balances, indices, kind, amount, false)?,
            Pool::MetaStable(pool) => pool.execute(balances, indices, kind, amount, true)?,
            Pool::Linear(pool) => pool.execute(balances, indices, kind, amount)?,
            Pool::Element(pool) => pool.execute(balances, indices, kind, amount, now)?,
        };
        let (amount_in, amount_out) = match kind {
            SwapKind::ExactIn => (amount, computed),
            SwapKind::ExactOut => (computed, amount),
        };
        balances.settle(indices, amount_in, amount_out)?;
        tracing::trace!(
            pool = ?self.id(), ?token_in, ?token_out, %amount_in, %amount_out, "executed swap"
        );
        Ok(computed)
    }
}

/// The pricing functions every pool type provides for a trading direction,
/// in token units. Spot prices are amounts in per amount out.
pub trait PairMath {
    fn output_given_input(&self, amount: f64) -> f64;

    /// Infinite if the pool cannot provide `amount`.
    fn input_given_output(&self, amount: f64) -> f64;

    /// Marginal price once a trade of `amount` has been executed. `amount`
    /// is the amount in for exact in trades and the amount out otherwise.
    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64;

    fn derivative_spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64;

    /// Largest amount a single trade may swap, in the amount's token.
    fn limit_amount(&self, kind: SwapKind) -> f64;

    fn spot_price(&self) -> f64 {
        self.spot_price_after_swap(SwapKind::ExactIn, 0.)
    }

    /// The amount out for exact in trades and the amount in otherwise.
    fn swap(&self, kind: SwapKind, amount: f64) -> f64 {
        match kind {
            SwapKind::ExactIn => self.output_given_input(amount),
            SwapKind::ExactOut => self.input_given_output(amount),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PairModel {
    Weighted(WeightedPair),
    Stable(StablePair),
    Linear(LinearPair),
    Element(ElementPair),
}

/// A pool projected onto one trading direction.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolPairData {
    pub pool_id: H256,
    pub pool_type: PoolType,
    pub token_in: H160,
    pub token_out: H160,
    pub decimals_in: u8,
    pub decimals_out: u8,
    pub pair_type: PairType,
    pub model: PairModel,
}

impl PoolPairData {
    fn math(&self) -> &dyn PairMath {
        match &self.model {
            PairModel::Weighted(pair) => pair,
            PairModel::Stable(pair) => pair,
            PairModel::Linear(pair) => pair,
            PairModel::Element(pair) => pair,
        }
    }
}

impl PairMath for PoolPairData {
    fn output_given_input(&self, amount: f64) -> f64 {
        self.math().output_given_input(amount)
    }

    fn input_given_output(&self, amount: f64) -> f64 {
        self.math().input_given_output(amount)
    }

    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        self.math().spot_price_after_swap(kind, amount)
    }

    fn derivative_spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        self.math().derivative_spot_price_after_swap(kind, amount)
    }

    fn limit_amount(&self, kind: SwapKind) -> f64 {
        self.math().limit_amount(kind)
    }
}

const MAX_DERIVATIVE_ITERATIONS: usize = 255;
const DERIVATIVE_TOLERANCE: f64 = 0.0001;

/// Forward difference slope of `f` at `amount`. The step starts at `amount`
/// (at least `infinitesimal`) and is halved until two consecutive slopes
/// differ by less than 0.01%.
pub fn derivative(f: impl Fn(f64) -> f64, amount: f64, infinitesimal: f64) -> f64 {
    let at = f(amount);
    let mut delta = amount.max(infinitesimal);
    let mut slope = (f(amount + delta) - at) / delta;
    for _ in 0..MAX_DERIVATIVE_ITERATIONS {
        delta /= 2.;
        let next = (f(amount + delta) - at) / delta;
        if next == slope || ((next - slope) / slope).abs() < DERIVATIVE_TOLERANCE {
            return next;
        }
        slope = next;
    }
    metrics::non_convergence(Computation::NumericalDerivative, MAX_DERIVATIVE_ITERATIONS);
    slope
}

#[cfg(test)]
pub(crate) mod tests {
    use {super::*, std::str::FromStr};

    pub fn assert_close(actual: f64, expected: f64, relative: f64) {
        assert!(
            ((actual - expected) / expected).abs() < relative,
            "{actual} is not within {relative} of {expected}"
        );
    }

    #[test]
    fn numerical_derivative() {
        assert_close(derivative(|x| x * x, 3., 1e-6), 6., 1e-4);
        assert_close(derivative(|x| x.exp(), 0., 1e-6), 1., 1e-4);
        assert_eq!(derivative(|x| 2. * x, 0., 1e-6), 2.);
    }

    fn snapshot() -> &'static str {
        r#"[
            {
                "poolType": "Weighted",
                "id": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "address": "0x0000000000000000000000000000000000000100",
                "swapFee": "0.003",
                "totalShares": "100",
                "tokens": [
                    {
                        "address": "0x0000000000000000000000000000000000000001",
                        "balance": "100",
                        "decimals": 18,
                        "weight": "0.5"
                    },
                    {
                        "address": "0x0000000000000000000000000000000000000002",
                        "balance": "100",
                        "decimals": 6,
                        "weight": "0.5"
                    }
                ]
            },
            {
                "poolType": "MetaStable",
                "id": "0x0000000000000000000000000000000000000000000000000000000000000002",
                "address": "0x0000000000000000000000000000000000000200",
                "swapFee": "0.0004",
                "totalShares": "2000",
                "amp": "50",
                "tokens": [
                    {
                        "address": "0x0000000000000000000000000000000000000001",
                        "balance": "1000",
                        "decimals": 18,
                        "priceRate": "1.05"
                    },
                    {
                        "address": "0x0000000000000000000000000000000000000003",
                        "balance": "1050",
                        "decimals": 18
                    }
                ]
            }
        ]"#
    }

    #[test]
    fn deserializes_snapshots() {
        let pools: Vec<Pool> = serde_json::from_str(snapshot()).unwrap();
        let wrapped: Snapshot =
            serde_json::from_str(&format!(r#"{{ "pools": {} }}"#, snapshot())).unwrap();
        assert_eq!(wrapped.pools, pools);
        assert_eq!(pools[0].pool_type(), PoolType::Weighted);
        assert_eq!(pools[1].pool_type(), PoolType::MetaStable);
        assert_eq!(pools[1].address(), H160::from_low_u64_be(0x200));
        let Pool::MetaStable(stable) = &pools[1] else {
            panic!("unexpected pool type");
        };
        assert_eq!(
            stable.common.tokens[0].price_rate,
            Some(bigdecimal::BigDecimal::from_str("1.05").unwrap())
        );
        for pool in &pools {
            pool.validate().unwrap();
        }
    }

    #[test]
    fn pair_data_respects_add_remove_flag() {
        let pools: Vec<Pool> = serde_json::from_str(snapshot()).unwrap();
        let (a, b, bpt) = (
            H160::from_low_u64_be(1),
            H160::from_low_u64_be(2),
            H160::from_low_u64_be(0x100),
        );
        let config = Config::default();
        let pair = pools[0].pair_data(a, b, &config).unwrap().unwrap();
        assert_eq!(pair.pair_type, PairType::TokenToToken);
        assert_eq!((pair.decimals_in, pair.decimals_out), (18, 6));
        assert_close(pair.output_given_input(10.), 9.066108938801491, 1e-12);

        assert!(pools[0].pair_data(a, bpt, &config).unwrap().is_none());
        assert!(pools[0].pair_data(a, H160::from_low_u64_be(3), &config).unwrap().is_none());
        assert!(pools[0].pair_data(a, a, &config).unwrap().is_none());

        let config = Config {
            allow_add_remove: true,
            ..Default::default()
        };
        let join = pools[0].pair_data(a, bpt, &config).unwrap().unwrap();
        assert_eq!(join.pair_type, PairType::TokenToBpt);
        assert_eq!(join.decimals_out, BPT_DECIMALS);
    }

    #[test]
    fn executes_and_settles_swaps() {
        let pools: Vec<Pool> = serde_json::from_str(snapshot()).unwrap();
        let (a, b) = (H160::from_low_u64_be(1), H160::from_low_u64_be(2));
        let mut balances = pools[0].initial_balances().unwrap();
        let amount_in = U256::exp10(19);
        let out = pools[0]
            .execute(&mut balances, a, b, SwapKind::ExactIn, amount_in, 0)
            .unwrap();
        // 9.066108 with 6 decimals, rounded down
        assert!(out >= U256::from(9_066_100) && out <= U256::from(9_066_109), "{out}");
        assert_eq!(balances.balances[0], U256::exp10(20) + amount_in);
        assert_eq!(balances.balances[1], U256::exp10(8) - out);

        let rated = pools[1]
            .pair_data(a, H160::from_low_u64_be(3), &Config::default())
            .unwrap()
            .unwrap();
        // small trades in a balanced meta stable pool trade at the rate
        assert_close(rated.swap(SwapKind::ExactIn, 1.), 1.05, 1e-3);
        assert_close(1. / rated.swap(SwapKind::ExactOut, 1.), 1.05, 1e-3);

        let unknown = H160::from_low_u64_be(9);
        assert!(matches!(
            pools[0].execute(&mut balances, a, unknown, SwapKind::ExactIn, amount_in, 0),
            Err(Error::TokenNotInPool { token, .. }) if token == unknown
        ));
    }
}
