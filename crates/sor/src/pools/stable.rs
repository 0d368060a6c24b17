//! Stable and meta stable pools. Both use the StableSwap invariant, meta
//! stable pools additionally scale every balance by its token's price rate.
//!
//! The routing approximation solves the invariant in `f64` and derives spot
//! prices numerically from the swap functions. Final amounts are computed
//! with [`crate::swap::stable_math`].

use {
    super::{
        PairIndices,
        PairMath,
        PairType,
        common::{CommonPoolState, MAX_IN_RATIO, MAX_OUT_RATIO},
        derivative,
    },
    crate::{
        Config,
        SwapKind,
        error::Error,
        metrics::{self, Computation},
        simulation::PoolBalances,
        swap::{
            self,
            TokenState,
            fixed_point::Bfp,
            stable_math,
        },
    },
    bigdecimal::BigDecimal,
    number::conversions::decimal_to_raw,
    primitive_types::U256,
    serde::Deserialize,
    serde_with::{DisplayFromStr, serde_as},
};

const MAX_INVARIANT_ITERATIONS: usize = 255;
const INVARIANT_CONVERGENCE: f64 = 1e-18;

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StablePool {
    #[serde(flatten)]
    pub common: CommonPoolState,
    #[serde_as(as = "DisplayFromStr")]
    pub amp: BigDecimal,
}

impl StablePool {
    pub fn validate(&self) -> Result<(), Error> {
        self.common.validate()?;
        if self.amp <= BigDecimal::default() {
            return Err(self.common.invalid("amplification must be positive"));
        }
        Ok(())
    }

    /// Builds the pair projection. With `rated` the balances are scaled by
    /// the token price rates.
    pub fn pair(
        &self,
        indices: PairIndices,
        config: &Config,
        rated: bool,
    ) -> Result<Option<StablePair>, Error> {
        let pair_type = indices.pair_type();
        if pair_type != PairType::TokenToToken && !config.allow_add_remove {
            return Ok(None);
        }
        let rate = |index: usize| -> Result<f64, Error> {
            if rated {
                self.common.price_rate_f64(index)
            } else {
                Ok(1.)
            }
        };
        let rates = (0..self.common.tokens.len())
            .map(rate)
            .collect::<Result<Vec<_>, _>>()?;
        let balances = (0..self.common.tokens.len())
            .map(|index| Ok(self.common.balance_f64(index)? * rates[index]))
            .collect::<Result<Vec<_>, Error>>()?;

        // Share token sides reuse the token index of the other side.
        let (token_in, token_out) = match (indices.token_in, indices.token_out) {
            (Some(i), Some(o)) => (i, o),
            (Some(i), None) => (i, i),
            (None, Some(o)) => (o, o),
            (None, None) => return Ok(None),
        };
        let amp = self.common.f64(&self.amp, "amp")?;
        let ann = amp * balances.len() as f64;
        Ok(Some(StablePair {
            pair_type,
            invariant: invariant(ann, &balances),
            ann,
            token_in,
            token_out,
            rate_in: indices.token_in.map_or(1., |index| rates[index]),
            rate_out: indices.token_out.map_or(1., |index| rates[index]),
            balances,
            swap_fee: self.common.swap_fee_f64()?,
            total_shares: self.common.total_shares_f64()?,
            infinitesimal: config.infinitesimal,
        }))
    }

    /// Executes a swap against the raw balances like the pool contract
    /// would. Returns the amount out for exact in swaps and the amount in
    /// otherwise.
    pub fn execute(
        &self,
        balances: &PoolBalances,
        indices: PairIndices,
        kind: SwapKind,
        amount: U256,
        rated: bool,
    ) -> Result<U256, Error> {
        let fee = self.common.swap_fee_bfp()?;
        // Scaled by the contracts' amplification precision of 1000.
        let amp = decimal_to_raw(&self.amp, 3).map_err(|err| self.common.invalid(err))?;
        let states = balances
            .balances
            .iter()
            .enumerate()
            .map(|(index, balance)| {
                if rated {
                    self.common.rated_token_state(index, *balance)
                } else {
                    self.common.token_state(index, *balance)
                }
            })
            .collect::<Result<Vec<TokenState>, _>>()?;
        let mut upscaled = states
            .iter()
            .map(TokenState::upscaled_balance)
            .collect::<Result<Vec<_>, _>>()?;
        let supply = Bfp::from_wei(balances.total_shares);

        let result = match (indices.token_in, indices.token_out, kind) {
            (Some(i), Some(o), SwapKind::ExactIn) => {
                let amount_in = swap::subtract_swap_fee_amount(amount, fee)?;
                let amount_out = stable_math::calc_out_given_in(
                    amp,
                    &mut upscaled,
                    i,
                    o,
                    states[i].upscale(amount_in)?,
                )?;
                states[o].downscale_down(amount_out)?
            }
            (Some(i), Some(o), SwapKind::ExactOut) => {
                let amount_in = stable_math::calc_in_given_out(
                    amp,
                    &mut upscaled,
                    i,
                    o,
                    states[o].upscale(amount)?,
                )?;
                swap::add_swap_fee_amount(states[i].downscale_up(amount_in)?, fee)?
            }
            (Some(i), None, SwapKind::ExactIn) => stable_math::calc_bpt_out_given_exact_token_in(
                amp,
                &upscaled,
                i,
                states[i].upscale(amount)?,
                supply,
                fee,
            )?
            .as_uint256(),
            (Some(i), None, SwapKind::ExactOut) => {
                let amount_in = stable_math::calc_token_in_given_exact_bpt_out(
                    amp,
                    &upscaled,
                    i,
                    Bfp::from_wei(amount),
                    supply,
                    fee,
                )?;
                states[i].downscale_up(amount_in)?
            }
            (None, Some(o), SwapKind::ExactIn) => {
                let amount_out = stable_math::calc_token_out_given_exact_bpt_in(
                    amp,
                    &upscaled,
                    o,
                    Bfp::from_wei(amount),
                    supply,
                    fee,
                )?;
                states[o].downscale_down(amount_out)?
            }
            (None, Some(o), SwapKind::ExactOut) => stable_math::calc_bpt_in_given_exact_token_out(
                amp,
                &upscaled,
                o,
                states[o].upscale(amount)?,
                supply,
                fee,
            )?
            .as_uint256(),
            (None, None, _) => return Err(self.common.invalid("share token swapped for itself")),
        };
        Ok(result)
    }
}

/// A stable pool seen from one trading direction. Balances are in units of
/// account, i.e. multiplied by the price rates. For pairs with the share
/// token, both token indices point at the token side.
#[derive(Clone, Debug, PartialEq)]
pub struct StablePair {
    pub pair_type: PairType,
    /// Amplification times the number of tokens.
    pub ann: f64,
    pub balances: Vec<f64>,
    pub invariant: f64,
    pub token_in: usize,
    pub token_out: usize,
    pub rate_in: f64,
    pub rate_out: f64,
    pub swap_fee: f64,
    pub total_shares: f64,
    pub infinitesimal: f64,
}

/// StableSwap invariant `D` by Newton iteration. Stopping at the iteration
/// cap is not an error, the last iterate is returned.
pub fn invariant(ann: f64, balances: &[f64]) -> f64 {
    let n = balances.len() as f64;
    let sum = balances.iter().sum::<f64>();
    if sum == 0. {
        return 0.;
    }

    let mut invariant = sum;
    for _ in 0..MAX_INVARIANT_ITERATIONS {
        let mut p_d = n * balances[0];
        for balance in &balances[1..] {
            p_d = p_d * balance * n / invariant;
        }
        let previous = invariant;
        invariant = (n * invariant * invariant + ann * sum * p_d)
            / ((n + 1.) * invariant + (ann - 1.) * p_d);
        // Iterates can oscillate in the last bit, which is as converged as
        // an f64 gets.
        let tolerance = INVARIANT_CONVERGENCE.max(previous.abs() * f64::EPSILON);
        if (invariant - previous).abs() <= tolerance {
            return invariant;
        }
    }
    metrics::non_convergence(Computation::StableInvariant, MAX_INVARIANT_ITERATIONS);
    invariant
}

/// Positive root `y` of `y^2 + (b - D) y - c = 0`.
fn solve_analytical_balance(b: f64, invariant: f64, c: f64) -> f64 {
    let root = if invariant >= b {
        let diff = invariant - b;
        diff + (diff * diff + 4. * c).sqrt()
    } else {
        let diff = b - invariant;
        (diff * diff + 4. * c).sqrt() - diff
    };
    root / 2.
}

/// Balance of `index` for which the pool has the given invariant, keeping
/// all other balances fixed.
fn balance_given_invariant(ann: f64, balances: &[f64], invariant: f64, index: usize) -> f64 {
    let n = balances.len() as f64;
    let mut sum = 0.;
    let mut c = invariant * invariant / (n * ann);
    for (i, balance) in balances.iter().enumerate() {
        if i != index {
            sum += balance;
            c = c * invariant / (n * balance);
        }
    }
    solve_analytical_balance(sum + invariant / ann, invariant, c)
}

impl StablePair {
    fn exact_token_in_for_token_out(&self, amount_in: f64) -> f64 {
        let mut balances = self.balances.clone();
        balances[self.token_in] += amount_in * (1. - self.swap_fee);
        let balance_out = balance_given_invariant(self.ann, &balances, self.invariant, self.token_out);
        (self.balances[self.token_out] - balance_out).max(0.)
    }

    fn token_in_for_exact_token_out(&self, amount_out: f64) -> f64 {
        if amount_out >= self.balances[self.token_out] {
            return f64::INFINITY;
        }
        let mut balances = self.balances.clone();
        balances[self.token_out] -= amount_out;
        let balance_in = balance_given_invariant(self.ann, &balances, self.invariant, self.token_in);
        (balance_in - self.balances[self.token_in]).max(0.) / (1. - self.swap_fee)
    }

    /// Share of the pool's value held in the token. Joins and exits pay the
    /// swap fee only on the part of the amount exceeding this share.
    fn weight(&self, index: usize) -> f64 {
        self.balances[index] / self.balances.iter().sum::<f64>()
    }

    fn exact_token_in_for_bpt_out(&self, amount_in: f64) -> f64 {
        let index = self.token_in;
        let taxable = amount_in * (1. - self.weight(index));
        let mut balances = self.balances.clone();
        balances[index] += amount_in - taxable * self.swap_fee;
        let ratio = invariant(self.ann, &balances) / self.invariant;
        (self.total_shares * (ratio - 1.)).max(0.)
    }

    fn token_in_for_exact_bpt_out(&self, bpt_out: f64) -> f64 {
        let index = self.token_in;
        let new_invariant = self.invariant * (self.total_shares + bpt_out) / self.total_shares;
        let balance = balance_given_invariant(self.ann, &self.balances, new_invariant, index);
        let without_fee = (balance - self.balances[index]).max(0.);
        let taxable = without_fee * (1. - self.weight(index));
        without_fee - taxable + taxable / (1. - self.swap_fee)
    }

    fn exact_bpt_in_for_token_out(&self, bpt_in: f64) -> f64 {
        if bpt_in >= self.total_shares {
            return self.balances[self.token_out];
        }
        let index = self.token_out;
        let new_invariant = self.invariant * (self.total_shares - bpt_in) / self.total_shares;
        let balance = balance_given_invariant(self.ann, &self.balances, new_invariant, index);
        let without_fee = (self.balances[index] - balance).max(0.);
        let taxable = without_fee * (1. - self.weight(index));
        without_fee - taxable * self.swap_fee
    }

    fn bpt_in_for_exact_token_out(&self, amount_out: f64) -> f64 {
        let index = self.token_out;
        let taxable = amount_out * (1. - self.weight(index));
        let with_fee = amount_out - taxable + taxable / (1. - self.swap_fee);
        if with_fee >= self.balances[index] {
            return f64::INFINITY;
        }
        let mut balances = self.balances.clone();
        balances[index] -= with_fee;
        let ratio = invariant(self.ann, &balances) / self.invariant;
        (self.total_shares * (1. - ratio)).max(0.)
    }
}

impl PairMath for StablePair {
    fn output_given_input(&self, amount: f64) -> f64 {
        // The invariant solve leaves rounding noise at zero.
        if amount <= 0. {
            return 0.;
        }
        match self.pair_type {
            PairType::TokenToToken => {
                self.exact_token_in_for_token_out(amount * self.rate_in) / self.rate_out
            }
            PairType::TokenToBpt => self.exact_token_in_for_bpt_out(amount * self.rate_in),
            PairType::BptToToken => self.exact_bpt_in_for_token_out(amount) / self.rate_out,
        }
    }

    fn input_given_output(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        match self.pair_type {
            PairType::TokenToToken => {
                self.token_in_for_exact_token_out(amount * self.rate_out) / self.rate_in
            }
            PairType::TokenToBpt => self.token_in_for_exact_bpt_out(amount) / self.rate_in,
            PairType::BptToToken => self.bpt_in_for_exact_token_out(amount * self.rate_out),
        }
    }

    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        match kind {
            SwapKind::ExactIn => {
                1. / derivative(|a| self.output_given_input(a), amount, self.infinitesimal)
            }
            SwapKind::ExactOut => {
                derivative(|a| self.input_given_output(a), amount, self.infinitesimal)
            }
        }
    }

    fn derivative_spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        derivative(
            |a| self.spot_price_after_swap(kind, a),
            amount,
            self.infinitesimal,
        )
    }

    fn limit_amount(&self, kind: SwapKind) -> f64 {
        let (balance_in, balance_out) = match self.pair_type {
            PairType::TokenToToken => (
                self.balances[self.token_in] / self.rate_in,
                self.balances[self.token_out] / self.rate_out,
            ),
            PairType::TokenToBpt => (self.balances[self.token_in] / self.rate_in, self.total_shares),
            PairType::BptToToken => (self.total_shares, self.balances[self.token_out] / self.rate_out),
        };
        if balance_in <= 0. || balance_out <= 0. {
            return 0.;
        }
        match (kind, self.pair_type) {
            // Token pairs are capped on the out side, expressed in the
            // amount in through the rates.
            (SwapKind::ExactIn, PairType::TokenToToken) => {
                balance_out * MAX_OUT_RATIO * self.rate_out / self.rate_in
            }
            (SwapKind::ExactIn, _) => balance_in * MAX_IN_RATIO,
            (SwapKind::ExactOut, _) => balance_out * MAX_OUT_RATIO,
        }
    }
}
