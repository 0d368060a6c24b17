//! Weighted pools: constant weighted product `Π B_i^w_i`. Token pairs and
//! joins/exits with a single token are priced in closed form.

use {
    super::{
        PairIndices,
        PairMath,
        PairType,
        common::{CommonPoolState, MAX_IN_RATIO, MAX_OUT_RATIO},
    },
    crate::{
        Config,
        SwapKind,
        error::Error,
        simulation::PoolBalances,
        swap::{self, fixed_point::Bfp, weighted_math},
    },
    primitive_types::U256,
    serde::Deserialize,
};

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WeightedPool {
    #[serde(flatten)]
    pub common: CommonPoolState,
}

impl WeightedPool {
    pub fn validate(&self) -> Result<(), Error> {
        self.common.validate()?;
        for weight in self.weights_f64()? {
            if !(weight > 0. && weight < 1.) {
                return Err(self.common.invalid(format!("weight {weight} outside of (0, 1)")));
            }
        }
        Ok(())
    }

    fn raw_weight(&self, index: usize) -> Result<&bigdecimal::BigDecimal, Error> {
        self.common.tokens[index]
            .weight
            .as_ref()
            .ok_or_else(|| Error::MissingField {
                pool: format!("{:?}", self.common.id),
                field: "weight",
            })
    }

    /// Weights normalized to sum up to one.
    fn weights_f64(&self) -> Result<Vec<f64>, Error> {
        let weights = (0..self.common.tokens.len())
            .map(|index| self.common.f64(self.raw_weight(index)?, "weight"))
            .collect::<Result<Vec<_>, _>>()?;
        let total = weights.iter().sum::<f64>();
        Ok(weights.into_iter().map(|weight| weight / total).collect())
    }

    fn weight_bfp(&self, index: usize) -> Result<Bfp, Error> {
        self.common.bfp(self.raw_weight(index)?, "weight")
    }

    pub fn pair(&self, indices: PairIndices, config: &Config) -> Result<Option<WeightedPair>, Error> {
        let pair_type = indices.pair_type();
        if pair_type != PairType::TokenToToken && !config.allow_add_remove {
            return Ok(None);
        }
        let weights = self.weights_f64()?;
        let side = |index: Option<usize>| -> Result<(f64, f64), Error> {
            match index {
                Some(index) => Ok((self.common.balance_f64(index)?, weights[index])),
                None => Ok((self.common.total_shares_f64()?, 1.)),
            }
        };
        let (balance_in, weight_in) = side(indices.token_in)?;
        let (balance_out, weight_out) = side(indices.token_out)?;
        Ok(Some(WeightedPair {
            pair_type,
            balance_in,
            balance_out,
            weight_in,
            weight_out,
            swap_fee: self.common.swap_fee_f64()?,
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
    ) -> Result<U256, Error> {
        let fee = self.common.swap_fee_bfp()?;
        let supply = Bfp::from_wei(balances.total_shares);
        let state = |index: usize| self.common.token_state(index, balances.balances[index]);
        let result = match (indices.token_in, indices.token_out, kind) {
            (Some(i), Some(o), SwapKind::ExactIn) => {
                let (token_in, token_out) = (state(i)?, state(o)?);
                let amount_in = swap::subtract_swap_fee_amount(amount, fee)?;
                let amount_out = weighted_math::calc_out_given_in(
                    token_in.upscaled_balance()?,
                    self.weight_bfp(i)?,
                    token_out.upscaled_balance()?,
                    self.weight_bfp(o)?,
                    token_in.upscale(amount_in)?,
                )?;
                token_out.downscale_down(amount_out)?
            }
            (Some(i), Some(o), SwapKind::ExactOut) => {
                let (token_in, token_out) = (state(i)?, state(o)?);
                let amount_in = weighted_math::calc_in_given_out(
                    token_in.upscaled_balance()?,
                    self.weight_bfp(i)?,
                    token_out.upscaled_balance()?,
                    self.weight_bfp(o)?,
                    token_out.upscale(amount)?,
                )?;
                swap::add_swap_fee_amount(token_in.downscale_up(amount_in)?, fee)?
            }
            (Some(i), None, SwapKind::ExactIn) => {
                let token = state(i)?;
                weighted_math::calc_bpt_out_given_exact_token_in(
                    token.upscaled_balance()?,
                    self.weight_bfp(i)?,
                    token.upscale(amount)?,
                    supply,
                    fee,
                )?
                .as_uint256()
            }
            (Some(i), None, SwapKind::ExactOut) => {
                let token = state(i)?;
                let amount_in = weighted_math::calc_token_in_given_exact_bpt_out(
                    token.upscaled_balance()?,
                    self.weight_bfp(i)?,
                    Bfp::from_wei(amount),
                    supply,
                    fee,
                )?;
                token.downscale_up(amount_in)?
            }
            (None, Some(o), SwapKind::ExactIn) => {
                let token = state(o)?;
                let amount_out = weighted_math::calc_token_out_given_exact_bpt_in(
                    token.upscaled_balance()?,
                    self.weight_bfp(o)?,
                    Bfp::from_wei(amount),
                    supply,
                    fee,
                )?;
                token.downscale_down(amount_out)?
            }
            (None, Some(o), SwapKind::ExactOut) => {
                let token = state(o)?;
                weighted_math::calc_bpt_in_given_exact_token_out(
                    token.upscaled_balance()?,
                    self.weight_bfp(o)?,
                    token.upscale(amount)?,
                    supply,
                    fee,
                )?
                .as_uint256()
            }
            (None, None, _) => return Err(self.common.invalid("share token swapped for itself")),
        };
        Ok(result)
    }
}

/// A weighted pool seen from one trading direction. For pairs with the
/// share token, that side carries the total supply as balance.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedPair {
    pub pair_type: PairType,
    pub balance_in: f64,
    pub balance_out: f64,
    pub weight_in: f64,
    pub weight_out: f64,
    pub swap_fee: f64,
}

impl WeightedPair {
    fn ratio(&self) -> f64 {
        self.weight_in / self.weight_out
    }

    /// Fee charged on a single token join, only the non-proportional part
    /// of the deposit is taxed.
    fn join_fee_factor(&self) -> f64 {
        1. - self.swap_fee * (1. - self.weight_in)
    }

    fn exit_fee_factor(&self) -> f64 {
        1. - self.swap_fee * (1. - self.weight_out)
    }

    fn spot_price_exact_in(&self, amount: f64) -> f64 {
        let (bi, bo) = (self.balance_in, self.balance_out);
        match self.pair_type {
            PairType::TokenToToken => {
                let (r, g) = (self.ratio(), 1. - self.swap_fee);
                (bi + g * amount).powf(1. + r) / (bo * r * g * bi.powf(r))
            }
            PairType::TokenToBpt => {
                let (w, c) = (self.weight_in, self.join_fee_factor());
                bi / (bo * w * c) * (1. + c * amount / bi).powf(1. - w)
            }
            PairType::BptToToken => {
                let (w, c) = (self.weight_out, self.exit_fee_factor());
                bi * w / (bo * c) * (1. - amount / bi).powf(1. - 1. / w)
            }
        }
    }

    fn spot_price_exact_out(&self, amount: f64) -> f64 {
        let (bi, bo) = (self.balance_in, self.balance_out);
        match self.pair_type {
            PairType::TokenToToken => {
                let (r, g) = (self.ratio(), 1. - self.swap_fee);
                bi * bo.powf(1. / r) / (g * r * (bo - amount).powf(1. / r + 1.))
            }
            PairType::TokenToBpt => {
                let (w, c) = (self.weight_in, self.join_fee_factor());
                bi / (c * w * bo) * (1. + amount / bo).powf(1. / w - 1.)
            }
            PairType::BptToToken => {
                let (w, c) = (self.weight_out, self.exit_fee_factor());
                bi * w * (1. - amount / (bo * c)).powf(w - 1.) / (bo * c)
            }
        }
    }

    fn derivative_exact_in(&self, amount: f64) -> f64 {
        let (bi, bo) = (self.balance_in, self.balance_out);
        match self.pair_type {
            PairType::TokenToToken => {
                let (r, g) = (self.ratio(), 1. - self.swap_fee);
                (1. + r) * (bi + g * amount).powf(r) / (bo * r * bi.powf(r))
            }
            PairType::TokenToBpt => {
                let (w, c) = (self.weight_in, self.join_fee_factor());
                (1. - w) / (bo * w) * (1. + c * amount / bi).powf(-w)
            }
            PairType::BptToToken => {
                let (w, c) = (self.weight_out, self.exit_fee_factor());
                (1. - w) / (bo * c) * (1. - amount / bi).powf(-1. / w)
            }
        }
    }

    fn derivative_exact_out(&self, amount: f64) -> f64 {
        let (bi, bo) = (self.balance_in, self.balance_out);
        match self.pair_type {
            PairType::TokenToToken => {
                let r = self.ratio();
                (1. / r + 1.) * self.spot_price_exact_out(amount) / (bo - amount)
            }
            PairType::TokenToBpt => {
                let (w, c) = (self.weight_in, self.join_fee_factor());
                bi / (c * w * bo) * (1. / w - 1.) / bo * (1. + amount / bo).powf(1. / w - 2.)
            }
            PairType::BptToToken => {
                let (w, c) = (self.weight_out, self.exit_fee_factor());
                bi * w * (1. - w) * (1. - amount / (bo * c)).powf(w - 2.) / (bo * c).powi(2)
            }
        }
    }
}

impl PairMath for WeightedPair {
    fn output_given_input(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        let (bi, bo) = (self.balance_in, self.balance_out);
        match self.pair_type {
            PairType::TokenToToken => {
                let g = 1. - self.swap_fee;
                bo * (1. - (bi / (bi + g * amount)).powf(self.ratio()))
            }
            PairType::TokenToBpt => {
                let c = self.join_fee_factor();
                bo * ((1. + c * amount / bi).powf(self.weight_in) - 1.)
            }
            PairType::BptToToken => {
                let remaining = (1. - amount / bi).max(0.);
                bo * (1. - remaining.powf(1. / self.weight_out)) * self.exit_fee_factor()
            }
        }
    }

    fn input_given_output(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        let (bi, bo) = (self.balance_in, self.balance_out);
        match self.pair_type {
            PairType::TokenToToken => {
                if amount >= bo {
                    return f64::INFINITY;
                }
                let g = 1. - self.swap_fee;
                bi * ((bo / (bo - amount)).powf(1. / self.ratio()) - 1.) / g
            }
            PairType::TokenToBpt => {
                let c = self.join_fee_factor();
                bi * ((1. + amount / bo).powf(1. / self.weight_in) - 1.) / c
            }
            PairType::BptToToken => {
                let taken = amount / (bo * self.exit_fee_factor());
                if taken >= 1. {
                    return f64::INFINITY;
                }
                bi * (1. - (1. - taken).powf(self.weight_out))
            }
        }
    }

    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        match kind {
            SwapKind::ExactIn => self.spot_price_exact_in(amount),
            SwapKind::ExactOut => self.spot_price_exact_out(amount),
        }
    }

    fn derivative_spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        match kind {
            SwapKind::ExactIn => self.derivative_exact_in(amount),
            SwapKind::ExactOut => self.derivative_exact_out(amount),
        }
    }

    fn limit_amount(&self, kind: SwapKind) -> f64 {
        // Nothing can be traded through an empty side.
        if self.balance_in <= 0. || self.balance_out <= 0. {
            return 0.;
        }
        match kind {
            SwapKind::ExactIn => self.balance_in * MAX_IN_RATIO,
            SwapKind::ExactOut => self.balance_out * MAX_OUT_RATIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::pools::tests::assert_close};

    fn pair(pair_type: PairType) -> WeightedPair {
        WeightedPair {
            pair_type,
            balance_in: 100.,
            balance_out: 100.,
            weight_in: 0.5,
            weight_out: 0.5,
            swap_fee: 0.003,
        }
    }

    #[test]
    fn token_to_token_closed_forms() {
        let pair = pair(PairType::TokenToToken);
        let out = pair.output_given_input(10.);
        assert_close(out, 9.066108938801491, 1e-12);
        assert_close(pair.input_given_output(out), 10., 1e-12);
        assert_close(pair.spot_price(), 1. / 0.997, 1e-12);
        assert_eq!(pair.input_given_output(100.), f64::INFINITY);
        assert_eq!(pair.limit_amount(SwapKind::ExactIn), 30.);
    }

    #[test]
    fn spot_price_is_the_marginal_rate() {
        let h = 1e-6;
        for pair_type in [PairType::TokenToToken, PairType::TokenToBpt, PairType::BptToToken] {
            let pair = WeightedPair {
                balance_out: 250.,
                weight_in: 0.8,
                weight_out: 0.2,
                ..pair(pair_type)
            };
            let marginal_out =
                (pair.output_given_input(5. + h) - pair.output_given_input(5. - h)) / (2. * h);
            assert_close(
                pair.spot_price_after_swap(SwapKind::ExactIn, 5.),
                1. / marginal_out,
                1e-6,
            );
            let marginal_in =
                (pair.input_given_output(5. + h) - pair.input_given_output(5. - h)) / (2. * h);
            assert_close(
                pair.spot_price_after_swap(SwapKind::ExactOut, 5.),
                marginal_in,
                1e-6,
            );
        }
    }

    #[test]
    fn derivatives_match_spot_price_slopes() {
        let h = 1e-5;
        for pair_type in [PairType::TokenToToken, PairType::TokenToBpt, PairType::BptToToken] {
            let pair = WeightedPair {
                balance_in: 300.,
                weight_in: 0.6,
                weight_out: 0.4,
                ..pair(pair_type)
            };
            for kind in [SwapKind::ExactIn, SwapKind::ExactOut] {
                let slope = (pair.spot_price_after_swap(kind, 7. + h)
                    - pair.spot_price_after_swap(kind, 7. - h))
                    / (2. * h);
                assert_close(pair.derivative_spot_price_after_swap(kind, 7.), slope, 1e-5);
            }
        }
    }

    #[test]
    fn joins_and_exits_invert() {
        let join = pair(PairType::TokenToBpt);
        let shares = join.output_given_input(10.);
        assert!(shares > 0. && shares < 10.);
        assert_close(join.input_given_output(shares), 10., 1e-12);

        let exit = pair(PairType::BptToToken);
        let tokens = exit.output_given_input(10.);
        assert_close(exit.input_given_output(tokens), 10., 1e-12);
        assert_eq!(exit.input_given_output(100.), f64::INFINITY);
    }

    #[test]
    fn zero_amounts_swap_nothing() {
        for pair_type in [PairType::TokenToToken, PairType::TokenToBpt, PairType::BptToToken] {
            let pair = pair(pair_type);
            assert_eq!(pair.output_given_input(0.), 0.);
            assert_eq!(pair.input_given_output(0.), 0.);
        }
    }

    #[test]
    fn outputs_and_prices_grow_with_the_amount() {
        for pair_type in [PairType::TokenToToken, PairType::TokenToBpt, PairType::BptToToken] {
            let pair = pair(pair_type);
            let mut out = 0.;
            let mut price = pair.spot_price();
            for amount in [1., 5., 10., 20., 30.] {
                let next_out = pair.output_given_input(amount);
                let next_price = pair.spot_price_after_swap(SwapKind::ExactIn, amount);
                assert!(next_out > out, "{pair_type:?} {amount}");
                assert!(next_price > price, "{pair_type:?} {amount}");
                (out, price) = (next_out, next_price);
            }
        }
    }

    #[test]
    fn empty_sides_have_no_limit() {
        let drained = WeightedPair {
            balance_out: 0.,
            ..pair(PairType::TokenToToken)
        };
        assert_eq!(drained.limit_amount(SwapKind::ExactIn), 0.);
        assert_eq!(drained.limit_amount(SwapKind::ExactOut), 0.);
        assert_eq!(drained.output_given_input(1.), 0.);
    }
}
