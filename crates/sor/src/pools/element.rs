//! Element convergent curve pools trading a principal token against its
//! base token. The curve flattens into a constant sum as expiry nears. The
//! principal reserve is virtually increased by the pool's share supply.

use {
    super::{
        PairIndices,
        PairMath,
        common::{CommonPoolState, MAX_IN_RATIO, MAX_OUT_RATIO},
    },
    crate::{
        SwapKind,
        error::Error,
        simulation::PoolBalances,
        swap::{element_math, fixed_point::Bfp},
    },
    primitive_types::{H160, U256},
    serde::Deserialize,
};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementPool {
    #[serde(flatten)]
    pub common: CommonPoolState,
    /// Unix timestamp at which the principal token matures.
    pub expiry_time: u64,
    /// Seconds of one unit of the curve's time stretch.
    pub unit_seconds: u64,
    pub principal_token: H160,
    pub base_token: H160,
}

pub const UNSUPPORTED_JOIN_EXIT: &str = "Element pool does not support SOR add/remove liquidity";

impl ElementPool {
    pub fn validate(&self) -> Result<(), Error> {
        self.common.validate()?;
        if self.unit_seconds == 0 {
            return Err(self.common.invalid("unit seconds must be positive"));
        }
        if self.principal_token == self.base_token {
            return Err(self.common.invalid("principal and base token coincide"));
        }
        self.common.index_of(self.principal_token)?;
        self.common.index_of(self.base_token)?;
        Ok(())
    }

    fn seconds_to_expiry(&self, now: u64) -> u64 {
        self.expiry_time.saturating_sub(now)
    }

    /// Exponent `1 - t` of the curve, `t` being the remaining term in units.
    fn exponent(&self, now: u64) -> Result<f64, Error> {
        let t = self.seconds_to_expiry(now) as f64 / self.unit_seconds as f64;
        if t >= 1. {
            return Err(self.common.invalid("term to expiry exceeds the time stretch"));
        }
        Ok(1. - t)
    }

    fn trading_pair(&self, indices: PairIndices) -> Result<(usize, usize), Error> {
        match (indices.token_in, indices.token_out) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err(Error::Unsupported(UNSUPPORTED_JOIN_EXIT)),
        }
    }

    fn is_principal(&self, index: usize) -> bool {
        self.common.tokens[index].address == self.principal_token
    }

    pub fn pair(&self, indices: PairIndices, now: u64) -> Result<Option<ElementPair>, Error> {
        let (token_in, token_out) = self.trading_pair(indices)?;
        let shares = self.common.total_shares_f64()?;
        let real_balance_in = self.common.balance_f64(token_in)?;
        let real_balance_out = self.common.balance_f64(token_out)?;
        let principal_in = self.is_principal(token_in);
        Ok(Some(ElementPair {
            balance_in: real_balance_in + if principal_in { shares } else { 0. },
            balance_out: real_balance_out + if principal_in { 0. } else { shares },
            real_balance_in,
            real_balance_out,
            principal_in,
            swap_fee: self.common.swap_fee_f64()?,
            exponent: self.exponent(now)?,
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
        now: u64,
    ) -> Result<U256, Error> {
        let (i, o) = self.trading_pair(indices)?;
        let fee = self.common.swap_fee_bfp()?;
        let a = element_math::curve_exponent(self.seconds_to_expiry(now), self.unit_seconds)?;
        let token_in = self.common.token_state(i, balances.balances[i])?;
        let token_out = self.common.token_state(o, balances.balances[o])?;
        let shares = Bfp::from_wei(balances.total_shares);
        let reserve = |index: usize, upscaled: Bfp| {
            if self.is_principal(index) {
                upscaled.add(shares)
            } else {
                Ok(upscaled)
            }
        };
        let reserve_in = reserve(i, token_in.upscaled_balance()?)?;
        let reserve_out = reserve(o, token_out.upscaled_balance()?)?;
        let principal_out = self.is_principal(o);

        let result = match kind {
            SwapKind::ExactIn => {
                let amount_in = token_in.upscale(amount)?;
                let amount_out =
                    element_math::solve_trade_invariant(amount_in, reserve_in, reserve_out, true, a)?;
                token_out.downscale_down(element_math::assign_trade_fee(
                    amount_in,
                    amount_out,
                    principal_out,
                    true,
                    fee,
                )?)?
            }
            SwapKind::ExactOut => {
                let amount_out = token_out.upscale(amount)?;
                let amount_in = element_math::solve_trade_invariant(
                    amount_out,
                    reserve_out,
                    reserve_in,
                    false,
                    a,
                )?;
                token_in.downscale_up(element_math::assign_trade_fee(
                    amount_in,
                    amount_out,
                    principal_out,
                    false,
                    fee,
                )?)?
            }
        };
        Ok(result)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementPair {
    /// Reserves on the curve, the principal side includes the share supply.
    pub balance_in: f64,
    pub balance_out: f64,
    pub real_balance_in: f64,
    pub real_balance_out: f64,
    pub principal_in: bool,
    pub swap_fee: f64,
    pub exponent: f64,
}

impl ElementPair {
    /// Amount out on the curve without fees and its first two derivatives.
    fn curve_out(&self, amount: f64) -> (f64, f64, f64) {
        let (bi, bo, u) = (self.balance_in, self.balance_out, self.exponent);
        let s = 1. / u - 1.;
        let y = bi + amount;
        let k = (bi.powf(u) + bo.powf(u) - y.powf(u)).max(0.);
        let out = bo - k.powf(1. / u);
        let first = k.powf(s) * y.powf(u - 1.);
        let second = (u - 1.) * (k.powf(s - 1.) * y.powf(2. * u - 2.) + k.powf(s) * y.powf(u - 2.));
        (out, first, second)
    }

    /// Amount in on the curve without fees and its first two derivatives.
    fn curve_in(&self, amount: f64) -> (f64, f64, f64) {
        let (bi, bo, u) = (self.balance_in, self.balance_out, self.exponent);
        let s = 1. / u - 1.;
        let z = bo - amount;
        let r = bi.powf(u) + bo.powf(u) - z.powf(u);
        let amount_in = r.powf(1. / u) - bi;
        let first = r.powf(s) * z.powf(u - 1.);
        let second = (1. - u) * (r.powf(s - 1.) * z.powf(2. * u - 2.) + r.powf(s) * z.powf(u - 2.));
        (amount_in, first, second)
    }

    /// The fee is charged on the implied yield, the difference between the
    /// principal and the base amount of a trade. Returns the multiplier of
    /// the curve amount and the multiplier of the exact amount.
    fn fee_terms(&self, fee_applies: bool) -> (f64, f64) {
        match (fee_applies, self.principal_in) {
            (false, _) => (1., 0.),
            (true, false) => (1. - self.swap_fee, self.swap_fee),
            (true, true) => (1. + self.swap_fee, -self.swap_fee),
        }
    }

    fn exact_in(&self, amount: f64) -> (f64, f64, f64) {
        let (q, q1, q2) = self.curve_out(amount);
        let yields = if self.principal_in { amount > q } else { q > amount };
        let (factor, offset) = self.fee_terms(yields);
        (factor * q + offset * amount, factor * q1 + offset, factor * q2)
    }

    fn exact_out(&self, amount: f64) -> (f64, f64, f64) {
        let (p, p1, p2) = self.curve_in(amount);
        let yields = if self.principal_in { p > amount } else { amount > p };
        let (factor, offset) = self.fee_terms(yields);
        (factor * p + offset * amount, factor * p1 + offset, factor * p2)
    }
}

impl PairMath for ElementPair {
    fn output_given_input(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        self.exact_in(amount).0.max(0.)
    }

    fn input_given_output(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        if amount >= self.balance_out {
            return f64::INFINITY;
        }
        self.exact_out(amount).0
    }

    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        match kind {
            SwapKind::ExactIn => 1. / self.exact_in(amount).1,
            SwapKind::ExactOut => self.exact_out(amount).1,
        }
    }

    fn derivative_spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        match kind {
            SwapKind::ExactIn => {
                let (_, first, second) = self.exact_in(amount);
                -second / (first * first)
            }
            SwapKind::ExactOut => self.exact_out(amount).2,
        }
    }

    fn limit_amount(&self, kind: SwapKind) -> f64 {
        if self.real_balance_in <= 0. || self.real_balance_out <= 0. {
            return 0.;
        }
        match kind {
            SwapKind::ExactIn => self.real_balance_in * MAX_IN_RATIO,
            SwapKind::ExactOut => self.real_balance_out * MAX_OUT_RATIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::pools::tests::assert_close};

    fn pair(principal_in: bool, swap_fee: f64) -> ElementPair {
        let (base, principal) = (1000., 1100.);
        let shares = 500.;
        let (real_in, real_out) = if principal_in { (principal, base) } else { (base, principal) };
        ElementPair {
            balance_in: real_in + if principal_in { shares } else { 0. },
            balance_out: real_out + if principal_in { 0. } else { shares },
            real_balance_in: real_in,
            real_balance_out: real_out,
            principal_in,
            swap_fee,
            exponent: 0.9,
        }
    }

    #[test]
    fn expired_curve_trades_one_to_one() {
        let pair = ElementPair {
            exponent: 1.,
            ..pair(false, 0.1)
        };
        assert_close(pair.output_given_input(10.), 10., 1e-12);
        assert_close(pair.spot_price(), 1., 1e-12);
    }

    #[test]
    fn base_buys_principal_at_a_discount() {
        let pair = pair(false, 0.);
        let out = pair.output_given_input(10.);
        assert!(out > 10.);
        assert_close(pair.input_given_output(out), 10., 1e-10);
    }

    #[test]
    fn fees_are_taken_from_the_yield() {
        let free = pair(false, 0.).output_given_input(10.);
        let charged = pair(false, 0.1).output_given_input(10.);
        assert_close(charged, free - 0.1 * (free - 10.), 1e-12);

        let sell = pair(true, 0.1);
        let free_sell = pair(true, 0.).output_given_input(10.);
        assert!(free_sell < 10.);
        assert_close(sell.output_given_input(10.), free_sell - 0.1 * (10. - free_sell), 1e-12);

        let free_in = pair(false, 0.).input_given_output(10.);
        assert!(free_in < 10.);
        assert_close(
            pair(false, 0.1).input_given_output(10.),
            free_in + 0.1 * (10. - free_in),
            1e-12,
        );
    }

    #[test]
    fn analytic_prices_match_finite_differences() {
        let h = 1e-5;
        for principal_in in [false, true] {
            let pair = pair(principal_in, 0.05);
            let marginal_out =
                (pair.output_given_input(20. + h) - pair.output_given_input(20. - h)) / (2. * h);
            assert_close(
                pair.spot_price_after_swap(SwapKind::ExactIn, 20.),
                1. / marginal_out,
                1e-7,
            );
            let marginal_in =
                (pair.input_given_output(20. + h) - pair.input_given_output(20. - h)) / (2. * h);
            assert_close(pair.spot_price_after_swap(SwapKind::ExactOut, 20.), marginal_in, 1e-7);

            for kind in [SwapKind::ExactIn, SwapKind::ExactOut] {
                let slope = (pair.spot_price_after_swap(kind, 20. + h)
                    - pair.spot_price_after_swap(kind, 20. - h))
                    / (2. * h);
                assert_close(pair.derivative_spot_price_after_swap(kind, 20.), slope, 1e-4);
            }
        }
    }

    #[test]
    fn limits_use_real_balances() {
        let pair = pair(true, 0.);
        assert_close(pair.limit_amount(SwapKind::ExactIn), 330., 1e-12);
        assert_close(pair.limit_amount(SwapKind::ExactOut), 300., 1e-12);
    }

    #[test]
    fn zero_amounts_swap_nothing() {
        for principal_in in [true, false] {
            let pair = pair(principal_in, 0.1);
            assert_eq!(pair.output_given_input(0.), 0.);
            assert_eq!(pair.input_given_output(0.), 0.);
        }

        let drained = ElementPair {
            real_balance_out: 0.,
            ..pair(false, 0.1)
        };
        assert_eq!(drained.limit_amount(SwapKind::ExactIn), 0.);
    }
}
