//! Linear pools trade a main token, its wrapped version and their own share
//! token at a rate pegged price. The share token is pre-minted, so swaps
//! with it are always available and the total shares hold the virtual
//! supply.

use {
    super::{
        PairIndices,
        PairMath,
        common::{CommonPoolState, MAX_OUT_RATIO},
    },
    crate::{
        SwapKind,
        error::Error,
        simulation::PoolBalances,
        swap::{
            fixed_point::Bfp,
            linear_math::{self, Balances, Params},
        },
    },
    bigdecimal::BigDecimal,
    primitive_types::U256,
    serde::Deserialize,
    serde_with::{DisplayFromStr, serde_as},
};

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinearPool {
    #[serde(flatten)]
    pub common: CommonPoolState,
    pub main_index: usize,
    pub wrapped_index: usize,
    /// Bounds of the fee free main balance range, in main token units.
    #[serde_as(as = "DisplayFromStr")]
    pub lower_target: BigDecimal,
    #[serde_as(as = "DisplayFromStr")]
    pub upper_target: BigDecimal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinearPairKind {
    MainToWrapped,
    WrappedToMain,
    MainToBpt,
    BptToMain,
    WrappedToBpt,
    BptToWrapped,
}

impl LinearPool {
    pub fn validate(&self) -> Result<(), Error> {
        self.common.validate()?;
        let tokens = self.common.tokens.len();
        if self.main_index == self.wrapped_index
            || self.main_index >= tokens
            || self.wrapped_index >= tokens
        {
            return Err(self.common.invalid("invalid main or wrapped token index"));
        }
        if self.lower_target > self.upper_target {
            return Err(self.common.invalid("lower target above upper target"));
        }
        Ok(())
    }

    fn kind(&self, indices: PairIndices) -> Option<LinearPairKind> {
        let (main, wrapped) = (Some(self.main_index), Some(self.wrapped_index));
        let kind = match (indices.token_in, indices.token_out) {
            (i, o) if i == main && o == wrapped => LinearPairKind::MainToWrapped,
            (i, o) if i == wrapped && o == main => LinearPairKind::WrappedToMain,
            (i, None) if i == main => LinearPairKind::MainToBpt,
            (None, o) if o == main => LinearPairKind::BptToMain,
            (i, None) if i == wrapped => LinearPairKind::WrappedToBpt,
            (None, o) if o == wrapped => LinearPairKind::BptToWrapped,
            _ => return None,
        };
        Some(kind)
    }

    fn wrapped_rate(&self) -> Result<f64, Error> {
        self.common.price_rate_f64(self.wrapped_index)
    }

    pub fn pair(&self, indices: PairIndices) -> Result<Option<LinearPair>, Error> {
        let Some(kind) = self.kind(indices) else {
            return Ok(None);
        };
        Ok(Some(LinearPair {
            kind,
            main: self.common.balance_f64(self.main_index)?,
            wrapped: self.common.balance_f64(self.wrapped_index)?,
            virtual_supply: self.common.total_shares_f64()?,
            swap_fee: self.common.swap_fee_f64()?,
            lower_target: self.common.f64(&self.lower_target, "lower target")?,
            upper_target: self.common.f64(&self.upper_target, "upper target")?,
            rate: self.wrapped_rate()?,
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
        let pair_kind = self
            .kind(indices)
            .ok_or_else(|| self.common.invalid("token pair not traded by linear pool"))?;
        let main = self
            .common
            .token_state(self.main_index, balances.balances[self.main_index])?;
        let wrapped = self
            .common
            .token_state(self.wrapped_index, balances.balances[self.wrapped_index])?;
        let params = Params {
            fee: self.common.swap_fee_bfp()?,
            lower_target: self.common.bfp(&self.lower_target, "lower target")?,
            upper_target: self.common.bfp(&self.upper_target, "upper target")?,
            rate: self.common.price_rate_bfp(self.wrapped_index)?,
        };
        let state = Balances {
            main: main.upscaled_balance()?,
            wrapped: wrapped.upscaled_balance()?,
            bpt_supply: Bfp::from_wei(balances.total_shares),
        };
        let bpt = Bfp::from_wei(amount);

        use {LinearPairKind::*, SwapKind::*};
        let result = match (pair_kind, kind) {
            (MainToWrapped, ExactIn) => wrapped.downscale_down(
                linear_math::calc_wrapped_out_per_main_in(main.upscale(amount)?, &state, &params)?,
            )?,
            (MainToWrapped, ExactOut) => main.downscale_up(
                linear_math::calc_main_in_per_wrapped_out(wrapped.upscale(amount)?, &state, &params)?,
            )?,
            (WrappedToMain, ExactIn) => main.downscale_down(
                linear_math::calc_main_out_per_wrapped_in(wrapped.upscale(amount)?, &state, &params)?,
            )?,
            (WrappedToMain, ExactOut) => wrapped.downscale_up(
                linear_math::calc_wrapped_in_per_main_out(main.upscale(amount)?, &state, &params)?,
            )?,
            (MainToBpt, ExactIn) => {
                linear_math::calc_bpt_out_per_main_in(main.upscale(amount)?, &state, &params)?
                    .as_uint256()
            }
            (MainToBpt, ExactOut) => {
                main.downscale_up(linear_math::calc_main_in_per_bpt_out(bpt, &state, &params)?)?
            }
            (BptToMain, ExactIn) => {
                main.downscale_down(linear_math::calc_main_out_per_bpt_in(bpt, &state, &params)?)?
            }
            (BptToMain, ExactOut) => {
                linear_math::calc_bpt_in_per_main_out(main.upscale(amount)?, &state, &params)?
                    .as_uint256()
            }
            (WrappedToBpt, ExactIn) => {
                linear_math::calc_bpt_out_per_wrapped_in(wrapped.upscale(amount)?, &state, &params)?
                    .as_uint256()
            }
            (WrappedToBpt, ExactOut) => wrapped
                .downscale_up(linear_math::calc_wrapped_in_per_bpt_out(bpt, &state, &params)?)?,
            (BptToWrapped, ExactIn) => wrapped
                .downscale_down(linear_math::calc_wrapped_out_per_bpt_in(bpt, &state, &params)?)?,
            (BptToWrapped, ExactOut) => {
                linear_math::calc_bpt_in_per_wrapped_out(wrapped.upscale(amount)?, &state, &params)?
                    .as_uint256()
            }
        };
        Ok(result)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinearPair {
    pub kind: LinearPairKind,
    pub main: f64,
    pub wrapped: f64,
    pub virtual_supply: f64,
    pub swap_fee: f64,
    pub lower_target: f64,
    pub upper_target: f64,
    /// Main tokens per wrapped token.
    pub rate: f64,
}

impl LinearPair {
    /// Main balance net of the fees owed for leaving the target range.
    fn to_nominal(&self, real: f64) -> f64 {
        let fee = self.swap_fee;
        if real < self.lower_target {
            real - fee * (self.lower_target - real)
        } else if real <= self.upper_target {
            real
        } else {
            real - fee * (real - self.upper_target)
        }
    }

    fn from_nominal(&self, nominal: f64) -> f64 {
        let fee = self.swap_fee;
        if nominal < self.lower_target {
            (nominal + fee * self.lower_target) / (1. + fee)
        } else if nominal <= self.upper_target {
            nominal
        } else {
            (nominal - fee * self.upper_target) / (1. - fee)
        }
    }

    /// Slope of [`Self::to_nominal`].
    fn nominal_slope(&self, real: f64) -> f64 {
        if real < self.lower_target {
            1. + self.swap_fee
        } else if real <= self.upper_target {
            1.
        } else {
            1. - self.swap_fee
        }
    }

    /// Share tokens per unit of nominal value.
    fn bpt_per_nominal(&self) -> f64 {
        let invariant = self.to_nominal(self.main) + self.wrapped * self.rate;
        if self.virtual_supply == 0. || invariant == 0. {
            1.
        } else {
            self.virtual_supply / invariant
        }
    }

    /// Main balance after a swap moving `amount_in` in and `amount_out` out.
    fn main_after(&self, amount_in: f64, amount_out: f64) -> f64 {
        match self.kind {
            LinearPairKind::MainToWrapped | LinearPairKind::MainToBpt => self.main + amount_in,
            LinearPairKind::WrappedToMain | LinearPairKind::BptToMain => self.main - amount_out,
            LinearPairKind::WrappedToBpt | LinearPairKind::BptToWrapped => self.main,
        }
    }

    fn balance_out(&self) -> f64 {
        match self.kind {
            LinearPairKind::WrappedToMain | LinearPairKind::BptToMain => self.main,
            LinearPairKind::MainToWrapped | LinearPairKind::BptToWrapped => self.wrapped,
            LinearPairKind::MainToBpt | LinearPairKind::WrappedToBpt => self.virtual_supply,
        }
    }
}

impl PairMath for LinearPair {
    fn output_given_input(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        let nominal = self.to_nominal(self.main);
        let k = self.bpt_per_nominal();
        match self.kind {
            LinearPairKind::MainToWrapped => {
                (self.to_nominal(self.main + amount) - nominal) / self.rate
            }
            LinearPairKind::WrappedToMain => {
                self.main - self.from_nominal(nominal - amount * self.rate)
            }
            LinearPairKind::MainToBpt => k * (self.to_nominal(self.main + amount) - nominal),
            LinearPairKind::BptToMain => self.main - self.from_nominal(nominal - amount / k),
            LinearPairKind::WrappedToBpt => k * amount * self.rate,
            LinearPairKind::BptToWrapped => amount / (k * self.rate),
        }
    }

    fn input_given_output(&self, amount: f64) -> f64 {
        if amount <= 0. {
            return 0.;
        }
        if amount >= self.balance_out() {
            return f64::INFINITY;
        }
        let nominal = self.to_nominal(self.main);
        let k = self.bpt_per_nominal();
        match self.kind {
            LinearPairKind::MainToWrapped => {
                self.from_nominal(nominal + amount * self.rate) - self.main
            }
            LinearPairKind::WrappedToMain => {
                (nominal - self.to_nominal(self.main - amount)) / self.rate
            }
            LinearPairKind::MainToBpt => self.from_nominal(nominal + amount / k) - self.main,
            LinearPairKind::BptToMain => k * (nominal - self.to_nominal(self.main - amount)),
            LinearPairKind::WrappedToBpt => amount / (k * self.rate),
            LinearPairKind::BptToWrapped => k * amount * self.rate,
        }
    }

    fn spot_price_after_swap(&self, kind: SwapKind, amount: f64) -> f64 {
        let main_after = match kind {
            SwapKind::ExactIn => self.main_after(amount, self.output_given_input(amount)),
            SwapKind::ExactOut => self.main_after(self.input_given_output(amount), amount),
        };
        let slope = self.nominal_slope(main_after);
        let k = self.bpt_per_nominal();
        match self.kind {
            LinearPairKind::MainToWrapped => self.rate / slope,
            LinearPairKind::WrappedToMain => slope / self.rate,
            LinearPairKind::MainToBpt => 1. / (k * slope),
            LinearPairKind::BptToMain => k * slope,
            LinearPairKind::WrappedToBpt => 1. / (k * self.rate),
            LinearPairKind::BptToWrapped => k * self.rate,
        }
    }

    /// Prices are piecewise constant.
    fn derivative_spot_price_after_swap(&self, _: SwapKind, _: f64) -> f64 {
        0.
    }

    fn limit_amount(&self, kind: SwapKind) -> f64 {
        if self.balance_out() <= 0. {
            return 0.;
        }
        let max_out = self.balance_out() * MAX_OUT_RATIO;
        match kind {
            SwapKind::ExactIn => self.input_given_output(max_out),
            SwapKind::ExactOut => max_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::pools::tests::assert_close};

    fn pair(kind: LinearPairKind) -> LinearPair {
        LinearPair {
            kind,
            main: 500.,
            wrapped: 400.,
            virtual_supply: 1000.,
            swap_fee: 0.01,
            lower_target: 200.,
            upper_target: 800.,
            rate: 1.25,
        }
    }

    #[test]
    fn nominal_balances_are_continuous_and_invertible() {
        let pair = pair(LinearPairKind::MainToWrapped);
        for real in [0., 100., 200., 500., 800., 1000.] {
            assert!((pair.from_nominal(pair.to_nominal(real)) - real).abs() < 1e-9);
        }
        assert_eq!(pair.to_nominal(200.), 200.);
        assert_close(pair.to_nominal(1000.), 998., 1e-15);
        assert_close(pair.to_nominal(100.), 99., 1e-15);
    }

    #[test]
    fn fee_free_inside_targets() {
        let main_to_wrapped = pair(LinearPairKind::MainToWrapped);
        assert_close(main_to_wrapped.output_given_input(125.), 100., 1e-12);
        assert_close(main_to_wrapped.spot_price(), 1.25, 1e-12);

        let wrapped_to_bpt = pair(LinearPairKind::WrappedToBpt);
        // invariant 500 + 400 * 1.25 = 1000 equals the supply
        assert_close(wrapped_to_bpt.output_given_input(8.), 10., 1e-12);
        assert_close(wrapped_to_bpt.input_given_output(10.), 8., 1e-12);
    }

    #[test]
    fn fees_apply_outside_targets() {
        let main_to_bpt = pair(LinearPairKind::MainToBpt);
        // 300 main in the range, 100 above it at a 1% discount
        assert_close(main_to_bpt.output_given_input(400.), 399., 1e-12);
        assert_close(main_to_bpt.input_given_output(399.), 400., 1e-12);
        assert_close(
            main_to_bpt.spot_price_after_swap(SwapKind::ExactIn, 400.),
            1. / 0.99,
            1e-12,
        );

        let bpt_to_main = pair(LinearPairKind::BptToMain);
        let out = bpt_to_main.output_given_input(400.);
        assert!(out < 400.);
        assert_close(bpt_to_main.input_given_output(out), 400., 1e-12);
        assert_eq!(bpt_to_main.derivative_spot_price_after_swap(SwapKind::ExactIn, 1.), 0.);
    }

    #[test]
    fn limits() {
        let wrapped_to_main = pair(LinearPairKind::WrappedToMain);
        assert_eq!(wrapped_to_main.limit_amount(SwapKind::ExactOut), 150.);
        assert_close(wrapped_to_main.limit_amount(SwapKind::ExactIn), 120., 1e-12);
        assert_eq!(wrapped_to_main.input_given_output(500.), f64::INFINITY);
    }

    #[test]
    fn zero_amounts_swap_nothing() {
        for kind in [
            LinearPairKind::MainToWrapped,
            LinearPairKind::WrappedToMain,
            LinearPairKind::MainToBpt,
            LinearPairKind::BptToMain,
            LinearPairKind::WrappedToBpt,
            LinearPairKind::BptToWrapped,
        ] {
            let pair = pair(kind);
            assert_eq!(pair.output_given_input(0.), 0.);
            assert_eq!(pair.input_given_output(0.), 0.);
        }

        let drained = LinearPair {
            wrapped: 0.,
            ..pair(LinearPairKind::MainToWrapped)
        };
        assert_eq!(drained.limit_amount(SwapKind::ExactIn), 0.);
        assert_eq!(drained.limit_amount(SwapKind::ExactOut), 0.);
    }
}
