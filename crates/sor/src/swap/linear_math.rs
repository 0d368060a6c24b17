//! Linear pool math: swaps between a main token, its wrapped (yield
//! bearing) version and the pool share token. Fees are charged on the part
//! of a trade that moves the main balance out of the `[lower, upper]`
//! target range, which is modelled with "nominal" main balances.

use super::{error::Error, fixed_point::Bfp};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Params {
    pub fee: Bfp,
    pub lower_target: Bfp,
    pub upper_target: Bfp,
    /// Value of one wrapped token in main token units.
    pub rate: Bfp,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Balances {
    pub main: Bfp,
    pub wrapped: Bfp,
    pub bpt_supply: Bfp,
}

pub fn calc_bpt_out_per_main_in(
    main_in: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    if balances.bpt_supply.is_zero() {
        return to_nominal(main_in, params);
    }
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let after_nominal_main = to_nominal(balances.main.add(main_in)?, params)?;
    let delta_nominal_main = after_nominal_main.sub(previous_nominal_main)?;
    let invariant = calc_invariant(previous_nominal_main, balances.wrapped, params)?;
    balances
        .bpt_supply
        .mul_down(delta_nominal_main)?
        .div_down(invariant)
}

pub fn calc_bpt_in_per_main_out(
    main_out: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let after_nominal_main = to_nominal(balances.main.sub(main_out)?, params)?;
    let delta_nominal_main = previous_nominal_main.sub(after_nominal_main)?;
    let invariant = calc_invariant(previous_nominal_main, balances.wrapped, params)?;
    balances
        .bpt_supply
        .mul_up(delta_nominal_main)?
        .div_up(invariant)
}

pub fn calc_wrapped_out_per_main_in(
    main_in: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let after_nominal_main = to_nominal(balances.main.add(main_in)?, params)?;
    let delta_nominal_main = after_nominal_main.sub(previous_nominal_main)?;
    delta_nominal_main.div_down(params.rate)
}

pub fn calc_wrapped_in_per_main_out(
    main_out: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let after_nominal_main = to_nominal(balances.main.sub(main_out)?, params)?;
    let delta_nominal_main = previous_nominal_main.sub(after_nominal_main)?;
    delta_nominal_main.div_up(params.rate)
}

pub fn calc_main_in_per_bpt_out(
    bpt_out: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    if balances.bpt_supply.is_zero() {
        return from_nominal(bpt_out, params);
    }
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let invariant = calc_invariant(previous_nominal_main, balances.wrapped, params)?;
    let delta_nominal_main = invariant.mul_up(bpt_out)?.div_up(balances.bpt_supply)?;
    let after_nominal_main = previous_nominal_main.add(delta_nominal_main)?;
    let new_main_balance = from_nominal(after_nominal_main, params)?;
    new_main_balance.sub(balances.main)
}

pub fn calc_main_out_per_bpt_in(
    bpt_in: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let invariant = calc_invariant(previous_nominal_main, balances.wrapped, params)?;
    let delta_nominal_main = invariant.mul_down(bpt_in)?.div_down(balances.bpt_supply)?;
    let after_nominal_main = previous_nominal_main.sub(delta_nominal_main)?;
    let new_main_balance = from_nominal(after_nominal_main, params)?;
    balances.main.sub(new_main_balance)
}

pub fn calc_main_out_per_wrapped_in(
    wrapped_in: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let delta_nominal_main = wrapped_in.mul_down(params.rate)?;
    let after_nominal_main = previous_nominal_main.sub(delta_nominal_main)?;
    let new_main_balance = from_nominal(after_nominal_main, params)?;
    balances.main.sub(new_main_balance)
}

pub fn calc_main_in_per_wrapped_out(
    wrapped_out: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let previous_nominal_main = to_nominal(balances.main, params)?;
    let delta_nominal_main = wrapped_out.mul_up(params.rate)?;
    let after_nominal_main = previous_nominal_main.add(delta_nominal_main)?;
    let new_main_balance = from_nominal(after_nominal_main, params)?;
    new_main_balance.sub(balances.main)
}

pub fn calc_bpt_out_per_wrapped_in(
    wrapped_in: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    if balances.bpt_supply.is_zero() {
        return wrapped_in.mul_down(params.rate);
    }
    let nominal_main = to_nominal(balances.main, params)?;
    let previous_invariant = calc_invariant(nominal_main, balances.wrapped, params)?;
    let new_wrapped_balance = balances.wrapped.add(wrapped_in)?;
    let new_invariant = calc_invariant(nominal_main, new_wrapped_balance, params)?;
    let new_bpt_balance = balances
        .bpt_supply
        .mul_down(new_invariant)?
        .div_down(previous_invariant)?;
    new_bpt_balance.sub(balances.bpt_supply)
}

pub fn calc_bpt_in_per_wrapped_out(
    wrapped_out: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let nominal_main = to_nominal(balances.main, params)?;
    let previous_invariant = calc_invariant(nominal_main, balances.wrapped, params)?;
    let new_wrapped_balance = balances.wrapped.sub(wrapped_out)?;
    let new_invariant = calc_invariant(nominal_main, new_wrapped_balance, params)?;
    let new_bpt_balance = balances
        .bpt_supply
        .mul_down(new_invariant)?
        .div_down(previous_invariant)?;
    balances.bpt_supply.sub(new_bpt_balance)
}

pub fn calc_wrapped_in_per_bpt_out(
    bpt_out: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    if balances.bpt_supply.is_zero() {
        return bpt_out.div_up(params.rate);
    }
    let nominal_main = to_nominal(balances.main, params)?;
    let previous_invariant = calc_invariant(nominal_main, balances.wrapped, params)?;
    let new_bpt_balance = balances.bpt_supply.add(bpt_out)?;
    let new_wrapped_balance = new_bpt_balance
        .div_up(balances.bpt_supply)?
        .mul_up(previous_invariant)?
        .sub(nominal_main)?
        .div_up(params.rate)?;
    new_wrapped_balance.sub(balances.wrapped)
}

pub fn calc_wrapped_out_per_bpt_in(
    bpt_in: Bfp,
    balances: &Balances,
    params: &Params,
) -> Result<Bfp, Error> {
    let nominal_main = to_nominal(balances.main, params)?;
    let previous_invariant = calc_invariant(nominal_main, balances.wrapped, params)?;
    let new_bpt_balance = balances.bpt_supply.sub(bpt_in)?;
    let new_wrapped_balance = new_bpt_balance
        .div_down(balances.bpt_supply)?
        .mul_down(previous_invariant)?
        .sub(nominal_main)?
        .div_down(params.rate)?;
    balances.wrapped.sub(new_wrapped_balance)
}

fn calc_invariant(nominal_main: Bfp, wrapped: Bfp, params: &Params) -> Result<Bfp, Error> {
    nominal_main.add(wrapped.mul_down(params.rate)?)
}

fn to_nominal(real: Bfp, params: &Params) -> Result<Bfp, Error> {
    if real < params.lower_target {
        let fees = params.lower_target.sub(real)?.mul_down(params.fee)?;
        real.sub(fees)
    } else if real <= params.upper_target {
        Ok(real)
    } else {
        let fees = real.sub(params.upper_target)?.mul_down(params.fee)?;
        real.sub(fees)
    }
}

fn from_nominal(nominal: Bfp, params: &Params) -> Result<Bfp, Error> {
    if nominal < params.lower_target {
        nominal
            .add(params.fee.mul_down(params.lower_target)?)?
            .div_down(Bfp::one().add(params.fee)?)
    } else if nominal <= params.upper_target {
        Ok(nominal)
    } else {
        nominal
            .sub(params.fee.mul_down(params.upper_target)?)?
            .div_down(params.fee.complement())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params {
            fee: bfp!("0.01"),
            lower_target: Bfp::from(1000),
            upper_target: Bfp::from(2000),
            rate: bfp!("1.5"),
        }
    }

    fn balances() -> Balances {
        Balances {
            main: Bfp::from(1500),
            wrapped: Bfp::from(1000),
            bpt_supply: Bfp::from(3000),
        }
    }

    #[test]
    fn nominal_balances() {
        let params = params();
        assert_eq!(to_nominal(Bfp::from(1500), &params).unwrap(), Bfp::from(1500));
        // 900 - 100 * 1%
        assert_eq!(to_nominal(Bfp::from(900), &params).unwrap(), Bfp::from(899));
        // 2100 - 100 * 1%
        assert_eq!(to_nominal(Bfp::from(2100), &params).unwrap(), Bfp::from(2099));
        assert_eq!(from_nominal(Bfp::from(899), &params).unwrap(), Bfp::from(900));
        assert_eq!(from_nominal(Bfp::from(2099), &params).unwrap(), Bfp::from(2100));
    }

    #[test]
    fn swaps_inside_the_target_range_are_free() {
        let (balances, params) = (balances(), params());
        // invariant = 1500 + 1000 * 1.5 = 3000, one share per nominal main
        assert_eq!(
            calc_bpt_out_per_main_in(Bfp::from(100), &balances, &params).unwrap(),
            Bfp::from(100)
        );
        assert_eq!(
            calc_wrapped_out_per_main_in(Bfp::from(150), &balances, &params).unwrap(),
            Bfp::from(100)
        );
        assert_eq!(
            calc_main_out_per_wrapped_in(Bfp::from(100), &balances, &params).unwrap(),
            Bfp::from(150)
        );
        assert_eq!(
            calc_main_in_per_bpt_out(Bfp::from(100), &balances, &params).unwrap(),
            Bfp::from(100)
        );
        assert_eq!(
            calc_bpt_out_per_wrapped_in(Bfp::from(100), &balances, &params).unwrap(),
            Bfp::from(150)
        );
        assert_eq!(
            calc_wrapped_in_per_bpt_out(Bfp::from(150), &balances, &params).unwrap(),
            Bfp::from(100)
        );
    }

    #[test]
    fn leaving_the_target_range_pays_fees() {
        let (balances, params) = (balances(), params());
        // 600 main in, 500 to the upper target and 100 above it.
        let wrapped_out = calc_wrapped_out_per_main_in(Bfp::from(600), &balances, &params).unwrap();
        assert_eq!(wrapped_out, Bfp::from(599).div_down(bfp!("1.5")).unwrap());

        let main_in = calc_main_in_per_wrapped_out(wrapped_out, &balances, &params).unwrap();
        assert!(main_in >= bfp!("599.99999999999"));
        assert!(main_in <= bfp!("600.00000000001"));
    }

    #[test]
    fn exits_are_inverse_of_joins() {
        let (balances, params) = (balances(), params());
        let bpt_in = calc_bpt_in_per_main_out(Bfp::from(100), &balances, &params).unwrap();
        assert_eq!(bpt_in, Bfp::from(100));
        assert_eq!(
            calc_main_out_per_bpt_in(bpt_in, &balances, &params).unwrap(),
            Bfp::from(100)
        );
        let bpt_in = calc_bpt_in_per_wrapped_out(Bfp::from(10), &balances, &params).unwrap();
        assert_eq!(bpt_in, Bfp::from(15));
        assert_eq!(
            calc_wrapped_out_per_bpt_in(bpt_in, &balances, &params).unwrap(),
            Bfp::from(10)
        );
        assert_eq!(
            calc_wrapped_in_per_main_out(Bfp::from(15), &balances, &params).unwrap(),
            Bfp::from(10)
        );
    }
}
