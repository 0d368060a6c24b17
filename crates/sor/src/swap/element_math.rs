//! Convergent curve math of Element finance pools. The curve is the
//! YieldSpace invariant `x^a + y^a = k` where `a = 1 - t` and `t` is the
//! remaining term of the principal token, so prices converge to 1:1 at
//! expiry.

use super::{error::Error, fixed_point::Bfp};

/// Exponent `1 - t` of the curve for the time left until expiry.
pub fn curve_exponent(seconds_to_expiry: u64, unit_seconds: u64) -> Result<Bfp, Error> {
    let t = Bfp::from(seconds_to_expiry as usize).div_down(Bfp::from(unit_seconds as usize))?;
    Ok(t.complement())
}

/// Solves the curve for the change of `reserve_y` when `reserve_x` changes by
/// `amount_x`. With `x_in` the reserve grows and the returned amount leaves
/// the pool, otherwise the reserve shrinks and the returned amount has to be
/// paid in.
pub fn solve_trade_invariant(
    amount_x: Bfp,
    reserve_x: Bfp,
    reserve_y: Bfp,
    x_in: bool,
    a: Bfp,
) -> Result<Bfp, Error> {
    let x_before_pow_a = reserve_x.pow_down(a)?;
    let y_before_pow_a = reserve_y.pow_down(a)?;
    let x_after_pow_a = if x_in {
        reserve_x.add(amount_x)?.pow_up(a)?
    } else {
        reserve_x.sub(amount_x)?.pow_down(a)?
    };

    let new_y_pow_a = x_before_pow_a.add(y_before_pow_a)?.sub(x_after_pow_a)?;
    let new_y = new_y_pow_a.pow_up(Bfp::one().div_down(a)?)?;
    if x_in {
        Ok(reserve_y.sub(new_y).unwrap_or_else(|_| Bfp::zero()))
    } else {
        new_y.sub(reserve_y)
    }
}

/// Charges the fee on the implied yield of a trade, which is the difference
/// between the principal and base amounts. Returns the amount out for
/// exact in trades and the amount in for exact out trades.
pub fn assign_trade_fee(
    amount_in: Bfp,
    amount_out: Bfp,
    principal_out: bool,
    exact_in: bool,
    fee: Bfp,
) -> Result<Bfp, Error> {
    let implied_yield = if principal_out {
        amount_out.sub(amount_in)
    } else {
        amount_in.sub(amount_out)
    }
    .unwrap_or_else(|_| Bfp::zero());
    let implied_yield_fee = implied_yield.mul_down(fee)?;

    if exact_in {
        Ok(amount_out
            .sub(implied_yield_fee)
            .unwrap_or_else(|_| Bfp::zero()))
    } else {
        amount_in.add(implied_yield_fee)
    }
}
