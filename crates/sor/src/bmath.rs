//! Balancer V1 `BNum`/`BMath` arithmetic on `BONE` scaled integers. Used by
//! the direct swap router, which prices weighted pools with the V1 formulas.
//!
//! Multiplication and division round half up, `bpow` splits the exponent
//! into an integer part (repeated squaring) and a fractional remainder
//! (binomial series).

use {
    crate::swap::error::Error,
    num::{BigInt, Integer, One, Signed, Zero},
    std::sync::LazyLock,
};

pub static BONE: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(18));
static MIN_BPOW_BASE: LazyLock<BigInt> = LazyLock::new(BigInt::one);
static MAX_BPOW_BASE: LazyLock<BigInt> = LazyLock::new(|| &*BONE * 2 - 1);
static BPOW_PRECISION: LazyLock<BigInt> = LazyLock::new(|| &*BONE / BigInt::from(10).pow(10));

pub fn bmul(a: &BigInt, b: &BigInt) -> BigInt {
    (a * b + &*BONE / 2) / &*BONE
}

pub fn bdiv(a: &BigInt, b: &BigInt) -> Result<BigInt, Error> {
    if b.is_zero() {
        return Err(Error::ZeroDivision);
    }
    Ok((a * &*BONE + b / 2) / b)
}

pub fn bsub(a: &BigInt, b: &BigInt) -> Result<BigInt, Error> {
    if a < b {
        return Err(Error::SubOverflow);
    }
    Ok(a - b)
}

/// Returns `|a - b|` and whether `a < b`.
fn bsub_sign(a: &BigInt, b: &BigInt) -> (BigInt, bool) {
    if a >= b {
        (a - b, false)
    } else {
        (b - a, true)
    }
}

fn bfloor(a: &BigInt) -> BigInt {
    (a / &*BONE) * &*BONE
}

/// `a^n` for an integer `n`, by repeated squaring.
pub fn bpowi(a: &BigInt, n: &BigInt) -> BigInt {
    let mut a = a.clone();
    let mut n = n.clone();
    let mut z = if n.is_odd() { a.clone() } else { BONE.clone() };
    n /= 2;
    while !n.is_zero() {
        a = bmul(&a, &a);
        if n.is_odd() {
            z = bmul(&z, &a);
        }
        n /= 2;
    }
    z
}

/// `base^exp` for `BONE` scaled base and exponent.
pub fn bpow(base: &BigInt, exp: &BigInt) -> Result<BigInt, Error> {
    if base < &*MIN_BPOW_BASE {
        return Err(Error::BpowBaseTooLow);
    }
    if base > &*MAX_BPOW_BASE {
        return Err(Error::BpowBaseTooHigh);
    }

    let whole = bfloor(exp);
    let remain = exp - &whole;
    let whole_pow = bpowi(base, &(&whole / &*BONE));
    if remain.is_zero() {
        return Ok(whole_pow);
    }
    let partial_result = bpow_approx(base, &remain, &BPOW_PRECISION);
    Ok(bmul(&whole_pow, &partial_result))
}

/// Binomial series for `base^exp` with `exp < 1`, summed until the terms
/// fall below `precision`.
fn bpow_approx(base: &BigInt, exp: &BigInt, precision: &BigInt) -> BigInt {
    let (x, xneg) = bsub_sign(base, &BONE);
    let mut term = BONE.clone();
    let mut sum = term.clone();
    let mut negative = false;

    // term(k) = term(k-1) * (exp - (k-1)) * x / k
    let mut i = BigInt::one();
    while &term >= precision {
        let big_k = &i * &*BONE;
        let (c, cneg) = bsub_sign(exp, &(&big_k - &*BONE));
        term = bmul(&term, &bmul(&c, &x));
        term = (term * &*BONE + &big_k / 2) / &big_k;
        if term.is_zero() {
            break;
        }

        if xneg {
            negative = !negative;
        }
        if cneg {
            negative = !negative;
        }
        if negative {
            sum -= &term;
        } else {
            sum += &term;
        }
        i += 1;
    }
    sum
}

pub fn calc_spot_price(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    swap_fee: &BigInt,
) -> Result<BigInt, Error> {
    let numer = bdiv(balance_in, weight_in)?;
    let denom = bdiv(balance_out, weight_out)?;
    let ratio = bdiv(&numer, &denom)?;
    let scale = bdiv(&BONE, &bsub(&BONE, swap_fee)?)?;
    Ok(bmul(&ratio, &scale))
}

pub fn calc_out_given_in(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    amount_in: &BigInt,
    swap_fee: &BigInt,
) -> Result<BigInt, Error> {
    let weight_ratio = bdiv(weight_in, weight_out)?;
    let adjusted_in = bmul(amount_in, &bsub(&BONE, swap_fee)?);
    let y = bdiv(balance_in, &(balance_in + adjusted_in))?;
    let foo = bpow(&y, &weight_ratio)?;
    let bar = bsub(&BONE, &foo)?;
    Ok(bmul(balance_out, &bar))
}

pub fn calc_in_given_out(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    amount_out: &BigInt,
    swap_fee: &BigInt,
) -> Result<BigInt, Error> {
    let weight_ratio = bdiv(weight_out, weight_in)?;
    let diff = bsub(balance_out, amount_out)?;
    let y = bdiv(balance_out, &diff)?;
    let foo = bsub(&bpow(&y, &weight_ratio)?, &BONE)?;
    bdiv(&bmul(balance_in, &foo), &bsub(&BONE, swap_fee)?)
}

/// Slope `s` of the linearized spot price `sp(a) = sp(0) * (1 + s * a)` of
/// an exact in swap.
pub fn calc_slippage_exact_in(
    balance_in: &BigInt,
    weight_in: &BigInt,
    weight_out: &BigInt,
    swap_fee: &BigInt,
) -> Result<BigInt, Error> {
    let ratio = bdiv(weight_in, weight_out)? + &*BONE;
    bdiv(&bmul(&bsub(&BONE, swap_fee)?, &ratio), balance_in)
}

/// Slope `s` of the linearized spot price of an exact out swap.
pub fn calc_slippage_exact_out(
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    swap_fee: &BigInt,
) -> Result<BigInt, Error> {
    let ratio = bdiv(weight_out, &bmul(&bsub(&BONE, swap_fee)?, weight_in))? + &*BONE;
    bdiv(&ratio, balance_out)
}

/// Slope of the linearized spot price of a two hop path. The second hop
/// sees the output of the first, which is the input divided by the first
/// spot price.
pub fn calc_path_slippage(
    first_slippage: &BigInt,
    first_spot_price: &BigInt,
    second_slippage: &BigInt,
) -> Result<BigInt, Error> {
    Ok(first_slippage + bdiv(second_slippage, first_spot_price)?)
}

pub fn to_f64(value: &BigInt) -> f64 {
    let (int, frac) = value.abs().div_rem(&BONE);
    let magnitude = num::ToPrimitive::to_f64(&int).unwrap_or(f64::INFINITY)
        + num::ToPrimitive::to_f64(&frac).unwrap_or_default() / 1e18;
    if value.is_negative() { -magnitude } else { magnitude }
}
