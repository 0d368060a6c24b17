//! Exponentiation and logarithm with 18 decimal fixed point arguments, as
//! implemented by Balancer's `LogExpMath` library:
//! https://github.com/balancer-labs/balancer-v2-monorepo/blob/master/pkg/solidity-utils/contracts/math/LogExpMath.sol
//!
//! Intermediate values are signed, so they are held in `BigInt`. Division
//! truncates towards zero, like the EVM's `sdiv`.

use {
    super::error::Error,
    num::{BigInt, Zero},
    number::conversions::{big_int_to_u256, u256_to_big_int},
    primitive_types::U256,
    std::sync::LazyLock,
};

fn int(digits: &str) -> BigInt {
    digits
        .parse()
        .unwrap_or_else(|_| unreachable!("constant {digits} is a valid integer"))
}

static ONE_18: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(18));
static ONE_20: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(20));
static ONE_36: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(36));

static MAX_NATURAL_EXPONENT: LazyLock<BigInt> = LazyLock::new(|| int("130000000000000000000"));
static MIN_NATURAL_EXPONENT: LazyLock<BigInt> = LazyLock::new(|| int("-41000000000000000000"));

static LN_36_LOWER_BOUND: LazyLock<BigInt> =
    LazyLock::new(|| &*ONE_18 - BigInt::from(10).pow(17));
static LN_36_UPPER_BOUND: LazyLock<BigInt> =
    LazyLock::new(|| &*ONE_18 + BigInt::from(10).pow(17));

static MILD_EXPONENT_BOUND: LazyLock<BigInt> =
    LazyLock::new(|| BigInt::from(2).pow(254) / &*ONE_20);

// 18 decimal constants
static X0: LazyLock<BigInt> = LazyLock::new(|| int("128000000000000000000")); // 2ˆ7
static A0: LazyLock<BigInt> =
    LazyLock::new(|| int("38877084059945950922200000000000000000000000000000000000")); // eˆ(x0) (no decimals)
static X1: LazyLock<BigInt> = LazyLock::new(|| int("64000000000000000000")); // 2ˆ6
static A1: LazyLock<BigInt> = LazyLock::new(|| int("6235149080811616882910000000")); // eˆ(x1) (no decimals)

// 20 decimal constants
static X2: LazyLock<BigInt> = LazyLock::new(|| int("3200000000000000000000")); // 2ˆ5
static A2: LazyLock<BigInt> = LazyLock::new(|| int("7896296018268069516100000000000000")); // eˆ(x2)
static X3: LazyLock<BigInt> = LazyLock::new(|| int("1600000000000000000000")); // 2ˆ4
static A3: LazyLock<BigInt> = LazyLock::new(|| int("888611052050787263676000000")); // eˆ(x3)
static X4: LazyLock<BigInt> = LazyLock::new(|| int("800000000000000000000")); // 2ˆ3
static A4: LazyLock<BigInt> = LazyLock::new(|| int("298095798704172827474000")); // eˆ(x4)
static X5: LazyLock<BigInt> = LazyLock::new(|| int("400000000000000000000")); // 2ˆ2
static A5: LazyLock<BigInt> = LazyLock::new(|| int("5459815003314423907810")); // eˆ(x5)
static X6: LazyLock<BigInt> = LazyLock::new(|| int("200000000000000000000")); // 2ˆ1
static A6: LazyLock<BigInt> = LazyLock::new(|| int("738905609893065022723")); // eˆ(x6)
static X7: LazyLock<BigInt> = LazyLock::new(|| int("100000000000000000000")); // 2ˆ0
static A7: LazyLock<BigInt> = LazyLock::new(|| int("271828182845904523536")); // eˆ(x7)
static X8: LazyLock<BigInt> = LazyLock::new(|| int("50000000000000000000")); // 2ˆ-1
static A8: LazyLock<BigInt> = LazyLock::new(|| int("164872127070012814685")); // eˆ(x8)
static X9: LazyLock<BigInt> = LazyLock::new(|| int("25000000000000000000")); // 2ˆ-2
static A9: LazyLock<BigInt> = LazyLock::new(|| int("128402541668774148407")); // eˆ(x9)
static X10: LazyLock<BigInt> = LazyLock::new(|| int("12500000000000000000")); // 2ˆ-3
static A10: LazyLock<BigInt> = LazyLock::new(|| int("113314845306682631683")); // eˆ(x10)
static X11: LazyLock<BigInt> = LazyLock::new(|| int("6250000000000000000")); // 2ˆ-4
static A11: LazyLock<BigInt> = LazyLock::new(|| int("106449445891785942956")); // eˆ(x11)

/// Computes `x^y` for 18 decimal fixed point numbers.
pub fn pow(x: U256, y: U256) -> Result<U256, Error> {
    if y.is_zero() {
        // We solve the 0^0 indetermination by making it equal one.
        return Ok(U256::exp10(18));
    }
    if x.is_zero() {
        return Ok(U256::zero());
    }
    if x.bit(255) {
        return Err(Error::XOutOfBounds);
    }
    let x = u256_to_big_int(&x);
    let y = u256_to_big_int(&y);
    if y >= *MILD_EXPONENT_BOUND {
        return Err(Error::YOutOfBounds);
    }

    let logx_times_y = if *LN_36_LOWER_BOUND < x && x < *LN_36_UPPER_BOUND {
        let ln_36_x = ln_36(x);
        // ln_36_x has 36 decimal places, so it is split before multiplying
        // to keep the precision.
        (&ln_36_x / &*ONE_18) * &y + ((&ln_36_x % &*ONE_18) * &y) / &*ONE_18
    } else {
        ln(x) * &y
    };
    let logx_times_y = logx_times_y / &*ONE_18;

    if logx_times_y < *MIN_NATURAL_EXPONENT || logx_times_y > *MAX_NATURAL_EXPONENT {
        return Err(Error::ProductOutOfBounds);
    }
    big_int_to_u256(&exp(logx_times_y)?).map_err(|_| Error::ProductOutOfBounds)
}

/// Natural exponentiation `e^x` with 18 decimals.
fn exp(mut x: BigInt) -> Result<BigInt, Error> {
    if x < *MIN_NATURAL_EXPONENT || x > *MAX_NATURAL_EXPONENT {
        return Err(Error::InvalidExponent);
    }
    if x < BigInt::zero() {
        // e^(-x) = 1/e^x, rounding error only affects the last digit.
        return Ok((&*ONE_18 * &*ONE_18) / exp(-x)?);
    }

    let first_an = if x >= *X0 {
        x -= &*X0;
        A0.clone()
    } else if x >= *X1 {
        x -= &*X1;
        A1.clone()
    } else {
        BigInt::from(1)
    };

    // Switch to 20 decimals for the remaining terms.
    x *= 100_u32;

    let mut product = ONE_20.clone();
    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
    ] {
        if x >= *x_n {
            x -= x_n;
            product = (product * a_n) / &*ONE_20;
        }
    }

    // Taylor series for the remainder, which is now below 2^-3.
    let mut series_sum = ONE_20.clone();
    let mut term = x.clone();
    series_sum += &term;
    for n in 2..=12_u32 {
        term = ((term * &x) / &*ONE_20) / n;
        series_sum += &term;
    }

    Ok((((product * series_sum) / &*ONE_20) * first_an) / 100_u32)
}

/// Natural logarithm with 18 decimals.
fn ln(mut a: BigInt) -> BigInt {
    if a < *ONE_18 {
        // ln(a) = -ln(1/a), the inversion costs at most one digit.
        return -ln((&*ONE_18 * &*ONE_18) / a);
    }

    let mut sum = BigInt::zero();
    if a >= &*A0 * &*ONE_18 {
        a /= &*A0;
        sum += &*X0;
    }
    if a >= &*A1 * &*ONE_18 {
        a /= &*A1;
        sum += &*X1;
    }

    sum *= 100_u32;
    a *= 100_u32;

    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
        (&*X10, &*A10),
        (&*X11, &*A11),
    ] {
        if a >= *a_n {
            a = (a * &*ONE_20) / a_n;
            sum += x_n;
        }
    }

    // ln(a) = 2 * atanh(z) with z = (a - 1) / (a + 1).
    let z = ((&a - &*ONE_20) * &*ONE_20) / (&a + &*ONE_20);
    let z_squared = (&z * &z) / &*ONE_20;
    let mut num = z.clone();
    let mut series_sum = num.clone();
    for n in [3_u32, 5, 7, 9, 11] {
        num = (num * &z_squared) / &*ONE_20;
        series_sum += &num / n;
    }
    series_sum *= 2_u32;

    (sum + series_sum) / 100_u32
}

/// High precision logarithm for arguments close to one, returned with 36
/// decimals.
fn ln_36(x: BigInt) -> BigInt {
    let x = x * &*ONE_18;

    let z = ((&x - &*ONE_36) * &*ONE_36) / (&x + &*ONE_36);
    let z_squared = (&z * &z) / &*ONE_36;
    let mut num = z.clone();
    let mut series_sum = num.clone();
    for n in [3_u32, 5, 7, 9, 11, 13, 15] {
        num = (num * &z_squared) / &*ONE_36;
        series_sum += &num / n;
    }

    series_sum * 2_u32
}
