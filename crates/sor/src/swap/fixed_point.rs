//! Fixed point numbers with 18 decimals that replicate the rounding of the
//! Balancer `FixedPoint` library:
//! https://github.com/balancer-labs/balancer-v2-monorepo/blob/master/pkg/solidity-utils/contracts/math/FixedPoint.sol

use {
    super::{error::Error, log_exp_math, math::BalU256},
    anyhow::{Context, Result, anyhow, ensure},
    bigdecimal::BigDecimal,
    primitive_types::U256,
    std::{
        fmt::{self, Debug, Display, Formatter},
        str::FromStr,
        sync::LazyLock,
    },
};

const DECIMALS: usize = 18;
static ONE_18: LazyLock<U256> = LazyLock::new(|| U256::exp10(DECIMALS));
static ZERO: LazyLock<Bfp> = LazyLock::new(|| Bfp(U256::zero()));
static EPSILON: LazyLock<Bfp> = LazyLock::new(|| Bfp(U256::one()));
static ONE: LazyLock<Bfp> = LazyLock::new(|| Bfp(*ONE_18));
static TWO: LazyLock<Bfp> = LazyLock::new(|| Bfp(*ONE_18 * 2));
static FOUR: LazyLock<Bfp> = LazyLock::new(|| Bfp(*ONE_18 * 4));
static MAX_POW_RELATIVE_ERROR: LazyLock<Bfp> = LazyLock::new(|| Bfp(10000_usize.into()));

#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Bfp(U256);

impl From<usize> for Bfp {
    fn from(num: usize) -> Self {
        Self(U256::from(num) * *ONE_18)
    }
}

impl FromStr for Bfp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut split_dot = s.splitn(2, '.');
        let units = split_dot.next().unwrap_or_default();
        let decimals = split_dot.next().unwrap_or("0");
        ensure!(
            !units.is_empty() && !decimals.is_empty() && decimals.len() <= DECIMALS,
            "invalid decimal representation {s:?}"
        );
        let units = U256::from_dec_str(units)?
            .checked_mul(*ONE_18)
            .ok_or_else(|| anyhow!("too large number"))?;
        let decimals = U256::from_dec_str(&format!("{decimals:0<DECIMALS$}"))?;
        Ok(Bfp(units
            .checked_add(decimals)
            .ok_or_else(|| anyhow!("too large number"))?))
    }
}

impl TryFrom<&BigDecimal> for Bfp {
    type Error = anyhow::Error;

    fn try_from(value: &BigDecimal) -> Result<Self> {
        number::conversions::decimal_to_raw(value, DECIMALS as u8)
            .map(Bfp)
            .with_context(|| format!("{value} is not a valid fixed point number"))
    }
}

impl Display for Bfp {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(
            formatter,
            "{}.{:0>18}",
            self.0 / *ONE_18,
            (self.0 % *ONE_18).as_u128()
        )
    }
}

impl Debug for Bfp {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        Display::fmt(self, formatter)
    }
}

impl Bfp {
    pub fn exp10(exp: i32) -> Self {
        match exp {
            ..0 => Bfp(*ONE_18 / U256::exp10(exp.unsigned_abs() as usize)),
            0 => Bfp::one(),
            _ => Bfp(*ONE_18 * U256::exp10(exp as usize)),
        }
    }

    pub fn as_uint256(self) -> U256 {
        self.0
    }

    pub fn zero() -> Self {
        *ZERO
    }

    pub fn epsilon() -> Self {
        *EPSILON
    }

    pub fn one() -> Self {
        *ONE
    }

    pub fn from_wei(num: U256) -> Self {
        Self(num)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.badd(other.0)?))
    }

    pub fn sub(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.bsub(other.0)?))
    }

    pub fn mul_down(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.bmul(other.0)?.bdiv_down(*ONE_18)?))
    }

    pub fn mul_up(self, other: Self) -> Result<Self, Error> {
        let product = self.0.bmul(other.0)?;
        Ok(if product.is_zero() {
            Bfp::zero()
        } else {
            Bfp(((product - 1) / *ONE_18) + 1)
        })
    }

    pub fn div_down(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            Err(Error::ZeroDivision)
        } else if self.is_zero() {
            Ok(Bfp::zero())
        } else {
            let a_inflated = self.0.checked_mul(*ONE_18).ok_or(Error::DivInternal)?;
            Ok(Self(a_inflated / other.0))
        }
    }

    pub fn div_up(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            Err(Error::ZeroDivision)
        } else if self.is_zero() {
            Ok(Bfp::zero())
        } else {
            let a_inflated = self.0.checked_mul(*ONE_18).ok_or(Error::DivInternal)?;
            Ok(Self(((a_inflated - 1) / other.0) + 1))
        }
    }

    pub fn complement(self) -> Self {
        if self.0 < *ONE_18 {
            Self(*ONE_18 - self.0)
        } else {
            Bfp::zero()
        }
    }

    pub fn pow_up(self, exp: Self) -> Result<Self, Error> {
        if exp == Bfp::one() {
            Ok(self)
        } else if exp == *TWO {
            self.mul_up(self)
        } else if exp == *FOUR {
            let square = self.mul_up(self)?;
            square.mul_up(square)
        } else {
            let raw = Bfp(log_exp_math::pow(self.0, exp.0)?);
            let max_error = raw.mul_up(*MAX_POW_RELATIVE_ERROR)?.add(Bfp(1.into()))?;
            raw.add(max_error)
        }
    }

    pub fn pow_down(self, exp: Self) -> Result<Self, Error> {
        if exp == Bfp::one() {
            Ok(self)
        } else if exp == *TWO {
            self.mul_down(self)
        } else if exp == *FOUR {
            let square = self.mul_down(self)?;
            square.mul_down(square)
        } else {
            let raw = Bfp(log_exp_math::pow(self.0, exp.0)?);
            let max_error = raw.mul_up(*MAX_POW_RELATIVE_ERROR)?.add(Bfp(1.into()))?;
            if raw < max_error {
                Ok(Bfp::zero())
            } else {
                raw.sub(max_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, num::BigInt, number::conversions::u256_to_big_int};

    #[test]
    fn parsing() {
        assert_eq!("1".parse::<Bfp>().unwrap(), Bfp::one());
        assert_eq!(
            "0.1".parse::<Bfp>().unwrap(),
            Bfp::from_wei(U256::exp10(17))
        );
        assert_eq!(
            "1.01".parse::<Bfp>().unwrap(),
            Bfp::from_wei(U256::exp10(16) * 101)
        );
        assert_eq!(
            "10.000000000000000001".parse::<Bfp>().unwrap(),
            Bfp::from_wei(U256::exp10(19) + 1)
        );
        assert!("".parse::<Bfp>().is_err());
        assert!(".1".parse::<Bfp>().is_err());
        assert!("1.".parse::<Bfp>().is_err());
        assert!("0.0000000000000000001".parse::<Bfp>().is_err());
        assert!("foo".parse::<Bfp>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(bfp!("1.5").to_string(), "1.500000000000000000");
        assert_eq!(Bfp::from_wei(1.into()).to_string(), "0.000000000000000001");
    }

    #[test]
    fn exp10() {
        assert_eq!(Bfp::exp10(0), Bfp::one());
        assert_eq!(Bfp::exp10(2), Bfp::from(100));
        assert_eq!(Bfp::exp10(-1), bfp!("0.1"));
        assert_eq!(Bfp::exp10(-18), Bfp::epsilon());
    }

    #[test]
    fn add_and_sub() {
        assert_eq!(bfp!("1.2").add(bfp!("0.3")).unwrap(), bfp!("1.5"));
        assert_eq!(
            Bfp::from_wei(U256::MAX).add(Bfp::epsilon()).unwrap_err(),
            Error::AddOverflow
        );
        assert_eq!(
            Bfp::zero().sub(Bfp::epsilon()).unwrap_err(),
            Error::SubOverflow
        );
    }

    #[test]
    fn mul_rounding() {
        let a = Bfp::from_wei(3.into());
        let half = bfp!("0.5");
        assert_eq!(a.mul_down(half).unwrap(), Bfp::from_wei(1.into()));
        assert_eq!(a.mul_up(half).unwrap(), Bfp::from_wei(2.into()));
        assert_eq!(Bfp::zero().mul_up(half).unwrap(), Bfp::zero());
        assert_eq!(
            Bfp::from_wei(U256::MAX).mul_down(bfp!("2")).unwrap_err(),
            Error::MulOverflow
        );
    }

    #[test]
    fn div_rounding() {
        let one = Bfp::one();
        let three = Bfp::from(3);
        assert_eq!(
            one.div_down(three).unwrap(),
            Bfp::from_wei(333_333_333_333_333_333_u64.into())
        );
        assert_eq!(
            one.div_up(three).unwrap(),
            Bfp::from_wei(333_333_333_333_333_334_u64.into())
        );
        assert_eq!(one.div_down(Bfp::zero()).unwrap_err(), Error::ZeroDivision);
        assert_eq!(Bfp::zero().div_up(three).unwrap(), Bfp::zero());
        assert_eq!(
            Bfp::from_wei(U256::MAX).div_down(one).unwrap_err(),
            Error::DivInternal
        );
    }

    #[test]
    fn complement() {
        assert_eq!(bfp!("0.3").complement(), bfp!("0.7"));
        assert_eq!(Bfp::from(2).complement(), Bfp::zero());
    }

    #[test]
    fn pow_fast_paths() {
        let base = bfp!("1.5");
        assert_eq!(base.pow_up(Bfp::one()).unwrap(), base);
        assert_eq!(base.pow_up(Bfp::from(2)).unwrap(), bfp!("2.25"));
        assert_eq!(base.pow_down(Bfp::from(4)).unwrap(), bfp!("5.0625"));
    }

    #[test]
    fn pow_bounds_the_result() {
        let base = Bfp::from(2);
        let exp = bfp!("0.5");
        let sqrt2 = BigInt::from(1_414_213_562_373_095_048_u64);
        let up = u256_to_big_int(&base.pow_up(exp).unwrap().as_uint256());
        let down = u256_to_big_int(&base.pow_down(exp).unwrap().as_uint256());
        assert!(down <= sqrt2.clone() + 1_u32 && sqrt2 <= up.clone() + 1_u32);
        assert!(up - down < BigInt::from(100_000_000_u64));
    }
}
