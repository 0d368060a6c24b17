//! Conversions between the integer, decimal and floating point
//! representations of token amounts.

use {
    anyhow::{Context, Result, ensure},
    bigdecimal::BigDecimal,
    num::{BigInt, BigUint, FromPrimitive, One, Signed, ToPrimitive, bigint::Sign},
    primitive_types::U256,
};

pub fn u256_to_big_uint(input: &U256) -> BigUint {
    let mut bytes = [0; 32];
    input.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

pub fn u256_to_big_int(input: &U256) -> BigInt {
    BigInt::from_biguint(Sign::Plus, u256_to_big_uint(input))
}

pub fn big_uint_to_u256(input: &BigUint) -> Result<U256> {
    let bytes = input.to_bytes_be();
    ensure!(bytes.len() <= 32, "too large");
    Ok(U256::from_big_endian(&bytes))
}

pub fn big_int_to_u256(input: &BigInt) -> Result<U256> {
    ensure!(!input.is_negative(), "negative");
    big_uint_to_u256(input.magnitude())
}

pub fn u256_to_big_decimal(u256: &U256) -> BigDecimal {
    BigDecimal::new(u256_to_big_int(u256), 0)
}

/// Converts an integral, non-negative decimal into a `U256`.
pub fn big_decimal_to_u256(big_decimal: &BigDecimal) -> Result<U256> {
    ensure!(big_decimal.is_integer(), "not an integer");
    let (int, _) = big_decimal.with_scale(0).into_bigint_and_exponent();
    big_int_to_u256(&int)
}

/// Scales an amount given in token units (e.g. `1.5` WETH) to its raw
/// representation with `decimals` decimals. Digits beyond the token's
/// precision are truncated.
pub fn decimal_to_raw(amount: &BigDecimal, decimals: u8) -> Result<U256> {
    let factor = BigDecimal::new(BigInt::one(), -i64::from(decimals));
    let (int, _) = (amount * factor).with_scale(0).into_bigint_and_exponent();
    big_int_to_u256(&int).with_context(|| format!("cannot represent {amount} as raw amount"))
}

/// Inverse of [`decimal_to_raw`], exact.
pub fn raw_to_decimal(raw: &U256, decimals: u8) -> BigDecimal {
    BigDecimal::new(u256_to_big_int(raw), i64::from(decimals))
}

pub fn big_decimal_to_f64(value: &BigDecimal) -> Result<f64> {
    value
        .to_f64()
        .filter(|value| value.is_finite())
        .with_context(|| format!("{value} is not representable as f64"))
}

pub fn f64_to_big_decimal(value: f64) -> Result<BigDecimal> {
    BigDecimal::from_f64(value).with_context(|| format!("{value} is not a finite number"))
}

/// Converts a floating point token amount to its raw representation,
/// rounding down. Negative amounts are an error.
pub fn f64_to_raw(amount: f64, decimals: u8) -> Result<U256> {
    ensure!(amount >= 0., "negative amount {amount}");
    decimal_to_raw(&f64_to_big_decimal(amount)?, decimals)
}
