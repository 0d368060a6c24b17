//! State shared by all pool types and conversions from the snapshot
//! representation into the numeric domains the router works in.

use {
    crate::{
        error::Error,
        swap::{TokenState, fixed_point::Bfp},
    },
    bigdecimal::BigDecimal,
    number::conversions::{big_decimal_to_f64, decimal_to_raw},
    primitive_types::{H160, H256, U256},
    serde::Deserialize,
    serde_with::{DisplayFromStr, serde_as},
};

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: H160,
    /// Balance in token units, i.e. `1.5` for 1.5 WETH.
    #[serde_as(as = "DisplayFromStr")]
    pub balance: BigDecimal,
    pub decimals: u8,
    /// Normalized weight, weighted pools only.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub weight: Option<BigDecimal>,
    /// Value of one token in terms of the pool's unit of account. Defaults
    /// to one.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub price_rate: Option<BigDecimal>,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonPoolState {
    pub id: H256,
    pub address: H160,
    #[serde_as(as = "DisplayFromStr")]
    pub swap_fee: BigDecimal,
    /// Supply of the pool share token, 18 decimals.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub total_shares: BigDecimal,
    pub tokens: Vec<Token>,
}

/// Number of decimals of every Balancer pool share token.
pub const BPT_DECIMALS: u8 = 18;

/// Share of a balance a single swap may take.
pub const MAX_IN_RATIO: f64 = 0.3;
pub const MAX_OUT_RATIO: f64 = 0.3;

impl CommonPoolState {
    pub fn token_index(&self, token: H160) -> Option<usize> {
        self.tokens.iter().position(|t| t.address == token)
    }

    pub fn index_of(&self, token: H160) -> Result<usize, Error> {
        self.token_index(token).ok_or(Error::TokenNotInPool {
            pool: format!("{:?}", self.id),
            token,
        })
    }

    pub fn invalid(&self, reason: impl ToString) -> Error {
        Error::invalid_pool(format!("{:?}", self.id), reason)
    }

    /// Checks the invariants every pool snapshot has to satisfy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tokens.len() < 2 {
            return Err(self.invalid("pools need at least two tokens"));
        }
        let fee = self.f64(&self.swap_fee, "swap fee")?;
        if !(0. ..1.).contains(&fee) {
            return Err(self.invalid(format!("swap fee {fee} outside of [0, 1)")));
        }
        if self.total_shares < BigDecimal::default() {
            return Err(self.invalid("negative total shares"));
        }
        for token in &self.tokens {
            if token.balance < BigDecimal::default() {
                return Err(self.invalid(format!("negative balance of {:?}", token.address)));
            }
            scaling_exponent_from_decimals(token.decimals).map_err(|err| self.invalid(err))?;
        }
        Ok(())
    }

    pub fn f64(&self, value: &BigDecimal, field: &str) -> Result<f64, Error> {
        big_decimal_to_f64(value).map_err(|err| self.invalid(format!("{field}: {err}")))
    }

    pub fn bfp(&self, value: &BigDecimal, field: &str) -> Result<Bfp, Error> {
        Bfp::try_from(value).map_err(|err| self.invalid(format!("{field}: {err:#}")))
    }

    pub fn swap_fee_f64(&self) -> Result<f64, Error> {
        self.f64(&self.swap_fee, "swap fee")
    }

    pub fn swap_fee_bfp(&self) -> Result<Bfp, Error> {
        self.bfp(&self.swap_fee, "swap fee")
    }

    pub fn total_shares_f64(&self) -> Result<f64, Error> {
        self.f64(&self.total_shares, "total shares")
    }

    pub fn balance_f64(&self, index: usize) -> Result<f64, Error> {
        self.f64(&self.tokens[index].balance, "balance")
    }

    pub fn price_rate_f64(&self, index: usize) -> Result<f64, Error> {
        match &self.tokens[index].price_rate {
            Some(rate) => self.f64(rate, "price rate"),
            None => Ok(1.),
        }
    }

    pub fn price_rate_bfp(&self, index: usize) -> Result<Bfp, Error> {
        match &self.tokens[index].price_rate {
            Some(rate) => self.bfp(rate, "price rate"),
            None => Ok(Bfp::one()),
        }
    }

    /// Raw balances and share supply as tracked by a simulation.
    pub fn raw_balances(&self) -> Result<(Vec<U256>, U256), Error> {
        let balances = self
            .tokens
            .iter()
            .map(|token| {
                decimal_to_raw(&token.balance, token.decimals)
                    .map_err(|err| self.invalid(format!("{err:#}")))
            })
            .collect::<Result<_, _>>()?;
        let total_shares = decimal_to_raw(&self.total_shares, BPT_DECIMALS)
            .map_err(|err| self.invalid(format!("{err:#}")))?;
        Ok((balances, total_shares))
    }

    /// Token state of `index` for raw `balance`, scaled by decimals only.
    pub fn token_state(&self, index: usize, balance: U256) -> Result<TokenState, Error> {
        let scaling_factor = scaling_factor_from_decimals(self.tokens[index].decimals)
            .map_err(|err| self.invalid(err))?;
        Ok(TokenState {
            balance,
            scaling_factor,
        })
    }

    /// Token state of `index` for raw `balance`, scaled by decimals and the
    /// token's price rate.
    pub fn rated_token_state(&self, index: usize, balance: U256) -> Result<TokenState, Error> {
        let state = self.token_state(index, balance)?;
        Ok(TokenState {
            scaling_factor: state
                .scaling_factor
                .mul_down(self.price_rate_bfp(index)?)?,
            ..state
        })
    }
}

/// Returns the scaling factor for the specified token decimals.
pub fn scaling_factor_from_decimals(decimals: u8) -> anyhow::Result<Bfp> {
    Ok(Bfp::exp10(scaling_exponent_from_decimals(decimals)?.into()))
}

/// Converts a token decimal count to its corresponding scaling exponent.
pub fn scaling_exponent_from_decimals(decimals: u8) -> anyhow::Result<u8> {
    use anyhow::Context;
    // Balancer contracts do not support tokens with more than 18 decimals.
    18u8.checked_sub(decimals)
        .context("unsupported token with more than 18 decimals")
}

#[cfg(test)]
mod tests {
    use {super::*, std::str::FromStr};

    pub fn token(address: u64, balance: &str, decimals: u8) -> Token {
        Token {
            address: H160::from_low_u64_be(address),
            balance: BigDecimal::from_str(balance).unwrap(),
            decimals,
            weight: None,
            price_rate: None,
        }
    }

    fn pool(tokens: Vec<Token>) -> CommonPoolState {
        CommonPoolState {
            id: H256::from_low_u64_be(1),
            address: H160::from_low_u64_be(100),
            swap_fee: BigDecimal::from_str("0.003").unwrap(),
            total_shares: BigDecimal::from_str("1000").unwrap(),
            tokens,
        }
    }

    #[test]
    fn scaling_factor_from_decimals_ok_and_err() {
        assert_eq!(scaling_factor_from_decimals(18).unwrap(), Bfp::exp10(0));
        assert_eq!(scaling_factor_from_decimals(6).unwrap(), Bfp::exp10(12));
        assert!(scaling_factor_from_decimals(19).is_err());
    }

    #[test]
    fn validation() {
        let valid = pool(vec![token(1, "100", 18), token(2, "200", 6)]);
        assert!(valid.validate().is_ok());

        let single = pool(vec![token(1, "100", 18)]);
        assert!(matches!(single.validate(), Err(Error::InvalidPool { .. })));

        let negative = pool(vec![token(1, "-1", 18), token(2, "200", 6)]);
        assert!(negative.validate().is_err());

        let too_precise = pool(vec![token(1, "1", 19), token(2, "200", 6)]);
        assert!(too_precise.validate().is_err());

        let mut expensive = valid.clone();
        expensive.swap_fee = BigDecimal::from(1);
        assert!(expensive.validate().is_err());
    }

    #[test]
    fn raw_balances_and_scaling() {
        let pool = pool(vec![token(1, "1.5", 18), token(2, "2.25", 6)]);
        let (balances, shares) = pool.raw_balances().unwrap();
        assert_eq!(balances, vec![U256::exp10(17) * 15, U256::from(2_250_000)]);
        assert_eq!(shares, U256::exp10(21));

        let usdc = pool.token_state(1, balances[1]).unwrap();
        assert_eq!(usdc.upscaled_balance().unwrap(), bfp!("2.25"));
        assert_eq!(
            pool.index_of(H160::from_low_u64_be(3)).unwrap_err().to_string(),
            format!(
                "token {:?} is not traded by pool {:?}",
                H160::from_low_u64_be(3),
                pool.id
            )
        );
    }
}
