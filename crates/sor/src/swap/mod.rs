//! On-chain accurate pool math used to evaluate the final swaps of a
//! route. Every function mirrors the rounding of the Balancer V2 contracts.

use {error::Error, fixed_point::Bfp, primitive_types::U256};

pub mod element_math;
pub mod error;
pub mod fixed_point;
pub mod linear_math;
mod log_exp_math;
mod math;
pub mod stable_math;
pub mod weighted_math;

pub fn add_swap_fee_amount(amount: U256, swap_fee: Bfp) -> Result<U256, Error> {
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/6c9e24e22d0c46cca6dd15861d3d33da61a60b98/pkg/core/contracts/pools/BasePool.sol#L454-L457
    let amount_with_fees = Bfp::from_wei(amount).div_up(swap_fee.complement())?;
    Ok(amount_with_fees.as_uint256())
}

pub fn subtract_swap_fee_amount(amount: U256, swap_fee: Bfp) -> Result<U256, Error> {
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/6c9e24e22d0c46cca6dd15861d3d33da61a60b98/pkg/core/contracts/pools/BasePool.sol#L462-L466
    let amount = Bfp::from_wei(amount);
    let fee_amount = amount.mul_up(swap_fee)?;
    let amount_without_fees = amount.sub(fee_amount)?;
    Ok(amount_without_fees.as_uint256())
}

/// Raw token balance together with the factor converting it to the 18
/// decimal representation the pool math works with. For tokens with a
/// price rate the factor includes the rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TokenState {
    pub balance: U256,
    pub scaling_factor: Bfp,
}

impl TokenState {
    /// Converts the stored balance into its internal representation as a
    /// Balancer fixed point number.
    pub fn upscaled_balance(&self) -> Result<Bfp, Error> {
        self.upscale(self.balance)
    }

    /// Scales the input token amount to the value that is used by the Balancer
    /// contract to execute math operations.
    pub fn upscale(&self, amount: U256) -> Result<Bfp, Error> {
        Bfp::from_wei(amount).mul_down(self.scaling_factor)
    }

    /// Returns the token amount corresponding to the internal Balancer
    /// representation for the same amount, rounding up.
    pub fn downscale_up(&self, amount: Bfp) -> Result<U256, Error> {
        Ok(amount.div_up(self.scaling_factor)?.as_uint256())
    }

    /// Similar to downscale up above, but rounded down.
    pub fn downscale_down(&self, amount: Bfp) -> Result<U256, Error> {
        Ok(amount.div_down(self.scaling_factor)?.as_uint256())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_fees() {
        let fee = bfp!("0.003");
        assert_eq!(
            subtract_swap_fee_amount(U256::from(1_000_000), fee).unwrap(),
            U256::from(997_000)
        );
        // 997000 / 0.997
        assert_eq!(
            add_swap_fee_amount(U256::from(997_000), fee).unwrap(),
            U256::from(1_000_000)
        );
        // rounds in favour of the pool
        assert_eq!(
            subtract_swap_fee_amount(U256::from(1), fee).unwrap(),
            U256::zero()
        );
    }

    #[test]
    fn scaling() {
        let usdc = TokenState {
            balance: U256::from(1_500_000),
            scaling_factor: Bfp::exp10(12),
        };
        assert_eq!(usdc.upscaled_balance().unwrap(), bfp!("1.5"));
        assert_eq!(usdc.downscale_down(bfp!("0.0000015")).unwrap(), 1.into());
        assert_eq!(usdc.downscale_up(bfp!("0.0000015")).unwrap(), 2.into());
    }
}
