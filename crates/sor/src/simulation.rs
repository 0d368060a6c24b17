//! Private scratch copy of pool balances. Swaps of a route are executed in
//! order and later swaps through the same pool see the balances left by the
//! earlier ones. The snapshot itself is never mutated.

use {
    crate::{
        SwapKind,
        error::Error,
        pools::{PairIndices, Pool},
        swap::error::Error as MathError,
    },
    primitive_types::{H160, H256, U256},
    std::collections::{HashMap, hash_map::Entry},
};

/// Raw balances of a pool, in token decimals, and its share supply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolBalances {
    pub balances: Vec<U256>,
    pub total_shares: U256,
}

impl PoolBalances {
    /// Moves `amount_in` into and `amount_out` out of the pool. Share tokens
    /// paid in are burned and share tokens paid out are minted.
    pub fn settle(
        &mut self,
        indices: PairIndices,
        amount_in: U256,
        amount_out: U256,
    ) -> Result<(), Error> {
        match indices.token_in {
            Some(index) => {
                self.balances[index] = self.balances[index]
                    .checked_add(amount_in)
                    .ok_or(MathError::AddOverflow)?;
            }
            None => {
                self.total_shares = self
                    .total_shares
                    .checked_sub(amount_in)
                    .ok_or(MathError::SubOverflow)?;
            }
        }
        match indices.token_out {
            Some(index) => {
                self.balances[index] = self.balances[index]
                    .checked_sub(amount_out)
                    .ok_or(MathError::SubOverflow)?;
            }
            None => {
                self.total_shares = self
                    .total_shares
                    .checked_add(amount_out)
                    .ok_or(MathError::AddOverflow)?;
            }
        }
        Ok(())
    }
}

pub struct SimulationContext {
    now: u64,
    pools: HashMap<H256, PoolBalances>,
}

impl SimulationContext {
    /// `now` is the timestamp used by pools with an expiry.
    pub fn new(now: u64) -> Self {
        Self {
            now,
            pools: HashMap::new(),
        }
    }

    /// Current balances of a pool touched by the simulation.
    pub fn balances(&self, pool: &H256) -> Option<&PoolBalances> {
        self.pools.get(pool)
    }

    /// Executes a swap against the simulated state of `pool`. Returns the
    /// amount out for exact in swaps and the amount in otherwise.
    pub fn execute(
        &mut self,
        pool: &Pool,
        token_in: H160,
        token_out: H160,
        kind: SwapKind,
        amount: U256,
    ) -> Result<U256, Error> {
        let balances = match self.pools.entry(pool.id()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(pool.initial_balances()?),
        };
        // Execute on a copy so failed swaps leave no partial state behind.
        let mut updated = balances.clone();
        let result = pool.execute(&mut updated, token_in, token_out, kind, amount, self.now)?;
        *balances = updated;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::pools::{CommonPoolState, Token, WeightedPool},
        bigdecimal::BigDecimal,
        std::str::FromStr,
    };

    fn pool() -> Pool {
        let token = |address: u64| Token {
            address: H160::from_low_u64_be(address),
            balance: BigDecimal::from(100),
            decimals: 18,
            weight: Some(BigDecimal::from_str("0.5").unwrap()),
            price_rate: None,
        };
        Pool::Weighted(WeightedPool {
            common: CommonPoolState {
                id: H256::from_low_u64_be(1),
                address: H160::from_low_u64_be(0x100),
                swap_fee: BigDecimal::from_str("0.003").unwrap(),
                total_shares: BigDecimal::from(100),
                tokens: vec![token(1), token(2)],
            },
        })
    }

    #[test]
    fn later_swaps_see_earlier_ones() {
        let pool = pool();
        let (a, b) = (H160::from_low_u64_be(1), H160::from_low_u64_be(2));
        let mut context = SimulationContext::new(0);
        let amount = U256::exp10(19);
        let first = context
            .execute(&pool, a, b, SwapKind::ExactIn, amount)
            .unwrap();
        let second = context
            .execute(&pool, a, b, SwapKind::ExactIn, amount)
            .unwrap();
        assert!(second < first);

        let balances = context.balances(&pool.id()).unwrap();
        assert_eq!(balances.balances[0], U256::exp10(20) + amount * 2);
        assert_eq!(balances.balances[1], U256::exp10(20) - first - second);
        // the snapshot is untouched
        assert_eq!(pool.initial_balances().unwrap().balances[0], U256::exp10(20));
    }

    #[test]
    fn failed_swaps_leave_balances_untouched() {
        let pool = pool();
        let (a, b) = (H160::from_low_u64_be(1), H160::from_low_u64_be(2));
        let mut context = SimulationContext::new(0);
        assert!(
            context
                .execute(&pool, a, b, SwapKind::ExactOut, U256::exp10(21))
                .is_err()
        );
        assert_eq!(
            context.balances(&pool.id()),
            Some(&pool.initial_balances().unwrap())
        );
    }

    #[test]
    fn settles_share_tokens() {
        let mut balances = PoolBalances {
            balances: vec![U256::from(10), U256::from(10)],
            total_shares: U256::from(100),
        };
        let exit = PairIndices {
            token_in: None,
            token_out: Some(1),
        };
        balances.settle(exit, U256::from(5), U256::from(3)).unwrap();
        assert_eq!(balances.total_shares, U256::from(95));
        assert_eq!(balances.balances[1], U256::from(7));
        assert!(balances.settle(exit, U256::from(1), U256::from(8)).is_err());
    }
}
