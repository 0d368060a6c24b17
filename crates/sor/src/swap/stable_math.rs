//! Stable pool math of the Balancer V2 `StableMath` library.
//!
//! Balances are upscaled to 18 decimals and the amplification parameter
//! carries `AMP_PRECISION`.

use {
    super::{error::Error, fixed_point::Bfp, math::BalU256},
    crate::metrics::{self, Computation},
    primitive_types::U256,
    std::sync::LazyLock,
};

pub static AMP_PRECISION: LazyLock<U256> = LazyLock::new(|| U256::from(1000));

const MAX_ITERATIONS: usize = 255;

/// Computes the StableSwap invariant with Newton's method. Rounds down.
/// Stopping at the iteration cap is not an error, the last iterate is
/// returned.
pub fn calculate_invariant(amplification_parameter: U256, balances: &[Bfp]) -> Result<U256, Error> {
    invariant_within(amplification_parameter, balances, MAX_ITERATIONS)
}

fn invariant_within(
    amplification_parameter: U256,
    balances: &[Bfp],
    max_iterations: usize,
) -> Result<U256, Error> {
    let mut sum = U256::zero();
    for balance in balances {
        sum = sum.badd(balance.as_uint256())?;
    }
    if sum.is_zero() {
        return Ok(sum);
    }

    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;
    let mut invariant = sum;
    for _ in 0..max_iterations {
        let mut p_d = balances[0].as_uint256().bmul(num_tokens)?;
        for balance in &balances[1..] {
            p_d = p_d
                .bmul(balance.as_uint256())?
                .bmul(num_tokens)?
                .bdiv_down(invariant)?;
        }
        let prev_invariant = invariant;

        let numerator = num_tokens
            .bmul(invariant)?
            .bmul(invariant)?
            .badd(
                amp_times_total
                    .bmul(sum)?
                    .bmul(p_d)?
                    .bdiv_down(*AMP_PRECISION)?,
            )?;
        let denominator = num_tokens
            .badd(1.into())?
            .bmul(invariant)?
            .badd(
                amp_times_total
                    .bsub(*AMP_PRECISION)?
                    .bmul(p_d)?
                    .bdiv_down(*AMP_PRECISION)?,
            )?;
        invariant = numerator.bdiv_down(denominator)?;

        if abs_diff(invariant, prev_invariant) <= 1.into() {
            return Ok(invariant);
        }
    }
    metrics::non_convergence(Computation::StableInvariant, max_iterations);
    Ok(invariant)
}

/// Amount of `token_index_out` returned for `token_amount_in`, before
/// fees. `balances` are restored before returning.
pub fn calc_out_given_in(
    amplification_parameter: U256,
    balances: &mut [Bfp],
    token_index_in: usize,
    token_index_out: usize,
    token_amount_in: Bfp,
) -> Result<Bfp, Error> {
    let invariant = calculate_invariant(amplification_parameter, balances)?;

    balances[token_index_in] = balances[token_index_in].add(token_amount_in)?;
    let final_balance_out = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        invariant,
        token_index_out,
    );
    balances[token_index_in] = balances[token_index_in].sub(token_amount_in)?;

    // Round down the amount out by one wei in favour of the pool.
    balances[token_index_out]
        .sub(final_balance_out?)?
        .sub(Bfp::epsilon())
}

/// Amount of `token_index_in` required for `token_amount_out`, before
/// fees. `balances` are restored before returning.
pub fn calc_in_given_out(
    amplification_parameter: U256,
    balances: &mut [Bfp],
    token_index_in: usize,
    token_index_out: usize,
    token_amount_out: Bfp,
) -> Result<Bfp, Error> {
    let invariant = calculate_invariant(amplification_parameter, balances)?;

    balances[token_index_out] = balances[token_index_out].sub(token_amount_out)?;
    let final_balance_in = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        invariant,
        token_index_in,
    );
    balances[token_index_out] = balances[token_index_out].add(token_amount_out)?;

    final_balance_in?
        .sub(balances[token_index_in])?
        .add(Bfp::epsilon())
}

/// Pool shares minted for joining with `amount_in` of a single token.
pub fn calc_bpt_out_given_exact_token_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    amount_in: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let current_invariant = Bfp::from_wei(calculate_invariant(amplification_parameter, balances)?);
    let sum_balances = sum(balances)?;

    let mut balance_ratios_with_fee = Vec::with_capacity(balances.len());
    let mut invariant_ratio_with_fees = Bfp::zero();
    for (i, balance) in balances.iter().enumerate() {
        let amount = if i == token_index { amount_in } else { Bfp::zero() };
        let current_weight = balance.div_down(sum_balances)?;
        let ratio = balance.add(amount)?.div_down(*balance)?;
        invariant_ratio_with_fees = invariant_ratio_with_fees.add(ratio.mul_down(current_weight)?)?;
        balance_ratios_with_fee.push(ratio);
    }

    let mut new_balances = balances.to_vec();
    let balance = balances[token_index];
    let amount_in_without_fee = if balance_ratios_with_fee[token_index] > invariant_ratio_with_fees
    {
        let non_taxable_amount = if invariant_ratio_with_fees > Bfp::one() {
            balance.mul_down(invariant_ratio_with_fees.sub(Bfp::one())?)?
        } else {
            Bfp::zero()
        };
        let taxable_amount = amount_in.sub(non_taxable_amount)?;
        non_taxable_amount.add(taxable_amount.mul_down(swap_fee.complement())?)?
    } else {
        amount_in
    };
    new_balances[token_index] = balance.add(amount_in_without_fee)?;

    let new_invariant =
        Bfp::from_wei(calculate_invariant(amplification_parameter, &new_balances)?);
    let invariant_ratio = new_invariant.div_down(current_invariant)?;
    if invariant_ratio > Bfp::one() {
        bpt_total_supply.mul_down(invariant_ratio.sub(Bfp::one())?)
    } else {
        Ok(Bfp::zero())
    }
}

/// Amount of a single token required to mint exactly `bpt_amount_out`.
pub fn calc_token_in_given_exact_bpt_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    bpt_amount_out: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let current_invariant = Bfp::from_wei(calculate_invariant(amplification_parameter, balances)?);
    let new_invariant = bpt_total_supply
        .add(bpt_amount_out)?
        .div_up(bpt_total_supply)?
        .mul_up(current_invariant)?;
    let new_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        new_invariant.as_uint256(),
        token_index,
    )?;
    let amount_in_without_fee = new_balance.sub(balances[token_index])?;

    let taxable_percentage = balances[token_index].div_down(sum(balances)?)?.complement();
    let taxable_amount = amount_in_without_fee.mul_up(taxable_percentage)?;
    let non_taxable_amount = amount_in_without_fee.sub(taxable_amount)?;
    non_taxable_amount.add(taxable_amount.div_up(swap_fee.complement())?)
}

/// Pool shares burned for exiting with exactly `amount_out` of a single
/// token.
pub fn calc_bpt_in_given_exact_token_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    amount_out: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let current_invariant = Bfp::from_wei(calculate_invariant(amplification_parameter, balances)?);
    let sum_balances = sum(balances)?;

    let mut balance_ratios_without_fee = Vec::with_capacity(balances.len());
    let mut invariant_ratio_without_fees = Bfp::zero();
    for (i, balance) in balances.iter().enumerate() {
        let amount = if i == token_index { amount_out } else { Bfp::zero() };
        let current_weight = balance.div_up(sum_balances)?;
        let ratio = balance.sub(amount)?.div_up(*balance)?;
        invariant_ratio_without_fees =
            invariant_ratio_without_fees.add(ratio.mul_up(current_weight)?)?;
        balance_ratios_without_fee.push(ratio);
    }

    let mut new_balances = balances.to_vec();
    let balance = balances[token_index];
    let amount_out_with_fee =
        if invariant_ratio_without_fees > balance_ratios_without_fee[token_index] {
            let non_taxable_amount = balance.mul_down(invariant_ratio_without_fees.complement())?;
            let taxable_amount = amount_out.sub(non_taxable_amount)?;
            non_taxable_amount.add(taxable_amount.div_up(swap_fee.complement())?)?
        } else {
            amount_out
        };
    new_balances[token_index] = balance.sub(amount_out_with_fee)?;

    let new_invariant =
        Bfp::from_wei(calculate_invariant(amplification_parameter, &new_balances)?);
    let invariant_ratio = new_invariant.div_down(current_invariant)?;
    bpt_total_supply.mul_up(invariant_ratio.complement())
}

/// Amount of a single token returned for burning exactly `bpt_amount_in`.
pub fn calc_token_out_given_exact_bpt_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    bpt_amount_in: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let current_invariant = Bfp::from_wei(calculate_invariant(amplification_parameter, balances)?);
    let new_invariant = bpt_total_supply
        .sub(bpt_amount_in)?
        .div_up(bpt_total_supply)?
        .mul_up(current_invariant)?;
    let new_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        new_invariant.as_uint256(),
        token_index,
    )?;
    let amount_out_without_fee = balances[token_index].sub(new_balance)?;

    let taxable_percentage = balances[token_index].div_down(sum(balances)?)?.complement();
    let taxable_amount = amount_out_without_fee.mul_up(taxable_percentage)?;
    let non_taxable_amount = amount_out_without_fee.sub(taxable_amount)?;
    non_taxable_amount.add(taxable_amount.mul_down(swap_fee.complement())?)
}

fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b { a - b } else { b - a }
}

fn sum(balances: &[Bfp]) -> Result<Bfp, Error> {
    balances
        .iter()
        .try_fold(Bfp::zero(), |total, balance| total.add(*balance))
}

/// Solves the invariant for the balance of `token_index`, keeping all other
/// balances fixed. Rounds up.
fn get_token_balance_given_invariant_and_all_other_balances(
    amplification_parameter: U256,
    balances: &[Bfp],
    invariant: U256,
    token_index: usize,
) -> Result<Bfp, Error> {
    token_balance_within(
        amplification_parameter,
        balances,
        invariant,
        token_index,
        MAX_ITERATIONS,
    )
}

fn token_balance_within(
    amplification_parameter: U256,
    balances: &[Bfp],
    invariant: U256,
    token_index: usize,
    max_iterations: usize,
) -> Result<Bfp, Error> {
    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;
    let mut sum = balances[0].as_uint256();
    let mut p_d = balances[0].as_uint256().bmul(num_tokens)?;
    for balance in &balances[1..] {
        p_d = p_d
            .bmul(balance.as_uint256())?
            .bmul(num_tokens)?
            .bdiv_down(invariant)?;
        sum = sum.badd(balance.as_uint256())?;
    }
    // No need to use safe math, based on the loop above `sum` is greater
    // than or equal to `balances[token_index]`.
    sum -= balances[token_index].as_uint256();

    let inv2 = invariant.bmul(invariant)?;
    // Remove the balance from c by multiplying it.
    let c = inv2
        .bdiv_up(amp_times_total.bmul(p_d)?)?
        .bmul(*AMP_PRECISION)?
        .bmul(balances[token_index].as_uint256())?;
    let b = sum.badd(invariant.bdiv_down(amp_times_total)?.bmul(*AMP_PRECISION)?)?;

    // Iterate to find the balance, starting from the initial approximation
    // of the contract.
    let mut token_balance = inv2.badd(c)?.bdiv_up(invariant.badd(b)?)?;
    for _ in 0..max_iterations {
        let prev_token_balance = token_balance;
        token_balance = token_balance
            .bmul(token_balance)?
            .badd(c)?
            .bdiv_up(
                token_balance
                    .bmul(2.into())?
                    .badd(b)?
                    .bsub(invariant)?,
            )?;
        if abs_diff(token_balance, prev_token_balance) <= 1.into() {
            return Ok(Bfp::from_wei(token_balance));
        }
    }
    metrics::non_convergence(Computation::StableBalance, max_iterations);
    Ok(Bfp::from_wei(token_balance))
}
