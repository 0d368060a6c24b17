//! Weighted pool math of the Balancer V2 `WeightedMath` library, including
//! the single token joins and exits used for pool share swaps.
//!
//! The trade size ratios of the contract are not enforced here, since the
//! router never allocates beyond the per-swap limits in the first place.

use super::{error::Error, fixed_point::Bfp};

pub fn calc_out_given_in(
    balance_in: Bfp,
    weight_in: Bfp,
    balance_out: Bfp,
    weight_out: Bfp,
    amount_in: Bfp,
) -> Result<Bfp, Error> {
    let denominator = balance_in.add(amount_in)?;
    let base = balance_in.div_up(denominator)?;
    let exponent = weight_in.div_down(weight_out)?;
    let power = base.pow_up(exponent)?;

    balance_out.mul_down(power.complement())
}

pub fn calc_in_given_out(
    balance_in: Bfp,
    weight_in: Bfp,
    balance_out: Bfp,
    weight_out: Bfp,
    amount_out: Bfp,
) -> Result<Bfp, Error> {
    let base = balance_out.div_up(balance_out.sub(amount_out)?)?;
    let exponent = weight_out.div_up(weight_in)?;
    let power = base.pow_up(exponent)?;
    let ratio = power.sub(Bfp::one())?;

    balance_in.mul_up(ratio)
}

pub fn calc_bpt_out_given_exact_token_in(
    balance: Bfp,
    weight: Bfp,
    amount_in: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let balance_ratio_with_fee = balance.add(amount_in)?.div_down(balance)?;
    let invariant_ratio_with_fees = balance_ratio_with_fee
        .mul_down(weight)?
        .add(weight.complement())?;

    let amount_in_without_fee = if balance_ratio_with_fee > invariant_ratio_with_fees {
        let non_taxable_amount = balance.mul_down(invariant_ratio_with_fees.sub(Bfp::one())?)?;
        let taxable_amount = amount_in.sub(non_taxable_amount)?;
        non_taxable_amount.add(taxable_amount.mul_down(swap_fee.complement())?)?
    } else {
        amount_in
    };

    let balance_ratio = balance.add(amount_in_without_fee)?.div_down(balance)?;
    let invariant_ratio = balance_ratio.pow_down(weight)?;
    if invariant_ratio > Bfp::one() {
        bpt_total_supply.mul_down(invariant_ratio.sub(Bfp::one())?)
    } else {
        Ok(Bfp::zero())
    }
}

pub fn calc_token_in_given_exact_bpt_out(
    balance: Bfp,
    weight: Bfp,
    bpt_amount_out: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let invariant_ratio = bpt_total_supply
        .add(bpt_amount_out)?
        .div_up(bpt_total_supply)?;
    let balance_ratio = invariant_ratio.pow_up(Bfp::one().div_up(weight)?)?;
    let amount_in_without_fee = balance.mul_up(balance_ratio.sub(Bfp::one())?)?;

    let taxable_amount = amount_in_without_fee.mul_up(weight.complement())?;
    let non_taxable_amount = amount_in_without_fee.sub(taxable_amount)?;
    non_taxable_amount.add(taxable_amount.div_up(swap_fee.complement())?)
}

pub fn calc_token_out_given_exact_bpt_in(
    balance: Bfp,
    weight: Bfp,
    bpt_amount_in: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let invariant_ratio = bpt_total_supply
        .sub(bpt_amount_in)?
        .div_up(bpt_total_supply)?;
    let balance_ratio = invariant_ratio.pow_up(Bfp::one().div_down(weight)?)?;
    let amount_out_without_fee = balance.mul_down(balance_ratio.complement())?;

    let taxable_amount = amount_out_without_fee.mul_up(weight.complement())?;
    let non_taxable_amount = amount_out_without_fee.sub(taxable_amount)?;
    non_taxable_amount.add(taxable_amount.mul_down(swap_fee.complement())?)
}

pub fn calc_bpt_in_given_exact_token_out(
    balance: Bfp,
    weight: Bfp,
    amount_out: Bfp,
    bpt_total_supply: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let balance_ratio_without_fee = balance.sub(amount_out)?.div_up(balance)?;
    let invariant_ratio_without_fees = balance_ratio_without_fee
        .mul_up(weight)?
        .add(weight.complement())?;

    let amount_out_with_fee = if invariant_ratio_without_fees > balance_ratio_without_fee {
        let non_taxable_amount = balance.mul_down(invariant_ratio_without_fees.complement())?;
        let taxable_amount = amount_out.sub(non_taxable_amount)?;
        non_taxable_amount.add(taxable_amount.div_up(swap_fee.complement())?)?
    } else {
        amount_out
    };

    let balance_ratio = balance.sub(amount_out_with_fee)?.div_down(balance)?;
    let invariant_ratio = balance_ratio.pow_down(weight)?;
    bpt_total_supply.mul_up(invariant_ratio.complement())
}
