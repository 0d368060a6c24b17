//! Entry point of the router: validates a quote request against a pool
//! snapshot, searches paths, allocates the amount and formats the result.

use {
    crate::{
        Config,
        SwapKind,
        direct,
        error::Error,
        format::{SwapInfo, format_swaps},
        metrics,
        optimizer::{self, Allocation},
        paths::candidate_paths,
        pools::Pool,
    },
    bigdecimal::BigDecimal,
    number::conversions::{big_decimal_to_f64, decimal_to_raw},
    primitive_types::H160,
    serde::Deserialize,
    serde_with::{DisplayFromStr, serde_as},
};

/// A trade to route. Amounts are in token units, e.g. `1.5` for 1.5 WETH.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: H160,
    pub token_out: H160,
    pub kind: SwapKind,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: BigDecimal,
    /// Maximum number of pools the route may use.
    pub max_pools: usize,
    /// Gas cost of one hop, in units of the returned token.
    #[serde(default)]
    pub cost_per_hop: f64,
    /// Intermediate tokens of two hop paths. Any token is used when empty.
    #[serde(default)]
    pub hop_tokens: Vec<H160>,
}

/// Computes the best swaps for `request` over `pools`. An empty
/// [`SwapInfo`] means that the pools cannot absorb the requested amount.
pub fn get_best_swaps(
    pools: &[Pool],
    request: &QuoteRequest,
    config: &Config,
) -> Result<SwapInfo, Error> {
    let total = validate(pools, request)?;
    if total == 0. {
        return Ok(SwapInfo::empty(request.token_in, request.token_out));
    }
    let paths = candidate_paths(
        pools,
        request.token_in,
        request.token_out,
        request.kind,
        &request.hop_tokens,
        config,
    )?;
    if paths.is_empty() {
        metrics::insufficient_liquidity(request.kind, 0);
        return Ok(SwapInfo::empty(request.token_in, request.token_out));
    }
    let allocation = optimizer::optimize(
        paths,
        request.kind,
        total,
        request.max_pools,
        request.cost_per_hop,
        config,
    );
    finish(pools, request, config, &allocation)
}

/// Like [`get_best_swaps`] but routes over weighted pools only, with the
/// legacy linearized price search.
pub fn get_best_swaps_direct(
    pools: &[Pool],
    request: &QuoteRequest,
    config: &Config,
) -> Result<SwapInfo, Error> {
    if validate(pools, request)? == 0. {
        return Ok(SwapInfo::empty(request.token_in, request.token_out));
    }
    let allocation = direct::optimize(
        pools,
        request.token_in,
        request.token_out,
        request.kind,
        &request.amount,
        request.max_pools,
        request.cost_per_hop,
        &request.hop_tokens,
        config,
    )?;
    finish(pools, request, config, &allocation)
}

/// Checks the snapshot and the request. Returns the amount as `f64`, zero
/// amounts having nothing to route.
fn validate(pools: &[Pool], request: &QuoteRequest) -> Result<f64, Error> {
    for pool in pools {
        pool.validate()?;
    }
    if request.token_in == request.token_out {
        return Err(Error::InvalidAmount("token swapped for itself".to_owned()));
    }
    if request.amount < BigDecimal::default() {
        return Err(Error::InvalidAmount(format!(
            "{} is negative",
            request.amount
        )));
    }
    if request.amount == BigDecimal::default() {
        return Ok(0.);
    }
    big_decimal_to_f64(&request.amount).map_err(|err| Error::InvalidAmount(format!("{err:#}")))
}

fn finish(
    pools: &[Pool],
    request: &QuoteRequest,
    config: &Config,
    allocation: &Allocation,
) -> Result<SwapInfo, Error> {
    let Some(first) = allocation.paths.first() else {
        return Ok(SwapInfo::empty(request.token_in, request.token_out));
    };
    let kind = request.kind;
    let decimals = match kind {
        SwapKind::ExactIn => first.hops[0].decimals_in,
        SwapKind::ExactOut => first.hops[first.hops.len() - 1].decimals_out,
    };
    let total = decimal_to_raw(&request.amount, decimals)
        .map_err(|err| Error::InvalidAmount(format!("{err:#}")))?;

    let info = format_swaps(
        allocation,
        pools,
        kind,
        total,
        request.cost_per_hop,
        config.current_timestamp,
    )?;
    metrics::route_found(kind, allocation.paths.len(), info.swaps.len());
    tracing::debug!(
        token_in = ?request.token_in,
        token_out = ?request.token_out,
        ?kind,
        amount = %request.amount,
        return_amount = %info.return_amount,
        "computed route"
    );
    Ok(info)
}
