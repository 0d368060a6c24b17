//! End to end quotes over small pool snapshots.

use {
    maplit::hashmap,
    primitive_types::{H160, H256, U256},
    serde_json::json,
    sor::{Config, QuoteRequest, Snapshot, SwapKind, get_best_swaps, get_best_swaps_direct},
};

fn address(value: u64) -> String {
    format!("{:?}", H160::from_low_u64_be(value))
}

fn id(value: u64) -> String {
    format!("{:?}", H256::from_low_u64_be(value))
}

fn weighted(pool: u64, tokens: &[(u64, &str)], fee: &str) -> serde_json::Value {
    json!({
        "poolType": "Weighted",
        "id": id(pool),
        "address": address(0x1000 + pool),
        "swapFee": fee,
        "totalShares": "1000",
        "tokens": tokens
            .iter()
            .map(|(token, balance)| json!({
                "address": address(*token),
                "balance": balance,
                "decimals": 18,
                "weight": "0.5",
            }))
            .collect::<Vec<_>>(),
    })
}

fn snapshot(pools: Vec<serde_json::Value>) -> Snapshot {
    serde_json::from_value(json!({ "pools": pools })).unwrap()
}

fn request(kind: SwapKind, amount: &str, cost_per_hop: f64) -> QuoteRequest {
    serde_json::from_value(json!({
        "tokenIn": address(1),
        "tokenOut": address(2),
        "kind": kind,
        "amount": amount,
        "maxPools": 4,
        "costPerHop": cost_per_hop,
    }))
    .unwrap()
}

fn to_f64(amount: U256) -> f64 {
    amount.as_u128() as f64 / 1e18
}

fn assert_close(actual: f64, expected: f64, relative: f64) {
    assert!(
        ((actual - expected) / expected).abs() < relative,
        "{actual} is not within {relative} of {expected}"
    );
}

#[test]
fn single_weighted_pool() {
    let snapshot = snapshot(vec![weighted(1, &[(1, "100"), (2, "100")], "0.003")]);
    let info = get_best_swaps(
        &snapshot.pools,
        &request(SwapKind::ExactIn, "10", 0.),
        &Config::default(),
    )
    .unwrap();

    assert_eq!(info.swaps.len(), 1);
    assert_eq!(info.swaps[0].amount, U256::exp10(19));
    assert_eq!(info.swap_amount, U256::exp10(19));
    assert_close(to_f64(info.return_amount), 9.066108938801491, 1e-9);
    assert_eq!(info.return_amount_considering_fees, info.return_amount);
    assert_close(info.market_sp, (109.97 / 100.) * (109.97 / 100.) / 0.997, 1e-9);
}

#[test]
fn two_pools_split_by_liquidity() {
    let snapshot = snapshot(vec![
        weighted(1, &[(1, "100"), (2, "100")], "0.003"),
        weighted(2, &[(1, "300"), (2, "300")], "0.003"),
    ]);
    let info = get_best_swaps(
        &snapshot.pools,
        &request(SwapKind::ExactIn, "20", 0.),
        &Config::default(),
    )
    .unwrap();

    let expected = hashmap! {
        H256::from_low_u64_be(1) => 5.,
        H256::from_low_u64_be(2) => 15.,
    };
    assert_eq!(info.swaps.len(), 2);
    for swap in &info.swaps {
        assert_close(to_f64(swap.amount), expected[&swap.pool_id], 1e-3);
    }
    let total = info
        .swaps
        .iter()
        .fold(U256::zero(), |sum, swap| sum + swap.amount);
    assert_eq!(total, U256::exp10(19) * 2);

    // more than a single pool returns for the whole amount
    let single = get_best_swaps(
        &snapshot.pools[1..],
        &request(SwapKind::ExactIn, "20", 0.),
        &Config::default(),
    )
    .unwrap();
    assert!(info.return_amount > single.return_amount);

    // the legacy router finds a close split
    let direct = get_best_swaps_direct(
        &snapshot.pools,
        &request(SwapKind::ExactIn, "20", 0.),
        &Config::default(),
    )
    .unwrap();
    assert_close(to_f64(direct.return_amount), to_f64(info.return_amount), 1e-4);
}

#[test]
fn gas_costs_are_netted() {
    let snapshot = snapshot(vec![
        weighted(1, &[(1, "100"), (2, "100")], "0.003"),
        weighted(2, &[(1, "300"), (2, "300")], "0.003"),
    ]);
    let info = get_best_swaps(
        &snapshot.pools,
        &request(SwapKind::ExactIn, "20", 1.),
        &Config::default(),
    )
    .unwrap();
    assert_eq!(info.swaps.len(), 1);
    assert_eq!(
        info.return_amount_considering_fees,
        info.return_amount - U256::exp10(18)
    );

    let info = get_best_swaps(
        &snapshot.pools,
        &request(SwapKind::ExactOut, "15", 0.5),
        &Config::default(),
    )
    .unwrap();
    assert!(!info.is_empty());
    let hops = info.swaps.len() as u64;
    assert_eq!(
        info.return_amount_considering_fees,
        info.return_amount + U256::exp10(17) * 5 * hops
    );
}

#[test]
fn insufficient_liquidity_is_an_empty_result() {
    let snapshot = snapshot(vec![
        weighted(1, &[(1, "100"), (2, "100")], "0.003"),
        weighted(2, &[(1, "100"), (2, "100")], "0.003"),
    ]);
    for kind in [SwapKind::ExactIn, SwapKind::ExactOut] {
        let info =
            get_best_swaps(&snapshot.pools, &request(kind, "61", 0.), &Config::default()).unwrap();
        assert!(info.is_empty());
        assert_eq!(info.return_amount, U256::zero());
    }
}

#[test]
fn exact_out_over_two_hops() {
    let snapshot = snapshot(vec![
        weighted(1, &[(1, "1000"), (3, "1000")], "0.003"),
        weighted(2, &[(3, "1000"), (2, "1000")], "0.003"),
        weighted(3, &[(1, "100"), (2, "100")], "0.003"),
    ]);
    let info = get_best_swaps(
        &snapshot.pools,
        &request(SwapKind::ExactOut, "20", 0.),
        &Config::default(),
    )
    .unwrap();

    // the deep two hop path takes most of the trade
    let first = &info.swaps[0];
    assert_eq!(first.pool_id, H256::from_low_u64_be(2));
    assert_eq!(first.token_out, H160::from_low_u64_be(2));
    assert!(first.amount > U256::exp10(19));
    assert_eq!(info.swaps[1].pool_id, H256::from_low_u64_be(1));
    assert_eq!(info.swaps[1].amount, U256::zero());

    let total = info
        .swaps
        .iter()
        .filter(|swap| swap.token_out == H160::from_low_u64_be(2))
        .fold(U256::zero(), |sum, swap| sum + swap.amount);
    assert_eq!(total, U256::exp10(19) * 2);
    assert!(info.return_amount > U256::exp10(19) * 2);
}

#[test]
fn boosted_path_through_a_linear_pool() {
    let linear = address(0x2001);
    let snapshot = snapshot(vec![
        json!({
            "poolType": "Linear",
            "id": id(10),
            "address": linear,
            "swapFee": "0.01",
            "totalShares": "1000",
            "mainIndex": 0,
            "wrappedIndex": 1,
            "lowerTarget": "100",
            "upperTarget": "1000",
            "tokens": [
                { "address": address(1), "balance": "500", "decimals": 18 },
                { "address": address(4), "balance": "500", "decimals": 18, "priceRate": "1" },
            ],
        }),
        json!({
            "poolType": "Stable",
            "id": id(11),
            "address": address(0x2002),
            "swapFee": "0.0004",
            "totalShares": "20000",
            "amp": "200",
            "tokens": [
                { "address": linear, "balance": "10000", "decimals": 18 },
                { "address": address(2), "balance": "10000", "decimals": 18 },
            ],
        }),
    ]);
    let info = get_best_swaps(
        &snapshot.pools,
        &request(SwapKind::ExactIn, "10", 0.),
        &Config::default(),
    )
    .unwrap();

    assert_eq!(info.swaps.len(), 2);
    assert_eq!(info.swaps[0].token_out, H160::from_low_u64_be(0x2001));
    assert_eq!(info.swaps[1].token_in, H160::from_low_u64_be(0x2001));
    let out = to_f64(info.return_amount);
    assert!(out > 9.9 && out < 10., "{out}");
}

#[test]
fn stable_invariant_of_balanced_pool() {
    let invariant = sor::pools::stable::invariant(600., &[1000., 1000., 1000.]);
    assert_close(invariant, 3000., 1e-12);
}
