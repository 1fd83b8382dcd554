//! Pool state serializes losslessly: off-chain clients mirror the
//! engine by round-tripping the full object graph.

use lattice_core::{Balance, BinStepConfig, Pool, Position, Registry, TokenTag};

fn tokens() -> (TokenTag, TokenTag) {
    (
        TokenTag::from("0xaa::base::BASE"),
        TokenTag::from("0xbb::quote::QUOTE"),
    )
}

fn busy_pool() -> (Pool, Position) {
    let (a, b) = tokens();
    let config = BinStepConfig::new(25, 1, 60, 600, 9000, 40_000, 350_000, 100_000_000).unwrap();
    let mut registry = Registry::new();
    let mut pool = registry.create_pool_with_config(config, 0, a.clone(), b.clone(), 0).unwrap();
    pool.update_base_fee_rate(30_000).unwrap();

    let (mut position, open_cert) = pool.open_position(-1, 3, true).unwrap();
    let cert = pool
        .add_liquidity(
            &mut position,
            &[-1, 0, 1],
            &[0, 500_000, 500_000],
            &[500_000, 500_000, 0],
            1,
        )
        .unwrap();
    let (total_a, total_b) = cert.totals();
    pool.repay_add(
        &mut position,
        cert,
        Balance::new(a.clone(), total_a),
        Balance::new(b.clone(), total_b),
    )
    .unwrap();
    pool.repay_open(&mut position, open_cert, Balance::new(a, 0), Balance::new(b, 0))
        .unwrap();

    let reward = TokenTag::from("0xcc::points::POINTS");
    pool.initialize_reward(reward.clone(), false, 2).unwrap();
    pool.add_reward(&reward, 7200, None, 2 + 7200, 2).unwrap();

    pool.swap_exact_in(300_000, true, 10, None).unwrap();
    (pool, position)
}

#[test]
fn pool_round_trips_through_json() {
    let (pool, _position) = busy_pool();

    let encoded = serde_json::to_string(&pool).unwrap();
    let decoded: Pool = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded.id, pool.id);
    assert_eq!(decoded.active_id, pool.active_id);
    assert_eq!(decoded.base_fee_rate, pool.base_fee_rate);
    assert_eq!(decoded.bins, pool.bins);
    assert_eq!(decoded.rewards, pool.rewards);
    assert_eq!(decoded.v_parameters, pool.v_parameters);
    assert_eq!(decoded.protocol_fee_a, pool.protocol_fee_a);
}

#[test]
fn position_round_trips_through_json() {
    let (_pool, position) = busy_pool();

    let encoded = serde_json::to_string(&position).unwrap();
    let decoded: Position = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, position);
}

#[test]
fn decoded_pool_keeps_quoting() {
    let (pool, _position) = busy_pool();

    let encoded = serde_json::to_string(&pool).unwrap();
    let decoded: Pool = serde_json::from_str(&encoded).unwrap();

    let quote = pool.preview_swap(50_000, true, true, 20, None).unwrap();
    let replayed = decoded.preview_swap(50_000, true, true, 20, None).unwrap();
    assert_eq!(quote, replayed);
}
