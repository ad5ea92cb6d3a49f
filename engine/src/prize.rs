//! Deterministic fee and prize arithmetic. Everything rounds down;
//! the spare units of an even split go to the first winners in result
//! order.

use pluto_core::amount::Amount;

const BPS_DENOMINATOR: u64 = 10_000;

/// `floor(pot × feeBps / 10000)`.
pub fn platform_fee(pot: &Amount, fee_bps: u32) -> Amount {
    pot.mul_u64(fee_bps as u64).div_rem(BPS_DENOMINATOR).0
}

/// Split `prize_pool` evenly over `winners` shares; the remainder is
/// handed out one unit each to the first shares. The shares always sum
/// to `prize_pool` exactly and differ by at most one unit.
pub fn even_split(prize_pool: &Amount, winners: usize) -> Vec<Amount> {
    let (share, remainder) = prize_pool.div_rem(winners as u64);
    let one = Amount::from(1);
    (0..winners as u64)
        .map(|i| {
            if i < remainder {
                &share + &one
            } else {
                share.clone()
            }
        })
        .collect()
}
