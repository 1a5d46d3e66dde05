// ============ Fee Distribution Math Library ============
// Week bucketing, voting-power lines and fee splitting.
// All arithmetic is integer-only with floor division, matching the
// on-chain contracts bit for bit.

use thiserror::Error;
use vefee_types::{Point, MAXTIME, TOKEN_CHECKPOINT_WEEKS, WEEK};

// ============ Error Types ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

// ============ Week Bucketing ============

/// Start of the week bucket containing `t`
pub fn floor_week(t: u64) -> u64 {
    t / WEEK * WEEK
}

/// First week boundary at or after `t`
pub fn ceil_week(t: u64) -> u64 {
    (t + WEEK - 1) / WEEK * WEEK
}

/// Week boundaries from `start` through `end` inclusive, both rounded down
pub fn weeks_between(start: u64, end: u64) -> impl Iterator<Item = u64> {
    let first = floor_week(start);
    let last = floor_week(end);
    (first..=last).step_by(WEEK as usize)
}

// ============ Voting Power Lines ============

/// Decay rate of a lock: amount spread over the maximum lock time
pub fn lock_slope(amount: i128) -> i128 {
    amount / MAXTIME as i128
}

/// Point describing a lock of `amount` ending at `end`, observed at `now`.
/// Expired or empty locks yield a zero line.
pub fn lock_point(amount: i128, end: u64, now: u64, blk: u64) -> Point {
    if end > now && amount > 0 {
        let slope = lock_slope(amount);
        Point {
            bias: slope * (end - now) as i128,
            slope,
            ts: now,
            blk,
        }
    } else {
        Point {
            bias: 0,
            slope: 0,
            ts: now,
            blk,
        }
    }
}

// ============ Fee Splitting ============

/// Split `to_distribute` tokens received between `last_token_time` and `now`
/// over the week buckets they span, proportionally to elapsed time.
/// Walks at most `TOKEN_CHECKPOINT_WEEKS` buckets; each share is floored.
pub fn split_across_weeks(to_distribute: u128, last_token_time: u64, now: u64) -> Vec<(u64, u128)> {
    let mut shares = Vec::new();
    let mut t = last_token_time;
    let since_last = now.saturating_sub(t);
    let mut this_week = floor_week(t);

    for _ in 0..TOKEN_CHECKPOINT_WEEKS {
        let next_week = this_week + WEEK;
        if now < next_week {
            let share = if since_last == 0 && now == t {
                to_distribute
            } else {
                mul_div(to_distribute, (now - t) as u128, since_last as u128)
            };
            shares.push((this_week, share));
            break;
        }

        let share = if since_last == 0 && next_week == t {
            to_distribute
        } else {
            mul_div(to_distribute, (next_week - t) as u128, since_last as u128)
        };
        shares.push((this_week, share));

        t = next_week;
        this_week = next_week;
    }

    shares
}

/// Tokens owed to a holder of `ve` out of `supply` for one week.
/// A week without supply pays nothing.
pub fn fair_share(tokens_per_week: u128, ve: u128, supply: u128) -> u128 {
    if supply == 0 {
        return 0;
    }
    mul_div(tokens_per_week, ve, supply)
}

// ============ 256-bit Arithmetic Helpers ============

/// Multiply two u128 values, returning (hi, lo) as a 256-bit result.
/// Used for `tokens * ve` products that overflow u128 at 1e18 scale.
pub fn wide_mul(a: u128, b: u128) -> (u128, u128) {
    let mask: u128 = u64::MAX as u128;
    let a_lo = a & mask;
    let a_hi = a >> 64;
    let b_lo = b & mask;
    let b_hi = b >> 64;

    // Partial products (each u64*u64 fits in u128)
    let p0 = a_lo * b_lo;
    let p1 = a_lo * b_hi;
    let p2 = a_hi * b_lo;
    let p3 = a_hi * b_hi;

    // Accumulate middle bits with carry tracking
    let mid = (p0 >> 64) + (p1 & mask) + (p2 & mask);
    let lo = (p0 & mask) | ((mid & mask) << 64);
    let hi = p3 + (p1 >> 64) + (p2 >> 64) + (mid >> 64);

    (hi, lo)
}

/// Divide a 256-bit number (hi, lo) by a u128 divisor.
/// Caller guarantees the quotient fits in u128.
fn wide_div(hi: u128, lo: u128, d: u128) -> u128 {
    if hi == 0 {
        return lo / d;
    }

    // Binary search for the largest q with q * d <= (hi << 128) | lo
    let mut low: u128 = 0;
    let mut high: u128 = u128::MAX;

    while low < high {
        // Upper midpoint without overflow: ceil((high-low)/2)
        let diff = high - low;
        let mid = low + diff / 2 + diff % 2;
        let (mh, ml) = wide_mul(mid, d);
        if mh > hi || (mh == hi && ml > lo) {
            high = mid - 1;
        } else {
            low = mid;
        }
    }
    low
}

/// Compute floor(a * b / c) with a 256-bit intermediate.
/// Panics on a zero divisor; use `checked_mul_div` where `c` may be zero.
pub fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    assert!(c > 0, "mul_div: division by zero");
    match a.checked_mul(b) {
        Some(product) => product / c,
        None => {
            let (hi, lo) = wide_mul(a, b);
            wide_div(hi, lo, c)
        }
    }
}

pub fn checked_mul_div(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    let (hi, _) = wide_mul(a, b);
    if hi >= c {
        return Err(MathError::Overflow);
    }
    Ok(mul_div(a, b, c))
}

// ============ Tests ============
