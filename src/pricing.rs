//! Dutch-auction price curves.
//!
//! Curve math runs in ETH (f64) and is display-grade only; settlement amounts
//! derive from committed bids, never from the curve. Reserve prices stay
//! integer wei at rest.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::Serialize;

use crate::models::{Auction, DecayMode};

/// Price drops by this factor over the full window in exponential mode.
pub const DEFAULT_DECAY_FACTOR: f64 = 10.0;
/// Logistic steepness for sigmoid mode.
pub const DEFAULT_STEEPNESS: f64 = 10.0;

const WEI_PER_ETH: f64 = 1e18;

/// Current display price and elapsed percentage for an auction window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutchQuote {
    pub price_eth: String,
    pub pct: u32,
}

/// Linear decay from reserve to 0 over the window.
pub fn linear_price(reserve_eth: f64, elapsed_ms: f64, duration_ms: f64) -> f64 {
    if elapsed_ms <= 0.0 {
        return reserve_eth;
    }
    if elapsed_ms >= duration_ms {
        return 0.0;
    }
    reserve_eth * (1.0 - elapsed_ms / duration_ms)
}

/// Asymptotic exponential form without the end clamp: `reserve * e^{-k t}`
/// with `k = ln(factor) / duration`, so the curve reaches `reserve / factor`
/// at the end of the window rather than 0.
pub fn exponential_curve(reserve_eth: f64, elapsed_ms: f64, duration_ms: f64, factor: f64) -> f64 {
    let k = factor.ln() / duration_ms;
    reserve_eth * (-k * elapsed_ms).exp()
}

/// Exponential decay, clamped to exactly 0 once the window has elapsed.
pub fn exponential_price(reserve_eth: f64, elapsed_ms: f64, duration_ms: f64, factor: f64) -> f64 {
    if elapsed_ms <= 0.0 {
        return reserve_eth;
    }
    if elapsed_ms >= duration_ms {
        return 0.0;
    }
    exponential_curve(reserve_eth, elapsed_ms, duration_ms, factor)
}

/// Logistic decay: `reserve / (1 + e^{steepness (x - 0.5)})` over `x in (0,1)`.
/// Exactly `reserve / 2` at the midpoint, steeper mid-curve drop than linear.
pub fn sigmoid_price(reserve_eth: f64, elapsed_ms: f64, duration_ms: f64, steepness: f64) -> f64 {
    if elapsed_ms <= 0.0 {
        return reserve_eth;
    }
    if elapsed_ms >= duration_ms {
        return 0.0;
    }
    let x = elapsed_ms / duration_ms;
    reserve_eth / (1.0 + (steepness * (x - 0.5)).exp())
}

/// Price at an instant, in ETH. Full reserve at or before the window start,
/// exactly 0 at or after the end, curve-shaped in between.
pub fn price_at(reserve_eth: f64, start_ms: i64, end_ms: i64, now_ms: i64, mode: DecayMode) -> f64 {
    if now_ms <= start_ms {
        return reserve_eth;
    }
    if now_ms >= end_ms {
        return 0.0;
    }
    let duration = (end_ms - start_ms) as f64;
    let elapsed = (now_ms - start_ms) as f64;
    match mode {
        DecayMode::Linear => linear_price(reserve_eth, elapsed, duration),
        DecayMode::Exponential => {
            exponential_price(reserve_eth, elapsed, duration, DEFAULT_DECAY_FACTOR)
        }
        DecayMode::Sigmoid => sigmoid_price(reserve_eth, elapsed, duration, DEFAULT_STEEPNESS),
    }
}

/// Elapsed window percentage, rounded, clamped to [0, 100].
pub fn progress_pct(start_ms: i64, end_ms: i64, now_ms: i64) -> u32 {
    if now_ms <= start_ms {
        return 0;
    }
    if now_ms >= end_ms {
        return 100;
    }
    let pct = (now_ms - start_ms) as f64 / (end_ms - start_ms) as f64 * 100.0;
    pct.round() as u32
}

/// Display quote for a reserve/window pair. An auction without a scheduled
/// window quotes the full reserve at 0% elapsed.
pub fn quote(
    reserve_wei: &BigUint,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    mode: DecayMode,
) -> DutchQuote {
    let reserve_eth = wei_to_eth(reserve_wei);
    let (Some(start), Some(end)) = (starts_at, ends_at) else {
        return DutchQuote {
            price_eth: format_eth(reserve_eth),
            pct: 0,
        };
    };
    let (start_ms, end_ms, now_ms) = (
        start.timestamp_millis(),
        end.timestamp_millis(),
        now.timestamp_millis(),
    );
    DutchQuote {
        price_eth: format_eth(price_at(reserve_eth, start_ms, end_ms, now_ms, mode)),
        pct: progress_pct(start_ms, end_ms, now_ms),
    }
}

/// Quote for an auction record at `now`; unset decay mode falls back to linear.
pub fn auction_quote(auction: &Auction, now: DateTime<Utc>) -> DutchQuote {
    quote(
        &auction.reserve_price_wei,
        auction.starts_at,
        auction.ends_at,
        now,
        auction.decay_mode.unwrap_or(DecayMode::Linear),
    )
}

/// Wei to ETH as f64, for display and scoring only.
pub fn wei_to_eth(wei: &BigUint) -> f64 {
    wei.to_string().parse::<f64>().unwrap_or(0.0) / WEI_PER_ETH
}

/// Four-decimal display formatting, matching the UI.
pub fn format_eth(v: f64) -> String {
    format!("{v:.4}")
}

/// Parse a decimal ETH amount into integer wei without going through floats.
/// Rejects negatives, non-digits, and more than 18 fractional digits.
pub fn parse_eth(s: &str) -> anyhow::Result<BigUint> {
    let s = s.trim();
    anyhow::ensure!(!s.is_empty(), "empty amount");
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    anyhow::ensure!(
        !int_part.is_empty() || !frac_part.is_empty(),
        "invalid amount: {s}"
    );
    anyhow::ensure!(
        int_part.chars().all(|c| c.is_ascii_digit())
            && frac_part.chars().all(|c| c.is_ascii_digit()),
        "invalid amount: {s}"
    );
    anyhow::ensure!(
        frac_part.len() <= 18,
        "too many decimal places (max 18): {s}"
    );

    let mut frac = frac_part.to_string();
    while frac.len() < 18 {
        frac.push('0');
    }
    let int: BigUint = if int_part.is_empty() {
        BigUint::default()
    } else {
        int_part.parse()?
    };
    Ok(int * BigUint::from(10u64).pow(18) + frac.parse::<BigUint>()?)
}
