//! Precision-sensitive arithmetic helpers.
//!
//! Venues quote values to different scales: chains hopping through BTC- or
//! ETH-quoted pairs are tracked to 8 decimals, everything else (the funding
//! currency scale) to 4. Order quantities are always floored, never rounded
//! up, so an order can never overspend the available balance.

/// Round half-away-from-zero to `dp` decimal places.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}

/// Floor to `dp` decimal places.
pub fn floor_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).floor() / factor
}

/// Decimal places used when tracking a value quoted in `quote_asset`.
///
/// Full symbol equality on the quote asset; BTC/ETH-quoted values carry 8
/// decimals, the funding-currency scale default is 4.
pub fn value_scale(quote_asset: &str) -> u32 {
    if quote_asset == "BTC" || quote_asset == "ETH" {
        8
    } else {
        4
    }
}

/// Round a converted chain value to the scale of the pair's quote asset.
pub fn round_value(value: f64, quote_asset: &str) -> f64 {
    round_dp(value, value_scale(quote_asset))
}
