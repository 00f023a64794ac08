//! Environment-driven configuration.
//!
//! All knobs are read once at startup into a [`Settings`] snapshot; invalid
//! values fall back to defaults with a warning rather than aborting.
//!
//! Environment variables:
//! - `VENUES` - comma-separated venue names (default: binance)
//! - `FUNDING_ASSET` - working-capital currency (default: USDT)
//! - `FUNDING_AMOUNT` - notional per chain in funding units (default: 100)
//! - `PROFIT_TRIGGER_PERCENT` - fraction or whole-number percent (default: 0.01)
//! - `PLACE_TRADES` - enable live execution (default: false = dry run)
//! - `SIZE_FROM_BALANCE` - size leg 1 from live balance instead of FUNDING_AMOUNT
//! - `RUN_PAUSE_SECS` - pause between runs when nothing validated (default: 30)
//! - `ORDER_POLL_MS` - order-status poll interval (default: 1500)
//! - `EXTENSION_ROUNDS` - path-extension rounds per run (default: 10)
//! - `BINANCE_KEY` / `BINANCE_SECRET`, `KUCOIN_KEY` / `KUCOIN_SECRET` /
//!   `KUCOIN_PASSPHRASE` - venue credentials
//! - `<VENUE>_MAKER_COMMISSION` / `<VENUE>_TAKER_COMMISSION` - fee percents

use crate::filter::normalize_trigger;
use crate::types::VenueId;
use std::time::Duration;
use tracing::warn;

const DEFAULT_FUNDING_ASSET: &str = "USDT";
const DEFAULT_FUNDING_AMOUNT: f64 = 100.0;
const DEFAULT_PROFIT_TRIGGER: f64 = 0.01;
const DEFAULT_RUN_PAUSE_SECS: u64 = 30;
const DEFAULT_ORDER_POLL_MS: u64 = 1500;

/// Path-extension rounds per run. Bounds cycle depth and runtime; depth
/// beyond this is economically negligible.
pub const DEFAULT_EXTENSION_ROUNDS: u32 = 10;

/// Immutable settings snapshot consumed by the run loop.
#[derive(Debug, Clone)]
pub struct Settings {
    pub venues: Vec<VenueId>,
    pub funding_asset: String,
    pub funding_amount: f64,
    /// Normalized profit trigger as a fraction (0 = breakeven).
    pub profit_trigger: f64,
    pub place_trades: bool,
    pub size_from_balance: bool,
    pub run_pause: Duration,
    pub order_poll: Duration,
    pub extension_rounds: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        let venues = parse_venues(&env_or_default("VENUES", "binance"));
        let funding_asset = env_or_default("FUNDING_ASSET", DEFAULT_FUNDING_ASSET)
            .trim()
            .to_uppercase();

        let funding_amount = parse_positive_f64(
            "FUNDING_AMOUNT",
            std::env::var("FUNDING_AMOUNT").ok().as_deref(),
            DEFAULT_FUNDING_AMOUNT,
        );
        let profit_trigger = parse_trigger(
            std::env::var("PROFIT_TRIGGER_PERCENT").ok().as_deref(),
            DEFAULT_PROFIT_TRIGGER,
        );

        let run_pause_secs = parse_positive_u64(
            "RUN_PAUSE_SECS",
            std::env::var("RUN_PAUSE_SECS").ok().as_deref(),
            DEFAULT_RUN_PAUSE_SECS,
        );
        let order_poll_ms = parse_positive_u64(
            "ORDER_POLL_MS",
            std::env::var("ORDER_POLL_MS").ok().as_deref(),
            DEFAULT_ORDER_POLL_MS,
        );
        let extension_rounds = parse_positive_u64(
            "EXTENSION_ROUNDS",
            std::env::var("EXTENSION_ROUNDS").ok().as_deref(),
            DEFAULT_EXTENSION_ROUNDS as u64,
        ) as u32;

        Self {
            venues,
            funding_asset,
            funding_amount,
            profit_trigger,
            place_trades: env_flag("PLACE_TRADES", false),
            size_from_balance: env_flag("SIZE_FROM_BALANCE", false),
            run_pause: Duration::from_secs(run_pause_secs),
            order_poll: Duration::from_millis(order_poll_ms),
            extension_rounds,
        }
    }
}

/// Parse a comma-separated venue list, dropping unknown names with a warning.
pub fn parse_venues(raw: &str) -> Vec<VenueId> {
    let mut venues = Vec::new();
    for name in raw.split(',') {
        if name.trim().is_empty() {
            continue;
        }
        match VenueId::parse(name) {
            Some(v) if !venues.contains(&v) => venues.push(v),
            Some(_) => {}
            None => warn!("Unknown venue '{}' in VENUES, skipping", name.trim()),
        }
    }
    venues
}

/// Parse and normalize the profit trigger into a fraction.
pub fn parse_trigger(raw: Option<&str>, default: f64) -> f64 {
    match raw {
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => normalize_trigger(v),
            _ => {
                warn!(
                    "Invalid PROFIT_TRIGGER_PERCENT='{}', using default {}",
                    s, default
                );
                default
            }
        },
        None => default,
    }
}

fn parse_positive_f64(name: &str, raw: Option<&str>, default: f64) -> f64 {
    match raw {
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => v,
            _ => {
                warn!("Invalid {}='{}', using default {}", name, s, default);
                default
            }
        },
        None => default,
    }
}

fn parse_positive_u64(name: &str, raw: Option<&str>, default: u64) -> u64 {
    match raw {
        Some(s) => match s.trim().parse::<u64>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!("Invalid {}='{}', using default {}", name, s, default);
                default
            }
        },
        None => default,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

/// Maker/taker commission for a venue, read from `<VENUE>_MAKER_COMMISSION`
/// and `<VENUE>_TAKER_COMMISSION` (whole-number percents) and returned as
/// fractions.
pub fn venue_commissions(venue: VenueId) -> (f64, f64) {
    let prefix = venue.as_str().to_uppercase();
    let read = |suffix: &str| -> f64 {
        std::env::var(format!("{}_{}_COMMISSION", prefix, suffix))
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v / 100.0)
            .unwrap_or(0.0)
    };
    (read("MAKER"), read("TAKER"))
}
