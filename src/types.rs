//! Core data model: venues, trading pairs, depth snapshots, and the
//! path/chain aggregates that flow through a single run.
//!
//! All run-scoped accumulation lives in [`RunContext`], which is passed
//! explicitly through each stage (builder -> validator -> selector ->
//! executor) so runs stay isolated and trivially testable.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier for a supported trading venue.
///
/// Venue dispatch happens through a gateway lookup table built at startup,
/// never through string comparison inside business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueId {
    Binance,
    Kucoin,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::Binance => "binance",
            VenueId::Kucoin => "kucoin",
        }
    }

    /// Parse a venue name from configuration (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "binance" => Some(VenueId::Binance),
            "kucoin" => Some(VenueId::Kucoin),
            _ => None,
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side for one trade leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Lowercase form used by venue REST APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// Terminal and non-terminal states reported for a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    /// Venue returned a status string we do not recognize. Treated like
    /// `Open` by the poll loop so an odd transient label never aborts a run.
    Unknown,
}

/// One tradeable instrument on one venue, refreshed once per run.
///
/// Precision fields are decimal places: `step_size` bounds order quantity
/// when buying, `quote_precision` when selling.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingPair {
    pub venue: VenueId,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Last trade price from the venue ticker. Discovery only; validation
    /// always re-prices from bid/ask.
    pub price: f64,
    pub base_precision: u32,
    pub quote_precision: u32,
    pub step_size: u32,
}

/// Top-of-book snapshot for one pair, cached per run keyed by (venue, symbol).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Depth {
    pub venue: VenueId,
    pub bid: f64,
    pub ask: f64,
}

/// Available (free) balance for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub asset: String,
    pub quantity: f64,
}

/// One hop in a candidate arbitrage chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PathLeg {
    /// Shared by all legs of one snapshotted profit candidate. `None` while
    /// the chain is still extending.
    pub group_id: Option<Uuid>,
    pub venue: VenueId,
    /// The previous leg's pair symbol; `None` for the seed leg.
    pub previous_symbol: Option<String>,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub side: TradeSide,
    /// Theoretical last-trade price used at discovery.
    pub price: f64,
    /// Theoretical value held after this hop.
    pub value: f64,
    /// Unit (asset) held after this hop.
    pub unit: String,
    /// Book-validated value after this hop; set by the validator.
    pub book_value: f64,
    /// Live best price observed during book validation.
    pub best_price: f64,
    /// True when the live best price still matches `price`.
    pub feasible: bool,
    /// True when this leg closes the chain back to the funding currency.
    pub terminal: bool,
    /// Realized quantity once the leg executes.
    pub trade_quantity: f64,
    pub fee: f64,
    pub fee_unit: String,
}

impl PathLeg {
    /// Build a discovery-time leg; validator/executor fields start zeroed.
    pub fn new(
        pair: &TradingPair,
        previous_symbol: Option<String>,
        side: TradeSide,
        value: f64,
        unit: String,
        terminal: bool,
    ) -> Self {
        Self {
            group_id: None,
            venue: pair.venue,
            previous_symbol,
            symbol: pair.symbol.clone(),
            base_asset: pair.base_asset.clone(),
            quote_asset: pair.quote_asset.clone(),
            side,
            price: pair.price,
            value,
            unit,
            book_value: 0.0,
            best_price: 0.0,
            feasible: false,
            terminal,
            trade_quantity: 0.0,
            fee: 0.0,
            fee_unit: String::new(),
        }
    }
}

/// Ordered sequence of legs forming one full candidate trade.
///
/// The chain is the owning aggregate: the validator and executor operate on
/// it directly, so no id-based scan lookups are ever needed.
#[derive(Debug, Clone, PartialEq)]
pub struct PathChain {
    pub legs: Vec<PathLeg>,
}

impl PathChain {
    pub fn seed(leg: PathLeg) -> Self {
        Self { legs: vec![leg] }
    }

    /// Copy-on-extend: returns a new chain, leaving `self` untouched so
    /// previously published generations stay immutable.
    pub fn extended(&self, leg: PathLeg) -> Self {
        let mut legs = self.legs.clone();
        legs.push(leg);
        Self { legs }
    }

    pub fn venue(&self) -> VenueId {
        self.legs[0].venue
    }

    /// Asset currently held after the last leg.
    pub fn held_unit(&self) -> &str {
        &self.legs[self.legs.len() - 1].unit
    }

    /// Theoretical value after the last leg.
    pub fn value(&self) -> f64 {
        self.legs[self.legs.len() - 1].value
    }

    /// Book-validated value after the final leg.
    pub fn book_value(&self) -> f64 {
        self.legs[self.legs.len() - 1].book_value
    }

    pub fn is_terminal(&self) -> bool {
        self.legs[self.legs.len() - 1].terminal
    }

    pub fn contains_symbol(&self, symbol: &str) -> bool {
        self.legs.iter().any(|l| l.symbol == symbol)
    }

    /// Canonical key for pool deduplication: the ordered pair sequence.
    pub fn route_key(&self) -> String {
        let symbols: Vec<&str> = self.legs.iter().map(|l| l.symbol.as_str()).collect();
        symbols.join("|")
    }

    /// Human-readable route for logging, e.g. `BTCUSDT>ETHBTC>ETHUSDT`.
    pub fn route(&self) -> String {
        let symbols: Vec<&str> = self.legs.iter().map(|l| l.symbol.as_str()).collect();
        symbols.join(">")
    }

    /// Snapshot this chain as a profit candidate under a fresh grouping id.
    ///
    /// Ids are never reused: two candidates sharing a prefix get distinct
    /// ids so later per-chain bookkeeping cannot cross wires.
    pub fn with_group_id(&self, id: Uuid) -> Self {
        let mut chain = self.clone();
        for leg in &mut chain.legs {
            leg.group_id = Some(id);
        }
        chain
    }
}

/// Per-venue run-scoped state, built at startup from configuration and
/// gateway capability probes.
#[derive(Debug, Clone)]
pub struct VenueState {
    pub venue: VenueId,
    /// False demotes the venue to observation-only: discovery continues,
    /// execution is disabled.
    pub trading_enabled: bool,
    pub maker_fee: f64,
    pub taker_fee: f64,
    /// Assets this venue declares usable as reverse-chain first hops.
    pub bridge_assets: Vec<String>,
    /// Best validated final value seen this run; reset every run.
    pub best_value: f64,
}

impl VenueState {
    pub fn new(venue: VenueId, trading_enabled: bool) -> Self {
        Self {
            venue,
            trading_enabled,
            maker_fee: 0.0,
            taker_fee: 0.0,
            bridge_assets: Vec::new(),
            best_value: 0.0,
        }
    }
}

/// Key for the per-run depth cache.
pub type DepthKey = (VenueId, String);

/// All mutable state accumulated during one run.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Full pair universe across enabled venues, immutable within the run.
    pub pairs: Vec<TradingPair>,
    /// Terminal chains that cleared the theoretical profit trigger.
    pub candidates: Vec<PathChain>,
    /// Depth snapshots fetched for validation; fully populated before any
    /// chain is validated.
    pub depths: FxHashMap<DepthKey, Depth>,
    /// Candidates that survived book validation.
    pub validated: Vec<PathChain>,
    /// At most one best validated chain per venue.
    pub best: FxHashMap<VenueId, PathChain>,
}

impl RunContext {
    pub fn new(pairs: Vec<TradingPair>) -> Self {
        Self {
            pairs,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(symbol: &str, base: &str, quote: &str, price: f64) -> TradingPair {
        TradingPair {
            venue: VenueId::Binance,
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            price,
            base_precision: 8,
            quote_precision: 8,
            step_size: 5,
        }
    }

    #[test]
    fn test_venue_parse() {
        assert_eq!(VenueId::parse("binance"), Some(VenueId::Binance));
        assert_eq!(VenueId::parse(" KUCOIN "), Some(VenueId::Kucoin));
        assert_eq!(VenueId::parse("ftx"), None);
    }

    #[test]
    fn test_copy_on_extend_leaves_parent_untouched() {
        let btc = pair("BTCUSDT", "BTC", "USDT", 50_000.0);
        let eth = pair("ETHBTC", "ETH", "BTC", 0.05);

        let chain = PathChain::seed(PathLeg::new(
            &btc,
            None,
            TradeSide::Buy,
            0.002,
            "BTC".to_string(),
            false,
        ));
        let extended = chain.extended(PathLeg::new(
            &eth,
            Some("BTCUSDT".to_string()),
            TradeSide::Buy,
            0.04,
            "ETH".to_string(),
            false,
        ));

        assert_eq!(chain.legs.len(), 1);
        assert_eq!(extended.legs.len(), 2);
        assert_eq!(extended.held_unit(), "ETH");
        assert_eq!(chain.held_unit(), "BTC");
    }

    #[test]
    fn test_route_key_and_contains() {
        let btc = pair("BTCUSDT", "BTC", "USDT", 50_000.0);
        let eth = pair("ETHBTC", "ETH", "BTC", 0.05);
        let chain = PathChain::seed(PathLeg::new(
            &btc,
            None,
            TradeSide::Buy,
            0.002,
            "BTC".to_string(),
            false,
        ))
        .extended(PathLeg::new(
            &eth,
            Some("BTCUSDT".to_string()),
            TradeSide::Buy,
            0.04,
            "ETH".to_string(),
            false,
        ));

        assert_eq!(chain.route_key(), "BTCUSDT|ETHBTC");
        assert!(chain.contains_symbol("ETHBTC"));
        assert!(!chain.contains_symbol("ETHUSDT"));
    }

    #[test]
    fn test_group_id_assignment_covers_all_legs() {
        let btc = pair("BTCUSDT", "BTC", "USDT", 50_000.0);
        let chain = PathChain::seed(PathLeg::new(
            &btc,
            None,
            TradeSide::Buy,
            0.002,
            "BTC".to_string(),
            false,
        ));

        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let snap_a = chain.with_group_id(id_a);
        let snap_b = chain.with_group_id(id_b);

        assert!(snap_a.legs.iter().all(|l| l.group_id == Some(id_a)));
        assert!(snap_b.legs.iter().all(|l| l.group_id == Some(id_b)));
        // The original stays unassigned.
        assert!(chain.legs.iter().all(|l| l.group_id.is_none()));
    }
}
