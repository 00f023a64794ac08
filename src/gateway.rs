//! Uniform capability surface over trading venues.
//!
//! Every venue implements [`VenueGateway`]; the run loop talks only to this
//! trait through a lookup table built once at startup. All network-facing
//! operations return `Result` so a transport failure surfaces as an error at
//! the boundary instead of unwinding through business logic.

use crate::binance::BinanceGateway;
use crate::kucoin::KucoinGateway;
use crate::types::{Balance, Depth, OrderStatus, TradeSide, TradingPair, VenueId};
use anyhow::Result;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Shared handle to a venue gateway.
pub type GatewayHandle = Arc<dyn VenueGateway + Send + Sync>;

/// Lookup table from venue id to its gateway, built once at startup.
pub type GatewayTable = FxHashMap<VenueId, GatewayHandle>;

#[async_trait]
pub trait VenueGateway {
    fn venue(&self) -> VenueId;

    /// True when credentials required for trading are present. A venue that
    /// is not ready still serves public market data (observation-only).
    fn ready(&self) -> bool;

    /// Connectivity probe; false means the venue is unreachable.
    async fn test_connection(&self) -> bool;

    /// All tradeable pairs with precision metadata and last prices.
    async fn list_pairs(&self) -> Result<Vec<TradingPair>>;

    /// Top-of-book snapshot, `None` when the venue has no book for the pair.
    async fn get_depth(&self, symbol: &str) -> Result<Option<Depth>>;

    async fn get_available_balances(&self) -> Result<Vec<Balance>>;

    /// Place a limit order; returns the venue order id.
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
        price: f64,
    ) -> Result<String>;

    async fn check_order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatus>;

    /// (maker, taker) fee rates as fractions.
    fn fees(&self) -> (f64, f64);

    /// Assets this venue declares usable as reverse-chain bridge hops.
    fn bridge_assets(&self) -> Vec<String>;
}

/// Construct gateways for the configured venues.
pub fn build_gateway_table(venues: &[VenueId]) -> GatewayTable {
    let mut table: GatewayTable = FxHashMap::default();
    for &venue in venues {
        let handle: GatewayHandle = match venue {
            VenueId::Binance => Arc::new(BinanceGateway::from_env()),
            VenueId::Kucoin => Arc::new(KucoinGateway::from_env()),
        };
        table.insert(venue, handle);
    }
    table
}
