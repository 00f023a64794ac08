//! Binance REST gateway.
//!
//! Public market data is unauthenticated; account and order endpoints are
//! signed by appending an HMAC-SHA256 hex signature over the query string,
//! with a millisecond timestamp and a fixed recvWindow.

use crate::config::venue_commissions;
use crate::gateway::VenueGateway;
use crate::retry::{retry_async, RetryPolicy};
use crate::types::{Balance, Depth, OrderStatus, TradeSide, TradingPair, VenueId};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5000;
const DEPTH_LIMIT: u32 = 5;

/// Assets Binance chains route through as reverse-pool first hops.
const REVERSE_ASSETS: &[&str] = &["BTC", "ETH", "BNB"];

pub struct BinanceGateway {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    maker_fee: f64,
    taker_fee: f64,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    base_asset_precision: u32,
    quote_asset_precision: u32,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct OrderQueryResponse {
    status: String,
}

/// Decimal places implied by a filter value like "0.00100000".
fn decimals_of(step: &str) -> u32 {
    match step.split('.').nth(1) {
        Some(frac) => frac.trim_end_matches('0').len() as u32,
        None => 0,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl BinanceGateway {
    pub fn from_env() -> Self {
        let (maker_fee, taker_fee) = venue_commissions(VenueId::Binance);
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: std::env::var("BINANCE_URL").unwrap_or_else(|_| BASE_URL.to_string()),
            api_key: std::env::var("BINANCE_KEY").unwrap_or_default(),
            api_secret: std::env::var("BINANCE_SECRET").unwrap_or_default(),
            maker_fee,
            taker_fee,
            retry: RetryPolicy::from_env(),
        }
    }

    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow!("HMAC key error: {}", e))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Append timestamp, recvWindow and signature to a query string.
    fn signed_query(&self, query: &str) -> Result<String> {
        let stamped = if query.is_empty() {
            format!("timestamp={}&recvWindow={}", now_ms(), RECV_WINDOW_MS)
        } else {
            format!("{}&timestamp={}&recvWindow={}", query, now_ms(), RECV_WINDOW_MS)
        };
        let signature = self.sign(&stamped)?;
        Ok(format!("{}&signature={}", stamped, signature))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", path_and_query))?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_json_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T> {
        let full_query = self.signed_query(query)?;
        let url = format!("{}{}?{}", self.base_url, path, full_query);
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .with_context(|| format!("GET {}", path))?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post_json_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T> {
        let full_query = self.signed_query(query)?;
        let url = format!("{}{}?{}", self.base_url, path, full_query);
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .with_context(|| format!("POST {}", path))?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VenueGateway for BinanceGateway {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    fn ready(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    async fn test_connection(&self) -> bool {
        self.get_json::<serde_json::Value>("/api/v3/ping").await.is_ok()
    }

    async fn list_pairs(&self) -> Result<Vec<TradingPair>> {
        let info: ExchangeInfo = retry_async(&self.retry, "binance_exchange_info", || {
            self.get_json("/api/v3/exchangeInfo")
        })
        .await?;
        let tickers: Vec<TickerPrice> = retry_async(&self.retry, "binance_ticker_price", || {
            self.get_json("/api/v3/ticker/price")
        })
        .await?;

        let prices: rustc_hash::FxHashMap<&str, f64> = tickers
            .iter()
            .filter_map(|t| t.price.parse::<f64>().ok().map(|p| (t.symbol.as_str(), p)))
            .collect();

        let mut pairs = Vec::with_capacity(info.symbols.len());
        for symbol in info.symbols {
            if symbol.status != "TRADING" {
                continue;
            }
            let price = match prices.get(symbol.symbol.as_str()) {
                Some(&p) if p > 0.0 => p,
                _ => continue,
            };
            let step_size = symbol
                .filters
                .iter()
                .find(|f| f.filter_type == "LOT_SIZE")
                .and_then(|f| f.step_size.as_deref())
                .map(decimals_of)
                .unwrap_or(symbol.base_asset_precision);
            pairs.push(TradingPair {
                venue: VenueId::Binance,
                symbol: symbol.symbol,
                base_asset: symbol.base_asset,
                quote_asset: symbol.quote_asset,
                price,
                base_precision: symbol.base_asset_precision,
                quote_precision: symbol.quote_asset_precision,
                step_size,
            });
        }
        Ok(pairs)
    }

    async fn get_depth(&self, symbol: &str) -> Result<Option<Depth>> {
        let path = format!("/api/v3/depth?symbol={}&limit={}", symbol, DEPTH_LIMIT);
        let book: DepthResponse =
            retry_async(&self.retry, "binance_depth", || self.get_json(&path)).await?;

        let bid = book.bids.first().and_then(|(p, _)| p.parse::<f64>().ok());
        let ask = book.asks.first().and_then(|(p, _)| p.parse::<f64>().ok());
        Ok(match (bid, ask) {
            (Some(bid), Some(ask)) => Some(Depth {
                venue: VenueId::Binance,
                bid,
                ask,
            }),
            _ => {
                warn!("binance book for {} is one-sided, skipping", symbol);
                None
            }
        })
    }

    async fn get_available_balances(&self) -> Result<Vec<Balance>> {
        let account: AccountResponse = retry_async(&self.retry, "binance_account", || {
            self.get_json_signed("/api/v3/account", "")
        })
        .await?;
        Ok(account
            .balances
            .into_iter()
            .filter_map(|b| {
                let quantity = b.free.parse::<f64>().ok()?;
                (quantity > 0.0).then(|| Balance {
                    asset: b.asset,
                    quantity,
                })
            })
            .collect())
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
        price: f64,
    ) -> Result<String> {
        let query = format!(
            "symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={}&price={}",
            symbol,
            side.as_str().to_uppercase(),
            quantity,
            price
        );
        // No retry: a timed-out POST may still have placed the order.
        let order: OrderResponse = self.post_json_signed("/api/v3/order", &query).await?;
        Ok(order.order_id.to_string())
    }

    async fn check_order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatus> {
        let query = format!("symbol={}&orderId={}", symbol, order_id);
        let order: OrderQueryResponse = retry_async(&self.retry, "binance_order_status", || {
            self.get_json_signed("/api/v3/order", &query)
        })
        .await?;
        Ok(match order.status.as_str() {
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" | "REJECTED" => OrderStatus::Canceled,
            "NEW" | "PARTIALLY_FILLED" => OrderStatus::Open,
            _ => OrderStatus::Unknown,
        })
    }

    fn fees(&self) -> (f64, f64) {
        (self.maker_fee, self.taker_fee)
    }

    fn bridge_assets(&self) -> Vec<String> {
        REVERSE_ASSETS.iter().map(|a| a.to_string()).collect()
    }
}
