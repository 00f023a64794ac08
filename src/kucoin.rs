//! KuCoin REST gateway.
//!
//! Responses arrive wrapped in a `{ code, data }` envelope. Private calls
//! carry KC-API headers with an HMAC-SHA256 signature over
//! `timestamp + method + endpoint + body`.

use crate::config::venue_commissions;
use crate::gateway::VenueGateway;
use crate::retry::{retry_async, RetryPolicy};
use crate::types::{Balance, Depth, OrderStatus, TradeSide, TradingPair, VenueId};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.kucoin.com";
const DEPTH_LEVELS: u32 = 20;

const REVERSE_ASSETS: &[&str] = &["BTC", "ETH", "TRX", "XRP"];

pub struct KucoinGateway {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    maker_fee: f64,
    taker_fee: f64,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    code: String,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_currency: String,
    quote_currency: String,
    enable_trading: bool,
    base_increment: String,
    quote_increment: String,
}

#[derive(Debug, Deserialize)]
struct AllTickers {
    ticker: Vec<TickerItem>,
}

#[derive(Debug, Deserialize)]
struct TickerItem {
    symbol: String,
    last: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderBook {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct AccountItem {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    is_active: Option<bool>,
    cancel_exist: Option<bool>,
}

fn decimals_of(increment: &str) -> u32 {
    match increment.split('.').nth(1) {
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

impl KucoinGateway {
    pub fn from_env() -> Self {
        let (maker_fee, taker_fee) = venue_commissions(VenueId::Kucoin);
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: std::env::var("KUCOIN_URL").unwrap_or_else(|_| BASE_URL.to_string()),
            api_key: std::env::var("KUCOIN_KEY").unwrap_or_default(),
            api_secret: std::env::var("KUCOIN_SECRET").unwrap_or_default(),
            api_passphrase: std::env::var("KUCOIN_PASSPHRASE").unwrap_or_default(),
            maker_fee,
            taker_fee,
            retry: RetryPolicy::from_env(),
        }
    }

    /// Signature over `timestamp + method + endpoint + body`, hex-encoded.
    fn sign(&self, timestamp: u64, method: &str, endpoint: &str, body: &str) -> Result<String> {
        let payload = format!("{}{}{}{}", timestamp, method, endpoint, body);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow!("HMAC key error: {}", e))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", endpoint))?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_json_signed<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let timestamp = now_ms();
        let signature = self.sign(timestamp, "GET", endpoint, "")?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("KC-API-KEY", &self.api_key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", timestamp.to_string())
            .header("KC-API-PASSPHRASE", &self.api_passphrase)
            .send()
            .await
            .with_context(|| format!("GET {}", endpoint))?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post_json_signed<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let timestamp = now_ms();
        let body_str = body.to_string();
        let signature = self.sign(timestamp, "POST", endpoint, &body_str)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("KC-API-KEY", &self.api_key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", timestamp.to_string())
            .header("KC-API-PASSPHRASE", &self.api_passphrase)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", endpoint))?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VenueGateway for KucoinGateway {
    fn venue(&self) -> VenueId {
        VenueId::Kucoin
    }

    fn ready(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    async fn test_connection(&self) -> bool {
        self.get_json::<serde_json::Value>("/api/v1/status").await.is_ok()
    }

    async fn list_pairs(&self) -> Result<Vec<TradingPair>> {
        let symbols: Envelope<Vec<SymbolInfo>> =
            retry_async(&self.retry, "kucoin_symbols", || {
                self.get_json("/api/v1/symbols")
            })
            .await?;
        let tickers: Envelope<AllTickers> =
            retry_async(&self.retry, "kucoin_all_tickers", || {
                self.get_json("/api/v1/market/allTickers")
            })
            .await?;

        let prices: rustc_hash::FxHashMap<&str, f64> = tickers
            .data
            .ticker
            .iter()
            .filter_map(|t| {
                let last = t.last.as_deref()?.parse::<f64>().ok()?;
                Some((t.symbol.as_str(), last))
            })
            .collect();

        let mut pairs = Vec::with_capacity(symbols.data.len());
        for symbol in symbols.data {
            if !symbol.enable_trading {
                continue;
            }
            let price = match prices.get(symbol.symbol.as_str()) {
                Some(&p) if p > 0.0 => p,
                _ => continue,
            };
            let step_size = decimals_of(&symbol.base_increment);
            pairs.push(TradingPair {
                venue: VenueId::Kucoin,
                symbol: symbol.symbol,
                base_asset: symbol.base_currency,
                quote_asset: symbol.quote_currency,
                price,
                base_precision: step_size,
                quote_precision: decimals_of(&symbol.quote_increment),
                step_size,
            });
        }
        Ok(pairs)
    }

    async fn get_depth(&self, symbol: &str) -> Result<Option<Depth>> {
        let endpoint = format!(
            "/api/v1/market/orderbook/level2_{}?symbol={}",
            DEPTH_LEVELS, symbol
        );
        let book: Envelope<OrderBook> =
            retry_async(&self.retry, "kucoin_depth", || self.get_json(&endpoint)).await?;

        let bid = book.data.bids.first().and_then(|(p, _)| p.parse::<f64>().ok());
        let ask = book.data.asks.first().and_then(|(p, _)| p.parse::<f64>().ok());
        Ok(match (bid, ask) {
            (Some(bid), Some(ask)) => Some(Depth {
                venue: VenueId::Kucoin,
                bid,
                ask,
            }),
            _ => {
                warn!("kucoin book for {} is one-sided, skipping", symbol);
                None
            }
        })
    }

    async fn get_available_balances(&self) -> Result<Vec<Balance>> {
        let accounts: Envelope<Vec<AccountItem>> =
            retry_async(&self.retry, "kucoin_accounts", || {
                self.get_json_signed("/api/v1/accounts?type=trade")
            })
            .await?;
        Ok(accounts
            .data
            .into_iter()
            .filter_map(|a| {
                let quantity = a.available.parse::<f64>().ok()?;
                (quantity > 0.0).then(|| Balance {
                    asset: a.currency,
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
        let body = json!({
            "clientOid": Uuid::new_v4().to_string(),
            "side": side.as_str(),
            "symbol": symbol,
            "type": "limit",
            "price": price.to_string(),
            "size": quantity.to_string(),
        });
        // No retry: a timed-out POST may still have placed the order.
        let ack: Envelope<OrderAck> = self.post_json_signed("/api/v1/orders", &body).await?;
        Ok(ack.data.order_id)
    }

    async fn check_order_status(&self, _symbol: &str, order_id: &str) -> Result<OrderStatus> {
        let endpoint = format!("/api/v1/orders/{}", order_id);
        let detail: Envelope<OrderDetail> =
            retry_async(&self.retry, "kucoin_order_status", || {
                self.get_json_signed(&endpoint)
            })
            .await?;
        Ok(order_status(&detail.data))
    }

    fn fees(&self) -> (f64, f64) {
        (self.maker_fee, self.taker_fee)
    }

    fn bridge_assets(&self) -> Vec<String> {
        REVERSE_ASSETS.iter().map(|a| a.to_string()).collect()
    }
}

/// Cancellation wins over activity: a canceled order may briefly still show
/// as active while the venue settles its books.
fn order_status(detail: &OrderDetail) -> OrderStatus {
    match (detail.cancel_exist, detail.is_active) {
        (Some(true), _) => OrderStatus::Canceled,
        (_, Some(true)) => OrderStatus::Open,
        (Some(false), Some(false)) => OrderStatus::Filled,
        _ => OrderStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimals_of_increment() {
        assert_eq!(decimals_of("0.0001"), 4);
        assert_eq!(decimals_of("1"), 0);
        assert_eq!(decimals_of("0.01000"), 2);
    }

    #[test]
    fn test_order_status_mapping() {
        let detail = |cancel, active| OrderDetail {
            is_active: active,
            cancel_exist: cancel,
        };
        assert_eq!(order_status(&detail(Some(true), Some(true))), OrderStatus::Canceled);
        assert_eq!(order_status(&detail(Some(false), Some(true))), OrderStatus::Open);
        assert_eq!(order_status(&detail(Some(false), Some(false))), OrderStatus::Filled);
        assert_eq!(order_status(&detail(None, None)), OrderStatus::Unknown);
    }

    #[test]
    fn test_signature_covers_method_and_body() {
        let gw = KucoinGateway {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_passphrase: "pass".to_string(),
            maker_fee: 0.001,
            taker_fee: 0.001,
            retry: RetryPolicy::default(),
        };
        let a = gw.sign(1, "GET", "/api/v1/accounts", "").unwrap();
        let b = gw.sign(1, "POST", "/api/v1/accounts", "").unwrap();
        let c = gw.sign(1, "POST", "/api/v1/accounts", "{}").unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a.len(), 64);
    }
}
