//! Trade execution: turns a validated chain into a sequence of limit orders.
//!
//! Legs run strictly in order; each one must reach a terminal order status
//! before the next may start, since every hop trades the asset the previous
//! hop acquired. A canceled order strands inventory mid-chain, so it is
//! surfaced as a fatal outcome for the whole bot rather than retried.

use crate::gateway::GatewayHandle;
use crate::math::floor_dp;
use crate::types::{OrderStatus, PathChain, PathLeg, TradeSide, VenueId, VenueState};
use anyhow::Result;
use rustc_hash::FxHashMap;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Terminal outcome of one chain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every leg filled; funding currency is back in the account.
    Completed,
    /// A leg could not be sized above zero. The chain is abandoned but the
    /// bot keeps running.
    InsufficientBalance,
    /// The venue canceled an order mid-chain. Inventory is stranded; the
    /// caller must halt the bot for operator intervention.
    Canceled,
}

/// Gateway failure while executing a chain, tagged with the venue whose
/// gateway failed.
#[derive(Debug)]
pub struct ExecutionError {
    pub venue: VenueId,
    pub source: anyhow::Error,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution failed on {}: {}", self.venue, self.source)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Execution knobs resolved once from configuration.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    /// False simulates fills without touching the venue order endpoint.
    pub place_trades: bool,
    /// True sizes the first leg from the live available balance; false seeds
    /// it from the configured funding amount. Later legs always spend the live
    /// balance when trading live.
    pub size_from_balance: bool,
    pub order_poll: Duration,
    pub funding_amount: f64,
}

/// Quantity for one leg, floored so the venue never rejects for precision.
///
/// Buying spends the quote asset: quantity is base bought, bounded by the
/// pair's lot step decimals. Selling spends the base asset directly, bounded
/// by the quote precision.
fn leg_quantity(leg: &PathLeg, available: f64, step_size: u32, quote_precision: u32) -> f64 {
    match leg.side {
        TradeSide::Buy => {
            if leg.best_price <= 0.0 {
                return 0.0;
            }
            floor_dp(available / leg.best_price, step_size)
        }
        TradeSide::Sell => floor_dp(available, quote_precision),
    }
}

/// Taker fee for one fill, denominated in the asset the leg receives: the
/// base bought on a buy, the quote proceeds on a sell.
fn leg_fee(leg: &PathLeg, quantity: f64, taker_fee: f64) -> (f64, String) {
    match leg.side {
        TradeSide::Buy => (quantity * taker_fee, leg.base_asset.clone()),
        TradeSide::Sell => (
            quantity * leg.best_price * taker_fee,
            leg.quote_asset.clone(),
        ),
    }
}

/// Amount of the leg's input asset we may spend.
///
/// Dry runs always spend the simulated running amount. Live, the first leg is
/// seeded per policy (fixed funding amount or live balance); every later leg
/// spends whatever the account actually holds of the previous hop's unit.
async fn spendable(
    gateway: &GatewayHandle,
    leg: &PathLeg,
    leg_index: usize,
    running: f64,
    settings: &ExecSettings,
) -> Result<f64> {
    if !settings.place_trades {
        return Ok(running);
    }
    if leg_index == 0 && !settings.size_from_balance {
        return Ok(running);
    }
    let input_asset = match leg.side {
        TradeSide::Buy => &leg.quote_asset,
        TradeSide::Sell => &leg.base_asset,
    };
    let balances = gateway.get_available_balances().await?;
    Ok(balances
        .iter()
        .find(|b| &b.asset == input_asset)
        .map(|b| b.quantity)
        .unwrap_or(0.0))
}

/// Run a single chain to completion.
///
/// Pair precision metadata travels via the `precisions` map keyed by symbol:
/// (step_size, quote_precision).
pub async fn execute_chain(
    gateway: &GatewayHandle,
    chain: &mut PathChain,
    precisions: &FxHashMap<String, (u32, u32)>,
    taker_fee: f64,
    settings: &ExecSettings,
) -> Result<ChainOutcome> {
    let venue = chain.venue();
    info!(
        event = "chain_start",
        venue = %venue,
        route = %chain.route(),
        realized = chain.book_value(),
        dry_run = !settings.place_trades,
        "executing chain"
    );

    let mut running = settings.funding_amount;
    for (idx, leg) in chain.legs.iter_mut().enumerate() {
        let (step_size, quote_precision) = precisions
            .get(&leg.symbol)
            .copied()
            .unwrap_or((8, 8));

        let available = spendable(gateway, leg, idx, running, settings).await?;
        let quantity = leg_quantity(leg, available, step_size, quote_precision);
        if quantity <= 0.0 {
            warn!(
                event = "leg_unfunded",
                venue = %venue,
                symbol = %leg.symbol,
                leg = idx,
                available,
                "insufficient balance, abandoning chain"
            );
            return Ok(ChainOutcome::InsufficientBalance);
        }

        leg.trade_quantity = quantity;
        let (fee, fee_unit) = leg_fee(leg, quantity, taker_fee);
        leg.fee = fee;
        leg.fee_unit = fee_unit;

        if !settings.place_trades {
            info!(
                "[EXEC] \u{1f3c3} DRY RUN {} {} {} @ {} qty={}",
                venue,
                leg.side.as_str(),
                leg.symbol,
                leg.best_price,
                quantity
            );
            running = leg.book_value;
            continue;
        }

        let order_id = gateway
            .place_limit_order(&leg.symbol, leg.side, quantity, leg.best_price)
            .await?;
        info!(
            event = "leg_placed",
            venue = %venue,
            symbol = %leg.symbol,
            side = leg.side.as_str(),
            leg = idx,
            qty = quantity,
            price = leg.best_price,
            order_id = %order_id,
            "limit order placed"
        );

        // Poll until the venue reports a terminal status. An odd transient
        // label keeps the loop alive rather than aborting the chain.
        loop {
            match gateway.check_order_status(&leg.symbol, &order_id).await? {
                OrderStatus::Filled => {
                    info!(
                        event = "leg_filled",
                        venue = %venue,
                        symbol = %leg.symbol,
                        leg = idx,
                        qty = quantity,
                        fee = leg.fee,
                        "order filled"
                    );
                    break;
                }
                OrderStatus::Canceled => {
                    warn!(
                        event = "leg_canceled",
                        venue = %venue,
                        symbol = %leg.symbol,
                        leg = idx,
                        order_id = %order_id,
                        "order canceled by venue, halting"
                    );
                    return Ok(ChainOutcome::Canceled);
                }
                OrderStatus::Open | OrderStatus::Unknown => {
                    tokio::time::sleep(settings.order_poll).await;
                }
            }
        }

        running = match leg.side {
            TradeSide::Buy => quantity,
            TradeSide::Sell => quantity * leg.best_price,
        };
    }

    info!(
        "[EXEC] \u{2705} {} chain complete: {} -> {:.4}",
        venue,
        chain.route(),
        chain.book_value()
    );
    Ok(ChainOutcome::Completed)
}

/// Execute each venue's winning chain in turn.
///
/// Venues demoted to observation-only are skipped. Execution stops at the
/// first canceled order; later venues are not attempted because the operator
/// needs to reconcile before anything else trades.
pub async fn execute_best_paths(
    winners: &mut [PathChain],
    gateways: &FxHashMap<VenueId, GatewayHandle>,
    venues: &[VenueState],
    precisions: &FxHashMap<String, (u32, u32)>,
    settings: &ExecSettings,
) -> Result<Vec<(VenueId, ChainOutcome)>, ExecutionError> {
    let mut outcomes = Vec::new();
    for chain in winners.iter_mut() {
        let venue = chain.venue();
        let state = venues.iter().find(|v| v.venue == venue);
        if !state.map(|s| s.trading_enabled).unwrap_or(false) {
            info!(
                event = "chain_skipped",
                venue = %venue,
                route = %chain.route(),
                "venue is observation-only"
            );
            continue;
        }
        let gateway = match gateways.get(&venue) {
            Some(g) => g,
            None => continue,
        };
        let taker = state.map(|s| s.taker_fee).unwrap_or(0.0);
        let outcome = execute_chain(gateway, chain, precisions, taker, settings)
            .await
            .map_err(|source| ExecutionError { venue, source })?;
        outcomes.push((venue, outcome));
        if outcome == ChainOutcome::Canceled {
            break;
        }
    }
    Ok(outcomes)
}
