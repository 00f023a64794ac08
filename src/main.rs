//! Triangular Arbitrage Trading System
//!
//! Enumerates trade chains that convert the funding currency back into
//! itself through intermediate assets on each configured spot venue. Chains
//! that clear the profit trigger on theoretical prices are re-validated
//! against live order books, and the best surviving chain per venue is
//! executed leg by leg.

use anyhow::Result;
use tracing::{info, info_span, warn};

use triangular_arbitrage::config::Settings;
use triangular_arbitrage::gateway::build_gateway_table;
use triangular_arbitrage::logging;
use triangular_arbitrage::runner::Runner;
use triangular_arbitrage::types::VenueState;

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so logging and settings see everything.
    dotenvy::dotenv().ok();

    let _log_guard = logging::init_logging();
    let session_id = logging::session_id();

    let settings = Settings::from_env();

    let root_span = info_span!(
        "tri_arb",
        session_id = %session_id,
        version = "2.0",
        place_trades = settings.place_trades,
        venues = ?settings.venues,
    );
    let _enter = root_span.enter();

    info!("\u{1f680} Triangular Arbitrage System v2.0");
    info!(
        "   Funding: {} {} | trigger: {:.2}%",
        settings.funding_amount,
        settings.funding_asset,
        settings.profit_trigger * 100.0
    );
    if settings.place_trades {
        warn!("   Mode: LIVE EXECUTION");
    } else {
        info!("   Mode: DRY RUN (set PLACE_TRADES=true to execute)");
    }

    if settings.venues.is_empty() {
        anyhow::bail!("no valid venues configured, check VENUES");
    }

    let gateways = build_gateway_table(&settings.venues);

    // Venues without full credentials still feed discovery; they just never
    // reach the order endpoint.
    let mut venues = Vec::with_capacity(settings.venues.len());
    for (&venue, gateway) in &gateways {
        // Dry runs simulate execution everywhere; live trading additionally
        // needs credentials on the venue.
        let trading_enabled = gateway.ready() || !settings.place_trades;
        if !gateway.ready() {
            warn!("[{}] missing credentials, observation-only", venue);
        }
        let mut state = VenueState::new(venue, trading_enabled);
        let (maker, taker) = gateway.fees();
        state.maker_fee = maker;
        state.taker_fee = taker;
        state.bridge_assets = gateway.bridge_assets();
        info!(
            "[{}] ready={} maker={:.4} taker={:.4}",
            venue,
            gateway.ready(),
            maker,
            taker
        );
        venues.push(state);
    }

    let mut runner = Runner::new(settings, gateways, venues);

    // Ctrl-C pauses the loop so in-flight polling can finish its leg.
    let enabled = runner.enabled_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown requested, pausing run loop");
            enabled.store(false, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let fatal = runner.run_forever().await;
    Err(anyhow::Error::new(fatal).context("run loop halted"))
}
