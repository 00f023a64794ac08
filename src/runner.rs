//! Top-level run loop.
//!
//! One run: health-check every venue, refresh the pair universe, discover
//! candidate chains, validate them against live books, pick the best per
//! venue, then execute. State is rebuilt from scratch each run; nothing
//! carries over except the venue table.

use crate::books::{populate_depth_cache, validate_all};
use crate::config::Settings;
use crate::execution::{execute_best_paths, ChainOutcome, ExecSettings};
use crate::gateway::GatewayTable;
use crate::paths::PathBuilder;
use crate::select::{select_best, winners};
use crate::types::{RunContext, TradingPair, VenueId, VenueState};
use anyhow::Result;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Errors that must stop the whole bot.
#[derive(Debug)]
pub enum FatalRunError {
    /// A venue failed its pre-run health check.
    VenueUnreachable(VenueId),
    /// A venue canceled an order mid-chain, stranding inventory.
    OrderCanceled(VenueId),
}

impl fmt::Display for FatalRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalRunError::VenueUnreachable(v) => {
                write!(f, "venue {} unreachable at run start", v)
            }
            FatalRunError::OrderCanceled(v) => {
                write!(f, "venue {} canceled an order mid-chain", v)
            }
        }
    }
}

impl std::error::Error for FatalRunError {}

/// Summary of one completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub pairs: usize,
    pub chains_explored: usize,
    pub candidates: usize,
    pub validated: usize,
    pub executed: Vec<(VenueId, ChainOutcome)>,
}

pub struct Runner {
    settings: Settings,
    gateways: GatewayTable,
    venues: Vec<VenueState>,
    /// Cleared to pause the loop without killing the process.
    enabled: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(settings: Settings, gateways: GatewayTable, venues: Vec<VenueState>) -> Self {
        Self {
            settings,
            gateways,
            venues,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn enabled_handle(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    /// Confirm every configured venue answers before any state is touched.
    async fn health_check(&self) -> Result<(), FatalRunError> {
        for (venue, gateway) in &self.gateways {
            if !gateway.test_connection().await {
                error!(event = "health_check_failed", venue = %venue, "venue unreachable");
                return Err(FatalRunError::VenueUnreachable(*venue));
            }
        }
        Ok(())
    }

    async fn refresh_pairs(&self) -> Vec<TradingPair> {
        let mut pairs = Vec::new();
        for (venue, gateway) in &self.gateways {
            match gateway.list_pairs().await {
                Ok(mut p) => {
                    info!(event = "pairs_loaded", venue = %venue, count = p.len(), "pair universe refreshed");
                    pairs.append(&mut p);
                }
                Err(e) => warn!("pair refresh failed for {}: {}", venue, e),
            }
        }
        pairs
    }

    /// Symbol -> (step_size, quote_precision) for order sizing.
    fn precision_table(pairs: &[TradingPair]) -> FxHashMap<String, (u32, u32)> {
        pairs
            .iter()
            .map(|p| (p.symbol.clone(), (p.step_size, p.quote_precision)))
            .collect()
    }

    pub async fn run_once(&mut self) -> Result<RunReport, FatalRunError> {
        self.health_check().await?;

        // Per-run reset: each run competes from zero.
        for v in &mut self.venues {
            v.best_value = 0.0;
        }

        let pairs = self.refresh_pairs().await;
        let mut ctx = RunContext::new(pairs);
        let mut report = RunReport {
            pairs: ctx.pairs.len(),
            ..Default::default()
        };

        let outcome = PathBuilder::new(
            &ctx.pairs,
            &self.settings.funding_asset,
            self.settings.funding_amount,
            self.settings.profit_trigger,
            self.settings.extension_rounds,
        )
        .build(&self.venues);
        report.chains_explored = outcome.chains_explored;
        report.candidates = outcome.candidates.len();
        ctx.candidates = outcome.candidates;
        info!(
            event = "discovery_done",
            pairs = report.pairs,
            explored = report.chains_explored,
            candidates = report.candidates,
            "discovery complete"
        );

        if !ctx.candidates.is_empty() {
            populate_depth_cache(&mut ctx, &self.gateways, &self.settings.funding_asset).await;
            validate_all(
                &mut ctx,
                self.settings.funding_amount,
                self.settings.profit_trigger,
            );
        }
        report.validated = ctx.validated.len();

        select_best(&mut ctx, &mut self.venues);
        let mut chosen = winners(&ctx, &self.venues);
        if chosen.is_empty() {
            return Ok(report);
        }

        let exec_settings = ExecSettings {
            place_trades: self.settings.place_trades,
            size_from_balance: self.settings.size_from_balance,
            order_poll: self.settings.order_poll,
            funding_amount: self.settings.funding_amount,
        };
        let precisions = Self::precision_table(&ctx.pairs);
        let executed = match execute_best_paths(
            &mut chosen,
            &self.gateways,
            &self.venues,
            &precisions,
            &exec_settings,
        )
        .await
        {
            Ok(executed) => executed,
            Err(e) => {
                // Gateway I/O failures during execution leave order state
                // unknown; treat like a dead venue.
                error!("execution error: {}", e);
                return Err(FatalRunError::VenueUnreachable(e.venue));
            }
        };

        if let Some((venue, _)) = executed
            .iter()
            .find(|(_, o)| *o == ChainOutcome::Canceled)
        {
            return Err(FatalRunError::OrderCanceled(*venue));
        }
        report.executed = executed;
        Ok(report)
    }

    /// Loop until a fatal error. Pauses between runs only when a run found
    /// nothing to execute; a productive run goes straight back to discovery.
    pub async fn run_forever(&mut self) -> FatalRunError {
        loop {
            if !self.enabled.load(Ordering::Relaxed) {
                tokio::time::sleep(self.settings.run_pause).await;
                continue;
            }
            match self.run_once().await {
                Ok(report) => {
                    info!(
                        event = "run_complete",
                        pairs = report.pairs,
                        candidates = report.candidates,
                        validated = report.validated,
                        executed = report.executed.len(),
                        "run complete"
                    );
                    if report.validated == 0 {
                        tokio::time::sleep(self.settings.run_pause).await;
                    }
                }
                Err(fatal) => {
                    error!("fatal: {}", fatal);
                    return fatal;
                }
            }
        }
    }
}
