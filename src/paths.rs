//! Market graph and path builder.
//!
//! Enumerates non-repeating trade chains that start from the funding
//! currency and round-trip back to it, bounded to a fixed number of
//! extension rounds per run. Chains whose base asset is declared a reverse
//! (bridge) asset by the venue seed a separate reverse pool; both pools
//! extend identically.
//!
//! Growth is bounded two ways: a chain never revisits a pair, and a chain
//! whose ordered pair sequence already exists in the pool is rejected.
//! Without the second check the pool grows combinatorially across rounds.

use crate::filter::clears_trigger;
use crate::math::round_value;
use crate::types::{PathChain, PathLeg, TradeSide, TradingPair, VenueState};
use rustc_hash::FxHashSet;
use tracing::debug;
use uuid::Uuid;

/// Counter-assets eligible as intermediate hops: major liquid assets, plus
/// the funding currency itself.
pub const BRIDGE_ASSETS: &[&str] = &["BTC", "ETH", "BNB", "TRX", "XRP"];

/// Builds candidate chains for one run over an immutable pair universe.
pub struct PathBuilder<'a> {
    pairs: &'a [TradingPair],
    funding_asset: &'a str,
    funding_amount: f64,
    trigger: f64,
    rounds: u32,
    /// Ordered pair sequences already present across both pools and the
    /// candidate set.
    seen: FxHashSet<String>,
}

/// Chains discovered for one run: terminal chains that cleared the
/// theoretical profit trigger, each under a fresh grouping id.
pub struct DiscoveryOutcome {
    pub candidates: Vec<PathChain>,
    pub chains_explored: usize,
}

impl<'a> PathBuilder<'a> {
    pub fn new(
        pairs: &'a [TradingPair],
        funding_asset: &'a str,
        funding_amount: f64,
        trigger: f64,
        rounds: u32,
    ) -> Self {
        Self {
            pairs,
            funding_asset,
            funding_amount,
            trigger,
            rounds,
            seen: FxHashSet::default(),
        }
    }

    /// Run seeding plus the configured number of extension rounds for both
    /// pools and return every profit candidate found.
    pub fn build(mut self, venues: &[VenueState]) -> DiscoveryOutcome {
        let (mut forward, mut reverse) = self.seed(venues);
        let mut candidates = Vec::new();
        let mut explored = forward.len() + reverse.len();

        for round in 0..self.rounds {
            if forward.is_empty() && reverse.is_empty() {
                break;
            }
            forward = self.extend_pool(forward, &mut candidates);
            reverse = self.extend_pool(reverse, &mut candidates);
            explored += forward.len() + reverse.len();
            debug!(
                round = round + 1,
                open_forward = forward.len(),
                open_reverse = reverse.len(),
                candidates = candidates.len(),
                "path extension round complete"
            );
        }

        DiscoveryOutcome {
            candidates,
            chains_explored: explored,
        }
    }

    /// Seed one chain per pair quoted directly in the funding currency.
    ///
    /// Pairs whose base asset appears in the venue's reverse-asset list are
    /// routed to the reverse pool: such assets trade more naturally against
    /// a bridge than directly against the funding currency.
    fn seed(&mut self, venues: &[VenueState]) -> (Vec<PathChain>, Vec<PathChain>) {
        let mut forward = Vec::new();
        let mut reverse = Vec::new();

        for pair in self.pairs {
            if pair.quote_asset != self.funding_asset || pair.price <= 0.0 {
                continue;
            }
            // First leg buys the base asset with the funding currency.
            let value = round_value(self.funding_amount / pair.price, &pair.quote_asset);
            let leg = PathLeg::new(
                pair,
                None,
                TradeSide::Buy,
                value,
                pair.base_asset.clone(),
                false,
            );
            let chain = PathChain::seed(leg);
            self.seen.insert(chain.route_key());

            let is_reverse = venues
                .iter()
                .find(|v| v.venue == pair.venue)
                .map(|v| v.bridge_assets.iter().any(|a| a == &pair.base_asset))
                .unwrap_or(false);
            if is_reverse {
                reverse.push(chain);
            } else {
                forward.push(chain);
            }
        }

        (forward, reverse)
    }

    /// One extension round over a pool. Open chains that find no eligible
    /// next pair are dropped; terminal chains never re-enter the pool.
    fn extend_pool(
        &mut self,
        pool: Vec<PathChain>,
        candidates: &mut Vec<PathChain>,
    ) -> Vec<PathChain> {
        let mut next = Vec::new();

        for chain in &pool {
            for pair in self.pairs {
                let leg = match self.try_extend(chain, pair) {
                    Some(leg) => leg,
                    None => continue,
                };
                let extended = chain.extended(leg);
                if !self.seen.insert(extended.route_key()) {
                    continue;
                }
                if extended.is_terminal() {
                    if clears_trigger(self.funding_amount, extended.value(), self.trigger) {
                        // Fresh id per candidate: prefix-sharing chains must
                        // not share grouping ids.
                        candidates.push(extended.with_group_id(Uuid::new_v4()));
                    }
                } else {
                    next.push(extended);
                }
            }
        }

        next
    }

    /// Build the next leg extending `chain` by `pair`, or `None` when the
    /// pair is not an eligible continuation.
    fn try_extend(&self, chain: &PathChain, pair: &TradingPair) -> Option<PathLeg> {
        if pair.venue != chain.venue() || pair.price <= 0.0 {
            return None;
        }
        if chain.contains_symbol(&pair.symbol) {
            return None;
        }

        let held = chain.held_unit();
        let (side, counter) = if pair.base_asset == held {
            (TradeSide::Sell, &pair.quote_asset)
        } else if pair.quote_asset == held {
            (TradeSide::Buy, &pair.base_asset)
        } else {
            return None;
        };

        // Restrict hops to liquid bridge assets or the funding currency.
        if counter != self.funding_asset && !BRIDGE_ASSETS.contains(&counter.as_str()) {
            return None;
        }

        let raw = match side {
            TradeSide::Sell => chain.value() * pair.price,
            TradeSide::Buy => chain.value() / pair.price,
        };
        let value = round_value(raw, &pair.quote_asset);
        let terminal = pair.quote_asset == self.funding_asset;
        let unit = match side {
            TradeSide::Sell => pair.quote_asset.clone(),
            TradeSide::Buy => pair.base_asset.clone(),
        };

        Some(PathLeg::new(
            pair,
            Some(chain.legs[chain.legs.len() - 1].symbol.clone()),
            side,
            value,
            unit,
            terminal,
        ))
    }
}
