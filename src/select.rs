//! Best-path selection.
//!
//! Reduces the validated set to at most one chain per venue: the highest
//! realized final value seen this run. Ties keep the incumbent, so the first
//! chain to reach a value wins and replacements require a strict improvement.

use crate::types::{PathChain, RunContext, VenueState};
use tracing::info;

/// Fold the validated chains into `ctx.best`, tracking the winning value in
/// each venue's `best_value`. Venue state is reset by the runner before each
/// run, so the comparison always starts from zero.
pub fn select_best(ctx: &mut RunContext, venues: &mut [VenueState]) {
    for chain in &ctx.validated {
        let venue = chain.venue();
        let state = match venues.iter_mut().find(|v| v.venue == venue) {
            Some(s) => s,
            None => continue,
        };
        if chain.book_value() > state.best_value {
            state.best_value = chain.book_value();
            info!(
                event = "best_path",
                venue = %venue,
                route = %chain.route(),
                realized = chain.book_value(),
                "new best chain for venue"
            );
            ctx.best.insert(venue, chain.clone());
        }
    }
}

/// Chains selected for execution, in stable venue order.
pub fn winners(ctx: &RunContext, venues: &[VenueState]) -> Vec<PathChain> {
    venues
        .iter()
        .filter_map(|v| ctx.best.get(&v.venue).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PathLeg, TradeSide, TradingPair, VenueId};

    fn chain(venue: VenueId, book_value: f64) -> PathChain {
        let pair = TradingPair {
            venue,
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            price: 50_000.0,
            base_precision: 8,
            quote_precision: 8,
            step_size: 5,
        };
        let mut leg = PathLeg::new(&pair, None, TradeSide::Buy, 0.002, "USDT".to_string(), true);
        leg.book_value = book_value;
        PathChain::seed(leg)
    }

    fn venues() -> Vec<VenueState> {
        vec![
            VenueState::new(VenueId::Binance, true),
            VenueState::new(VenueId::Kucoin, true),
        ]
    }

    #[test]
    fn test_highest_value_wins_per_venue() {
        let mut ctx = RunContext::default();
        ctx.validated = vec![
            chain(VenueId::Binance, 101.2),
            chain(VenueId::Binance, 101.8),
            chain(VenueId::Binance, 101.5),
            chain(VenueId::Kucoin, 100.9),
        ];
        let mut vs = venues();
        select_best(&mut ctx, &mut vs);

        assert_eq!(ctx.best.len(), 2);
        assert_eq!(ctx.best[&VenueId::Binance].book_value(), 101.8);
        assert_eq!(ctx.best[&VenueId::Kucoin].book_value(), 100.9);
        assert_eq!(vs[0].best_value, 101.8);
        assert_eq!(vs[1].best_value, 100.9);
    }

    #[test]
    fn test_tie_keeps_incumbent() {
        let first = chain(VenueId::Binance, 101.5);
        let mut second = chain(VenueId::Binance, 101.5);
        second.legs[0].symbol = "ETHUSDT".to_string();

        let mut ctx = RunContext::default();
        ctx.validated = vec![first, second];
        let mut vs = venues();
        select_best(&mut ctx, &mut vs);

        assert_eq!(ctx.best[&VenueId::Binance].legs[0].symbol, "BTCUSDT");
    }

    #[test]
    fn test_unknown_venue_state_is_skipped() {
        let mut ctx = RunContext::default();
        ctx.validated = vec![chain(VenueId::Kucoin, 102.0)];
        let mut vs = vec![VenueState::new(VenueId::Binance, true)];
        select_best(&mut ctx, &mut vs);
        assert!(ctx.best.is_empty());
    }

    #[test]
    fn test_winners_follow_venue_order() {
        let mut ctx = RunContext::default();
        ctx.validated = vec![chain(VenueId::Kucoin, 102.0), chain(VenueId::Binance, 101.0)];
        let mut vs = venues();
        select_best(&mut ctx, &mut vs);

        let w = winners(&ctx, &vs);
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].venue(), VenueId::Binance);
        assert_eq!(w[1].venue(), VenueId::Kucoin);
    }
}
