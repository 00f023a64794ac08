//! Triangular Arbitrage Trading System
//!
//! Discovers multi-leg trade chains that start and end in the funding
//! currency across spot venues, validates them against live order books,
//! and executes the best chain per venue.

pub mod binance;
pub mod books;
pub mod config;
pub mod execution;
pub mod filter;
pub mod gateway;
pub mod kucoin;
pub mod logging;
pub mod math;
pub mod paths;
pub mod retry;
pub mod runner;
pub mod select;
pub mod types;
