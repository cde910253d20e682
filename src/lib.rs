pub mod catalog;
pub mod config;
pub mod constraints;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod market;
pub mod market_engine;
pub mod metrics;
pub mod numeric;
pub mod parlay;
pub mod parlay_engine;
pub mod pick;
pub mod proposer;
pub mod scoregrid;
pub mod settlement;
