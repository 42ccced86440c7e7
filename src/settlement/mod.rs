//! Auction settlement: winning-bid selection, fee capture, prediction
//! scoring, and the live notifications that follow.

mod engine;

pub use engine::{FeeConfig, SettlementEngine, SettlementOutcome};
