//! Persistent storage for auctions, bids, and the event log.

mod auction_db;

pub use auction_db::{AuctionDb, NewAuction};
