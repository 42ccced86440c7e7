//! SQLite-backed auction store.
//!
//! One connection behind a `parking_lot::Mutex`, WAL mode for concurrent
//! reads during writes, JSON pre-serialized outside the lock. The store is
//! the single shared mutable resource: the `claim_settlement` UPDATE is the
//! serialization point that makes the settlement pipeline run at most once
//! per auction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, Row};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Auction, AuctionStatus, Bid, DecayMode, EventLog, EventType};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS auctions (
    id TEXT PRIMARY KEY,
    token_id TEXT,
    domain_id TEXT,
    reserve_price_wei TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'DRAFT',
    starts_at INTEGER,
    ends_at INTEGER,
    decay_mode TEXT,
    tx_hash TEXT,
    created_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_auctions_created ON auctions(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_auctions_status_ends ON auctions(status, ends_at);

CREATE TABLE IF NOT EXISTS bids (
    id TEXT NOT NULL UNIQUE,
    auction_id TEXT NOT NULL REFERENCES auctions(id),
    bidder TEXT NOT NULL,
    amount_wei TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bids_auction ON bids(auction_id, created_at);

-- Append-only: rows are never updated or deleted.
CREATE TABLE IF NOT EXISTS events (
    id TEXT NOT NULL UNIQUE,
    auction_id TEXT NOT NULL REFERENCES auctions(id),
    type TEXT NOT NULL,
    payload_json TEXT,
    tx_hash TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_auction_created ON events(auction_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_events_auction_type ON events(auction_id, type);
"#;

const AUCTION_COLS: &str =
    "id, token_id, domain_id, reserve_price_wei, status, starts_at, ends_at, decay_mode, tx_hash, created_at";
const BID_COLS: &str = "id, auction_id, bidder, amount_wei, created_at";
const EVENT_COLS: &str = "id, auction_id, type, payload_json, tx_hash, created_at";

/// Fields for a new auction row; id and created_at are generated on insert.
#[derive(Debug, Clone, Default)]
pub struct NewAuction {
    pub token_id: Option<String>,
    pub domain_id: Option<String>,
    pub reserve_price_wei: BigUint,
    pub status: AuctionStatus,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub decay_mode: Option<DecayMode>,
    pub tx_hash: Option<String>,
}

pub struct AuctionDb {
    conn: Arc<Mutex<Connection>>,
}

impl AuctionDb {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM auctions", [], |row| row.get(0))
            .unwrap_or(0);
        info!(
            "📊 Auction database initialized at {} ({} auctions)",
            db_path, count
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn create_auction(&self, new: NewAuction) -> Result<Auction> {
        let auction = Auction {
            id: Uuid::new_v4().to_string(),
            token_id: new.token_id,
            domain_id: new.domain_id,
            reserve_price_wei: new.reserve_price_wei,
            status: new.status,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            decay_mode: new.decay_mode,
            tx_hash: new.tx_hash,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO auctions (id, token_id, domain_id, reserve_price_wei, status, starts_at, ends_at, decay_mode, tx_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                auction.id,
                auction.token_id,
                auction.domain_id,
                auction.reserve_price_wei.to_string(),
                auction.status.as_str(),
                auction.starts_at.map(|t| t.timestamp_millis()),
                auction.ends_at.map(|t| t.timestamp_millis()),
                auction.decay_mode.map(|m| m.as_str()),
                auction.tx_hash,
                auction.created_at.timestamp_millis(),
            ],
        )
        .context("insert auction")?;

        Ok(auction)
    }

    pub async fn get_auction(&self, id: &str) -> Result<Option<Auction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUCTION_COLS} FROM auctions WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], auction_from_row)?;
        Ok(rows.next().transpose().context("read auction")?)
    }

    /// All auctions, latest first.
    pub async fn list_auctions(&self) -> Result<Vec<Auction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUCTION_COLS} FROM auctions ORDER BY created_at DESC, id"
        ))?;
        let rows = stmt.query_map([], auction_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("list auctions")
    }

    /// Most recent auction matching a token or domain id.
    pub async fn find_by_token_or_domain(
        &self,
        token_id: Option<&str>,
        domain_id: Option<&str>,
    ) -> Result<Option<Auction>> {
        if token_id.is_none() && domain_id.is_none() {
            return Ok(None);
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUCTION_COLS} FROM auctions
             WHERE (?1 IS NOT NULL AND token_id = ?1) OR (?2 IS NOT NULL AND domain_id = ?2)
             ORDER BY created_at DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![token_id, domain_id], auction_from_row)?;
        Ok(rows.next().transpose().context("find auction")?)
    }

    /// Activate a listing: update the reserve, retain or set the tx hash, and
    /// move DRAFT forward to ACTIVE. SETTLED rows keep their status (the
    /// lifecycle never moves backward).
    pub async fn activate(
        &self,
        id: &str,
        reserve_price_wei: &BigUint,
        tx_hash: Option<&str>,
    ) -> Result<Option<Auction>> {
        let conn = self.conn.lock();
        let changes = conn
            .execute(
                "UPDATE auctions SET
                    reserve_price_wei = ?2,
                    tx_hash = COALESCE(?3, tx_hash),
                    status = CASE WHEN status = 'DRAFT' THEN 'ACTIVE' ELSE status END
                 WHERE id = ?1",
                params![id, reserve_price_wei.to_string(), tx_hash],
            )
            .context("activate auction")?;
        if changes == 0 {
            return Ok(None);
        }
        let auction = conn.query_row(
            &format!("SELECT {AUCTION_COLS} FROM auctions WHERE id = ?1"),
            params![id],
            auction_from_row,
        )?;
        Ok(Some(auction))
    }

    /// Atomically claim the transition to SETTLED. Returns true for the one
    /// caller that performs the flip; every later caller gets false and must
    /// skip the fee/scoring pipeline. This single UPDATE is what serializes
    /// a manual settle racing a scheduler tick.
    pub async fn claim_settlement(&self, id: &str, tx_hash: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock();
        let changes = conn
            .execute(
                "UPDATE auctions SET status = 'SETTLED', tx_hash = COALESCE(?2, tx_hash)
                 WHERE id = ?1 AND status <> 'SETTLED'",
                params![id, tx_hash],
            )
            .context("claim settlement")?;
        Ok(changes > 0)
    }

    /// ACTIVE auctions whose end time has passed.
    pub async fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUCTION_COLS} FROM auctions
             WHERE status = 'ACTIVE' AND ends_at IS NOT NULL AND ends_at <= ?1
             ORDER BY ends_at ASC"
        ))?;
        let rows = stmt.query_map(params![now.timestamp_millis()], auction_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("query expired auctions")
    }

    pub async fn insert_bid(
        &self,
        auction_id: &str,
        bidder: &str,
        amount_wei: &BigUint,
    ) -> Result<Bid> {
        let bid = Bid {
            id: Uuid::new_v4().to_string(),
            auction_id: auction_id.to_string(),
            bidder: bidder.to_string(),
            amount_wei: amount_wei.clone(),
            created_at: Utc::now(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bids (id, auction_id, bidder, amount_wei, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                bid.id,
                bid.auction_id,
                bid.bidder,
                bid.amount_wei.to_string(),
                bid.created_at.timestamp_millis(),
            ],
        )
        .context("insert bid")?;
        Ok(bid)
    }

    /// Bids for an auction, oldest first.
    pub async fn bids_for(&self, auction_id: &str) -> Result<Vec<Bid>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BID_COLS} FROM bids WHERE auction_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![auction_id], bid_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("list bids")
    }

    pub async fn append_event(
        &self,
        auction_id: &str,
        kind: EventType,
        payload: Option<&Value>,
        tx_hash: Option<&str>,
    ) -> Result<EventLog> {
        // Pre-serialize outside the lock
        let payload_json = payload.map(|p| p.to_string());
        let event = EventLog {
            id: Uuid::new_v4().to_string(),
            auction_id: auction_id.to_string(),
            kind,
            payload: payload.cloned(),
            tx_hash: tx_hash.map(str::to_string),
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (id, auction_id, type, payload_json, tx_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.auction_id,
                event.kind.as_str(),
                payload_json,
                event.tx_hash,
                event.created_at.timestamp_millis(),
            ],
        )
        .context("append event")?;
        Ok(event)
    }

    /// Event history for an auction, newest first.
    pub async fn events_for(&self, auction_id: &str) -> Result<Vec<EventLog>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM events WHERE auction_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![auction_id], event_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("list events")
    }

    /// Events of one type for an auction, oldest first.
    pub async fn events_of_type(
        &self,
        auction_id: &str,
        kind: EventType,
    ) -> Result<Vec<EventLog>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM events WHERE auction_id = ?1 AND type = ?2
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![auction_id, kind.as_str()], event_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("list events by type")
    }
}

fn bad_column(idx: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, detail.into())
}

fn ms_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn auction_from_row(row: &Row<'_>) -> rusqlite::Result<Auction> {
    let reserve_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let decay_raw: Option<String> = row.get(7)?;
    Ok(Auction {
        id: row.get(0)?,
        token_id: row.get(1)?,
        domain_id: row.get(2)?,
        reserve_price_wei: reserve_raw
            .parse()
            .map_err(|e| bad_column(3, format!("reserve_price_wei: {e}")))?,
        status: AuctionStatus::parse(&status_raw)
            .ok_or_else(|| bad_column(4, format!("unknown status: {status_raw}")))?,
        starts_at: row.get::<_, Option<i64>>(5)?.map(ms_to_utc),
        ends_at: row.get::<_, Option<i64>>(6)?.map(ms_to_utc),
        decay_mode: decay_raw.as_deref().and_then(DecayMode::parse),
        tx_hash: row.get(8)?,
        created_at: ms_to_utc(row.get(9)?),
    })
}

fn bid_from_row(row: &Row<'_>) -> rusqlite::Result<Bid> {
    let amount_raw: String = row.get(3)?;
    Ok(Bid {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        bidder: row.get(2)?,
        amount_wei: amount_raw
            .parse()
            .map_err(|e| bad_column(3, format!("amount_wei: {e}")))?,
        created_at: ms_to_utc(row.get(4)?),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventLog> {
    let kind_raw: String = row.get(2)?;
    let payload_json: Option<String> = row.get(3)?;
    let payload = match payload_json {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| bad_column(3, format!("payload_json: {e}")))?,
        ),
        None => None,
    };
    Ok(EventLog {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        kind: EventType::parse(&kind_raw)
            .ok_or_else(|| bad_column(2, format!("unknown event type: {kind_raw}")))?,
        payload,
        tx_hash: row.get(4)?,
        created_at: ms_to_utc(row.get(5)?),
    })
}
