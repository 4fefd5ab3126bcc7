//! SQLite-backed cache of the grouped calendar snapshot.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::event::MarketEvent;
use crate::grouping::{parse_grouping_strategy, GroupingStrategy};

pub const DEFAULT_CACHE_TTL_MS: i64 = 5 * 60 * 1_000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cached snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    pub saved_at_ms: i64,
    pub strategy: GroupingStrategy,
    pub events: Vec<MarketEvent>,
}

pub struct SnapshotCache {
    conn: Connection,
}

impl SnapshotCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            ",
        )?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS grouped_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                saved_at_ms INTEGER NOT NULL,
                strategy TEXT NOT NULL,
                events_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self { conn })
    }

    pub fn store(
        &self,
        events: &[MarketEvent],
        strategy: GroupingStrategy,
        saved_at_ms: i64,
    ) -> Result<(), CacheError> {
        let events_json = serde_json::to_string(events)?;
        self.conn.execute(
            "
            INSERT INTO grouped_snapshot (id, saved_at_ms, strategy, events_json)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                saved_at_ms = excluded.saved_at_ms,
                strategy = excluded.strategy,
                events_json = excluded.events_json
            ",
            params![saved_at_ms, strategy.as_str(), events_json],
        )?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<CachedSnapshot>, CacheError> {
        let row: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT saved_at_ms, strategy, events_json FROM grouped_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((saved_at_ms, strategy, events_json)) = row else {
            return Ok(None);
        };

        let strategy = parse_grouping_strategy(&strategy).unwrap_or_default();

        Ok(Some(CachedSnapshot {
            saved_at_ms,
            strategy,
            events: serde_json::from_str(&events_json)?,
        }))
    }

    /// Returns the cached snapshot when it is younger than `ttl_ms`, was built
    /// with `strategy`, and predates no external change signalled by
    /// `invalidated_after_ms`.
    pub fn load_fresh(
        &self,
        now_ms: i64,
        ttl_ms: i64,
        strategy: GroupingStrategy,
        invalidated_after_ms: Option<i64>,
    ) -> Result<Option<CachedSnapshot>, CacheError> {
        let Some(snapshot) = self.load()? else {
            return Ok(None);
        };

        let age_ms = now_ms.saturating_sub(snapshot.saved_at_ms);
        let expired = age_ms >= ttl_ms;
        let invalidated = invalidated_after_ms.is_some_and(|changed| changed > snapshot.saved_at_ms);
        let strategy_changed = snapshot.strategy != strategy;

        if expired || invalidated || strategy_changed {
            debug!(
                component = "cache",
                event = "cache.stale",
                age_ms,
                expired,
                invalidated,
                strategy_changed
            );
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    pub fn invalidate(&self) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM grouped_snapshot", [])?;
        Ok(())
    }
}
